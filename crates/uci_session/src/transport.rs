//! Line channels between a session and an engine.
//!
//! The session only ever sees a [`LineChannel`]: an outbound sender for
//! protocol lines and an inbound receiver for engine output. What sits on the
//! other end (a child process, a relay, a test script) is up to the caller.

use std::ffi::OsStr;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One end of a bidirectional line channel.
#[derive(Debug)]
pub struct LineChannel {
    pub tx: mpsc::UnboundedSender<String>,
    pub rx: mpsc::UnboundedReceiver<String>,
}

impl LineChannel {
    /// Two connected ends: lines sent on one arrive on the other.
    pub fn pair() -> (LineChannel, LineChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            LineChannel { tx: a_tx, rx: a_rx },
            LineChannel { tx: b_tx, rx: b_rx },
        )
    }
}

/// How long an engine gets to exit on its own once its stdin is closed.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Runs a UCI engine as a child process speaking over stdin/stdout.
pub struct ProcessTransport;

impl ProcessTransport {
    /// Spawn `program` and return the session-side end of its line channel.
    ///
    /// Dropping the outbound sender closes the engine's stdin; an engine still
    /// running [`EXIT_GRACE`] later is killed. The engine exiting closes the
    /// inbound receiver.
    pub fn spawn<S: AsRef<OsStr>>(program: S, args: &[String]) -> io::Result<LineChannel> {
        let program_name = program.as_ref().to_string_lossy().into_owned();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout unavailable"))?;

        info!(program = %program_name, pid = ?child.id(), "Engine process started");

        let (session_end, engine_end) = LineChannel::pair();
        let LineChannel {
            tx: inbound,
            rx: mut outbound,
        } = engine_end;

        let (stdin_closed_tx, stdin_closed) = oneshot::channel::<()>();

        tokio::spawn(async move {
            while let Some(line) = outbound.recv().await {
                let written = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                };
                if let Err(e) = written.await {
                    warn!(error = %e, "Failed writing to engine stdin");
                    break;
                }
            }
            drop(stdin);
            debug!("Engine stdin pump finished");
            let _ = stdin_closed_tx.send(());
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if inbound.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed reading engine stdout");
                        break;
                    }
                }
            }
            debug!("Engine stdout pump finished");
        });

        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => status,
                _ = stdin_closed => match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(program = %program_name, "Engine still running after stdin closed; killing");
                        if let Err(e) = child.start_kill() {
                            warn!(program = %program_name, error = %e, "Failed to kill engine process");
                        }
                        child.wait().await
                    }
                },
            };
            match exited {
                Ok(status) => info!(program = %program_name, %status, "Engine process exited"),
                Err(e) => warn!(program = %program_name, error = %e, "Failed waiting for engine process"),
            }
        });

        Ok(session_end)
    }
}
