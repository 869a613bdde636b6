//! Engine session: one engine, one request at a time.
//!
//! Callers reserve the slot synchronously with [`EngineSession::analyze`] or
//! [`EngineSession::play`]; a second reservation while one is in flight is
//! rejected with [`SessionError::EngineBusy`] instead of queueing. The
//! returned [`Pending`] resolves when the engine answers, the watchdog fires,
//! or the session closes.
//!
//! A reader task owns the inbound side of the channel and routes every line
//! to the single in-flight slot. After a timeout the slot is not released
//! straight away: the session sends `stop` and waits for the late `bestmove`
//! so it can never be attributed to the next request. An engine that ignores
//! `stop` gets one `isready` round trip before the session gives up on it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use trainer_core::Position;

use crate::error::SessionError;
use crate::protocol::{parse_line, BestMove, Command, EngineResponse, Handshake, SearchInfo};
use crate::transport::LineChannel;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    HandshakePending,
    Ready,
    Busy,
    ShuttingDown,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::HandshakePending => "handshake pending",
            SessionState::Ready => "ready",
            SessionState::Busy => "busy",
            SessionState::ShuttingDown => "shutting down",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session timing and the options sent after `uciok`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub handshake_timeout: Duration,
    pub analyze_timeout: Duration,
    /// Floor for play requests; the effective deadline is at least movetime + 1s.
    pub play_timeout: Duration,
    /// How long to wait for a late answer after a timeout before resyncing.
    pub drain_timeout: Duration,
    pub options: Vec<(String, String)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            analyze_timeout: Duration::from_secs(10),
            play_timeout: Duration::from_secs(15),
            drain_timeout: Duration::from_secs(2),
            options: vec![
                ("MultiPV".into(), "1".into()),
                ("Threads".into(), "1".into()),
                ("Hash".into(), "16".into()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    Analyze {
        position: Position,
        depth: u32,
    },
    Play {
        position: Position,
        skill: Option<u8>,
        movetime: Duration,
    },
}

impl EngineRequest {
    fn commands(&self) -> Vec<Command> {
        match self {
            EngineRequest::Analyze { position, depth } => vec![
                Command::Position { fen: position.fen().to_string() },
                Command::GoDepth(*depth),
            ],
            EngineRequest::Play { position, skill, movetime } => {
                let mut commands = Vec::with_capacity(3);
                if let Some(skill) = skill {
                    commands.push(Command::SetOption {
                        name: "Skill Level".into(),
                        value: skill.to_string(),
                    });
                }
                commands.push(Command::Position { fen: position.fen().to_string() });
                commands.push(Command::GoMovetime(
                    u64::try_from(movetime.as_millis()).unwrap_or(u64::MAX),
                ));
                commands
            }
        }
    }

    fn deadline(&self, config: &SessionConfig) -> Duration {
        match self {
            EngineRequest::Analyze { .. } => config.analyze_timeout,
            EngineRequest::Play { movetime, .. } => {
                config
                    .play_timeout
                    .max(movetime.saturating_add(Duration::from_secs(1)))
            }
        }
    }
}

/// Answer to a settled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub request_id: RequestId,
    /// Engine coordinate notation.
    pub best_move: String,
    pub ponder: Option<String>,
    /// Last scored `info` line seen for this request.
    pub info: Option<SearchInfo>,
}

type Reply = oneshot::Sender<Result<SearchOutcome, SessionError>>;

/// A reserved request. Resolves exactly once.
#[derive(Debug)]
pub struct Pending {
    id: RequestId,
    rx: oneshot::Receiver<Result<SearchOutcome, SessionError>>,
}

impl Pending {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for Pending {
    type Output = Result<SearchOutcome, SessionError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(SessionError::SessionClosed)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Searching,
    /// Timed out; waiting for the late `bestmove`.
    Draining,
    /// Engine ignored `stop`; waiting for `readyok`.
    Syncing,
}

struct InFlight {
    id: RequestId,
    reply: Option<Reply>,
    last_info: Option<SearchInfo>,
    stop_sent: bool,
    phase: Phase,
}

struct Inner {
    state: SessionState,
    outbound: Option<mpsc::UnboundedSender<String>>,
    next_id: RequestId,
    in_flight: Option<InFlight>,
}

struct Shared {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
    config: SessionConfig,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct EngineSession {
    shared: Arc<Shared>,
}

impl EngineSession {
    /// Run the handshake over `channel` and return once the engine is ready.
    pub async fn connect(channel: LineChannel, config: SessionConfig) -> Result<Self, SessionError> {
        let LineChannel { tx, rx } = channel;
        let (state_tx, mut state_rx) = watch::channel(SessionState::Uninitialized);
        let handshake_timeout = config.handshake_timeout;
        let session = EngineSession {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: SessionState::Uninitialized,
                    outbound: Some(tx),
                    next_id: 1,
                    in_flight: None,
                }),
                state_tx,
                config,
            }),
        };

        {
            let mut inner = session.shared.inner.lock();
            send(&mut inner, &Command::Uci)?;
            session.shared.set_state(&mut inner, SessionState::HandshakePending);
        }
        tokio::spawn(read_loop(session.shared.clone(), rx));

        let settled = tokio::time::timeout(handshake_timeout, async {
            state_rx
                .wait_for(|s| matches!(s, SessionState::Ready | SessionState::Closed))
                .await
                .map(|state| *state)
        })
        .await;

        match settled {
            Ok(Ok(SessionState::Ready)) => {
                info!("Engine session ready");
                Ok(session)
            }
            Ok(_) => {
                error!("Engine closed the channel during handshake");
                Err(SessionError::SessionClosed)
            }
            Err(_) => {
                warn!(timeout = ?handshake_timeout, "Engine handshake timed out");
                session.shutdown();
                Err(SessionError::HandshakeTimeout(handshake_timeout))
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Search `position` to a fixed depth.
    pub fn analyze(&self, position: &Position, depth: u32) -> Result<Pending, SessionError> {
        self.submit(EngineRequest::Analyze {
            position: position.clone(),
            depth,
        })
    }

    /// Ask for a move within `movetime`, optionally at reduced strength.
    pub fn play(
        &self,
        position: &Position,
        skill: Option<u8>,
        movetime: Duration,
    ) -> Result<Pending, SessionError> {
        self.submit(EngineRequest::Play {
            position: position.clone(),
            skill,
            movetime,
        })
    }

    pub fn submit(&self, request: EngineRequest) -> Result<Pending, SessionError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        match inner.state {
            SessionState::Ready => {}
            SessionState::Busy => return Err(SessionError::EngineBusy),
            SessionState::ShuttingDown | SessionState::Closed => return Err(SessionError::SessionClosed),
            state => return Err(SessionError::NotReady(state)),
        }

        let id = inner.next_id;
        inner.next_id += 1;
        for command in request.commands() {
            if let Err(e) = send(&mut inner, &command) {
                shared.close(&mut inner);
                return Err(e);
            }
        }

        let (reply, rx) = oneshot::channel();
        inner.in_flight = Some(InFlight {
            id,
            reply: Some(reply),
            last_info: None,
            stop_sent: false,
            phase: Phase::Searching,
        });
        shared.set_state(&mut inner, SessionState::Busy);
        drop(inner);

        let deadline = request.deadline(&shared.config);
        debug!(request_id = id, ?deadline, "Engine request started");
        let watchdog = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            watchdog.on_deadline(id, deadline);
        });

        Ok(Pending { id, rx })
    }

    /// Ask the engine to finish the current search early.
    pub fn stop(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            SessionState::Busy => {}
            SessionState::ShuttingDown | SessionState::Closed => return Err(SessionError::SessionClosed),
            _ => return Err(SessionError::NotBusy),
        }
        let needs_stop = match inner.in_flight.as_mut() {
            Some(flight) if flight.phase == Phase::Searching && !flight.stop_sent => {
                flight.stop_sent = true;
                true
            }
            _ => false,
        };
        if needs_stop {
            send(&mut inner, &Command::Stop)?;
        }
        Ok(())
    }

    /// Tell the engine a new game starts. Only valid while idle.
    pub fn new_game(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            SessionState::Ready => {}
            SessionState::Busy => return Err(SessionError::EngineBusy),
            SessionState::ShuttingDown | SessionState::Closed => return Err(SessionError::SessionClosed),
            state => return Err(SessionError::NotReady(state)),
        }
        send(&mut inner, &Command::UciNewGame)?;
        send(&mut inner, &Command::IsReady)
    }

    /// Send `quit`, fail any in-flight request and close the channel.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();
        if matches!(inner.state, SessionState::ShuttingDown | SessionState::Closed) {
            return;
        }
        shared.set_state(&mut inner, SessionState::ShuttingDown);
        let _ = send(&mut inner, &Command::Quit);
        shared.close(&mut inner);
        info!("Engine session shut down");
    }
}

impl fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSession").field("state", &self.state()).finish()
    }
}

fn send(inner: &mut Inner, command: &Command) -> Result<(), SessionError> {
    let line = command.to_string();
    let outbound = inner.outbound.as_ref().ok_or(SessionError::SessionClosed)?;
    debug!(%line, "-> engine");
    outbound.send(line).map_err(|_| SessionError::SessionClosed)
}

async fn read_loop(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        shared.on_line(&line);
    }
    let mut inner = shared.inner.lock();
    if inner.state != SessionState::Closed {
        error!("Engine channel closed");
        shared.close(&mut inner);
    }
}

impl Shared {
    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "Engine session state");
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn close(&self, inner: &mut Inner) {
        if let Some(reply) = inner.in_flight.take().and_then(|flight| flight.reply) {
            let _ = reply.send(Err(SessionError::SessionClosed));
        }
        inner.outbound = None;
        self.set_state(inner, SessionState::Closed);
    }

    fn release(&self, inner: &mut Inner) {
        inner.in_flight = None;
        self.set_state(inner, SessionState::Ready);
    }

    fn on_line(&self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        debug!(line = line.trim_end(), "<- engine");

        let mut inner = self.inner.lock();
        match parse_line(line) {
            EngineResponse::HandshakeAck(Handshake::UciOk) => {
                if inner.state != SessionState::HandshakePending {
                    debug!("Unexpected uciok ignored");
                    return;
                }
                for (name, value) in &self.config.options {
                    let command = Command::SetOption {
                        name: name.clone(),
                        value: value.clone(),
                    };
                    if send(&mut inner, &command).is_err() {
                        return self.close(&mut inner);
                    }
                }
                if send(&mut inner, &Command::IsReady).is_err() {
                    self.close(&mut inner);
                }
            }
            EngineResponse::HandshakeAck(Handshake::ReadyOk) => {
                if inner.state == SessionState::HandshakePending {
                    self.set_state(&mut inner, SessionState::Ready);
                } else if matches!(&inner.in_flight, Some(flight) if flight.phase == Phase::Syncing) {
                    info!("Engine resynchronised after timeout");
                    self.release(&mut inner);
                }
            }
            EngineResponse::HandshakeAck(Handshake::Id { key, value }) => {
                info!(%key, %value, "Engine id");
            }
            EngineResponse::HandshakeAck(Handshake::Option(_)) => {}
            EngineResponse::Info(info) => match inner.in_flight.as_mut() {
                Some(flight) => {
                    if info.score.is_some() {
                        flight.last_info = Some(info);
                    }
                }
                None => debug!("Info with no request in flight dropped"),
            },
            EngineResponse::BestMove(best) => match inner.in_flight.take() {
                Some(flight) => {
                    settle(flight, best);
                    self.set_state(&mut inner, SessionState::Ready);
                }
                None => warn!(line, "Bestmove with no request in flight dropped"),
            },
            EngineResponse::Malformed(raw) => warn!(line = %raw, "Malformed engine line dropped"),
        }
    }

    fn on_deadline(self: &Arc<Self>, id: RequestId, after: Duration) {
        let mut inner = self.inner.lock();
        let Some(flight) = inner.in_flight.as_mut().filter(|f| f.id == id) else {
            return;
        };
        let Some(reply) = flight.reply.take() else {
            return;
        };
        warn!(request_id = id, ?after, "Engine request timed out");
        let _ = reply.send(Err(SessionError::EngineTimeout { request_id: id, after }));
        flight.phase = Phase::Draining;
        let needs_stop = !std::mem::replace(&mut flight.stop_sent, true);
        if needs_stop && send(&mut inner, &Command::Stop).is_err() {
            return self.close(&mut inner);
        }
        drop(inner);
        self.arm_drain(id);
    }

    fn arm_drain(self: &Arc<Self>, id: RequestId) {
        let shared = self.clone();
        let wait = self.config.drain_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            shared.on_drain_expired(id);
        });
    }

    fn on_drain_expired(self: &Arc<Self>, id: RequestId) {
        let mut inner = self.inner.lock();
        let Some(flight) = inner.in_flight.as_mut().filter(|f| f.id == id) else {
            return;
        };
        match flight.phase {
            Phase::Searching => {}
            Phase::Draining => {
                warn!(request_id = id, "Engine ignored stop; resyncing");
                flight.phase = Phase::Syncing;
                if send(&mut inner, &Command::IsReady).is_err() {
                    return self.close(&mut inner);
                }
                drop(inner);
                self.arm_drain(id);
            }
            Phase::Syncing => {
                error!(request_id = id, "Engine unresponsive; closing session");
                let _ = send(&mut inner, &Command::Quit);
                self.close(&mut inner);
            }
        }
    }
}

fn settle(flight: InFlight, best: BestMove) {
    let Some(reply) = flight.reply else {
        debug!(request_id = flight.id, "Late bestmove for timed-out request discarded");
        return;
    };
    let result = match best.mv {
        Some(best_move) => Ok(SearchOutcome {
            request_id: flight.id,
            best_move,
            ponder: best.ponder,
            info: flight.last_info,
        }),
        None if flight.stop_sent => Err(SessionError::Cancelled),
        None => Err(SessionError::NoBestMove),
    };
    let _ = reply.send(result);
}
