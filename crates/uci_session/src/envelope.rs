//! JSON envelope relay.
//!
//! Some deployments put the engine behind a socket that speaks small JSON
//! messages of the form `{"type": ..., "data": ...}` instead of raw protocol
//! lines. [`relay`] turns such a channel into an ordinary [`LineChannel`] so
//! the session never needs to know the difference.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::Score;
use crate::transport::LineChannel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Envelope {
    Play(PlayRequest),
    Analyze(AnalyzeRequest),
    Stop,
    Info(InfoUpdate),
    Bestmove(BestMoveReply),
    Error(String),
    Connect(ConnectNotice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRequest {
    pub fen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movetime: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub fen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoUpdate {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub time: Option<u64>,
    pub score: Option<ScoreValue>,
    pub pv: Option<Vec<String>>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreValue {
    pub cp: Option<i32>,
    pub mate: Option<i32>,
}

impl ScoreValue {
    fn score(&self) -> Option<Score> {
        match (self.mate, self.cp) {
            (Some(m), _) => Some(Score::Mate(m)),
            (None, Some(cp)) => Some(Score::Centipawns(cp)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMoveReply {
    pub bestmove: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ponder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectNotice {
    pub message: Option<String>,
    pub engine_status: Option<EngineStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineStatus {
    pub ready: bool,
    pub analyzing: bool,
}

impl InfoUpdate {
    /// Render as a protocol `info` line.
    fn to_line(&self) -> String {
        let mut line = String::from("info");
        if let Some(depth) = self.depth {
            line.push_str(&format!(" depth {depth}"));
        }
        match self.score.as_ref().and_then(ScoreValue::score) {
            Some(Score::Centipawns(cp)) => line.push_str(&format!(" score cp {cp}")),
            Some(Score::Mate(m)) => line.push_str(&format!(" score mate {m}")),
            None => {}
        }
        if let Some(nodes) = self.nodes {
            line.push_str(&format!(" nodes {nodes}"));
        }
        if let Some(time) = self.time {
            line.push_str(&format!(" time {time}"));
        }
        match &self.pv {
            Some(pv) if !pv.is_empty() => {
                line.push_str(" pv ");
                line.push_str(&pv.join(" "));
            }
            _ => {}
        }
        if let Some(message) = &self.message {
            line.push_str(" string ");
            line.push_str(message);
        }
        line
    }
}

/// Protocol-side state of the relay: what has been announced but not yet sent.
#[derive(Default)]
struct Outbox {
    fen: Option<String>,
    skill: Option<u8>,
    connected: bool,
    awaiting_ready: bool,
    /// A `play`/`analyze` envelope has gone out and its `bestmove` has not come back.
    in_flight: bool,
}

impl Outbox {
    /// `readyok` may only be synthesised once nothing older can still arrive.
    fn can_ack_ready(&self) -> bool {
        self.connected && !self.in_flight
    }
}

/// Wrap a channel of JSON envelope texts as a protocol line channel.
///
/// Returns the session-side end. The relay task ends when either side closes.
pub fn relay(json: LineChannel) -> LineChannel {
    let (session_end, relay_end) = LineChannel::pair();
    let LineChannel {
        tx: json_tx,
        rx: mut json_rx,
    } = json;
    let LineChannel {
        tx: line_tx,
        rx: mut line_rx,
    } = relay_end;

    tokio::spawn(async move {
        let mut outbox = Outbox::default();
        loop {
            tokio::select! {
                line = line_rx.recv() => {
                    let Some(line) = line else { break };
                    if !outbound(&mut outbox, &line, &json_tx, &line_tx) {
                        break;
                    }
                }
                text = json_rx.recv() => {
                    let Some(text) = text else { break };
                    if !inbound(&mut outbox, &text, &line_tx) {
                        break;
                    }
                }
            }
        }
        debug!("Envelope relay finished");
    });

    session_end
}

/// Handle one protocol line from the session. Returns `false` to end the relay.
fn outbound(
    outbox: &mut Outbox,
    line: &str,
    json_tx: &mpsc::UnboundedSender<String>,
    line_tx: &mpsc::UnboundedSender<String>,
) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let envelope = match parts.as_slice() {
        ["uci"] | ["ucinewgame"] => None,
        ["isready"] => {
            if outbox.can_ack_ready() {
                return line_tx.send("readyok".to_string()).is_ok();
            }
            outbox.awaiting_ready = true;
            None
        }
        ["setoption", "name", "Skill", "Level", "value", value] => {
            outbox.skill = value.parse().ok();
            None
        }
        ["setoption", ..] => {
            debug!(%line, "Option not forwarded over envelope relay");
            None
        }
        ["position", "fen", fen @ ..] if !fen.is_empty() => {
            outbox.fen = Some(fen.join(" "));
            None
        }
        ["go", "depth", depth] => outbox.fen.take().map(|fen| {
            Envelope::Analyze(AnalyzeRequest {
                fen,
                depth: depth.parse().ok(),
            })
        }),
        ["go", "movetime", ms] => outbox.fen.take().map(|fen| {
            Envelope::Play(PlayRequest {
                fen,
                skill: outbox.skill.take(),
                movetime: ms.parse().ok(),
            })
        }),
        ["stop"] => Some(Envelope::Stop),
        ["quit"] => return false,
        _ => {
            warn!(%line, "Line has no envelope form; dropped");
            None
        }
    };

    match envelope {
        Some(envelope) => match serde_json::to_string(&envelope) {
            Ok(text) => {
                if matches!(envelope, Envelope::Play(_) | Envelope::Analyze(_)) {
                    outbox.in_flight = true;
                }
                json_tx.send(text).is_ok()
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode envelope");
                true
            }
        },
        None => true,
    }
}

/// Handle one JSON text from the engine side. Returns `false` to end the relay.
fn inbound(outbox: &mut Outbox, text: &str, line_tx: &mpsc::UnboundedSender<String>) -> bool {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, %text, "Undecodable envelope dropped");
            return true;
        }
    };

    let mut lines = Vec::new();
    match envelope {
        Envelope::Connect(notice) => {
            info!(message = ?notice.message, "Engine relay connected");
            outbox.connected = true;
            lines.push("uciok".to_string());
        }
        Envelope::Info(update) => lines.push(update.to_line()),
        Envelope::Bestmove(reply) => {
            let mut line = format!("bestmove {}", reply.bestmove);
            if let Some(ponder) = reply.ponder {
                line.push_str(&format!(" ponder {ponder}"));
            }
            lines.push(line);
            outbox.in_flight = false;
        }
        Envelope::Error(message) => warn!(%message, "Engine relay reported an error"),
        other => warn!(envelope = ?other, "Unexpected envelope from engine side"),
    }

    if outbox.awaiting_ready && outbox.can_ack_ready() {
        outbox.awaiting_ready = false;
        lines.push("readyok".to_string());
    }
    lines.into_iter().all(|line| line_tx.send(line).is_ok())
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod envelope_tests;
