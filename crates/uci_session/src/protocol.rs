//! Line grammar of the engine channel.
//!
//! Outbound lines are built from [`Command`]; inbound lines are tokenized
//! positionally by [`parse_line`] into an [`EngineResponse`]. Anything that
//! does not fit a known grammar comes back as `Malformed` so the session can
//! log and drop it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A command written to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Uci,
    IsReady,
    UciNewGame,
    Position { fen: String },
    GoDepth(u32),
    GoMovetime(u64),
    Stop,
    Quit,
    SetOption { name: String, value: String },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Uci => write!(f, "uci"),
            Command::IsReady => write!(f, "isready"),
            Command::UciNewGame => write!(f, "ucinewgame"),
            Command::Position { fen } => write!(f, "position fen {fen}"),
            Command::GoDepth(depth) => write!(f, "go depth {depth}"),
            Command::GoMovetime(ms) => write!(f, "go movetime {ms}"),
            Command::Stop => write!(f, "stop"),
            Command::Quit => write!(f, "quit"),
            Command::SetOption { name, value } => write!(f, "setoption name {name} value {value}"),
        }
    }
}

/// Engine evaluation, relative to the side to move unless a relay says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Centipawns(i32),
    /// Moves to mate; negative when the side to move is getting mated.
    Mate(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

/// One `info` line. Every field is optional because engines send partial lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub bound: Option<ScoreBound>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
    pub hashfull: Option<u32>,
    pub currmove: Option<String>,
    pub currmovenumber: Option<u32>,
    /// Principal variation in engine coordinate notation.
    pub pv: Vec<String>,
    /// Free text from `info string`.
    pub string: Option<String>,
}

/// `bestmove` line. `mv` is `None` for `(none)` / `0000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    pub mv: Option<String>,
    pub ponder: Option<String>,
}

/// Tokens exchanged while the session is being set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    UciOk,
    ReadyOk,
    Id { key: String, value: String },
    Option(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineResponse {
    Info(SearchInfo),
    BestMove(BestMove),
    HandshakeAck(Handshake),
    Malformed(String),
}

/// Parse one inbound line.
pub fn parse_line(line: &str) -> EngineResponse {
    let line = line.trim();
    let parts: Vec<&str> = line.split_whitespace().collect();
    let malformed = || EngineResponse::Malformed(line.to_string());

    match parts.first().copied() {
        Some("uciok") if parts.len() == 1 => EngineResponse::HandshakeAck(Handshake::UciOk),
        Some("readyok") if parts.len() == 1 => EngineResponse::HandshakeAck(Handshake::ReadyOk),
        Some("id") if parts.len() >= 3 => EngineResponse::HandshakeAck(Handshake::Id {
            key: parts[1].to_string(),
            value: parts[2..].join(" "),
        }),
        Some("option") if parts.len() >= 2 => {
            EngineResponse::HandshakeAck(Handshake::Option(parts[1..].join(" ")))
        }
        Some("bestmove") => parse_bestmove(&parts[1..]).map_or_else(malformed, EngineResponse::BestMove),
        Some("info") => parse_info(&parts[1..]).map_or_else(malformed, EngineResponse::Info),
        _ => malformed(),
    }
}

fn parse_bestmove(args: &[&str]) -> Option<BestMove> {
    let mv = match *args.first()? {
        "(none)" | "0000" => None,
        text if looks_like_move(text) => Some(text.to_string()),
        _ => return None,
    };
    let ponder = match args.get(1..) {
        Some(["ponder", p]) if looks_like_move(p) => Some(p.to_string()),
        Some([]) | None => None,
        _ => return None,
    };
    Some(BestMove { mv, ponder })
}

fn parse_info(args: &[&str]) -> Option<SearchInfo> {
    let mut info = SearchInfo::default();
    let mut i = 0;

    fn value<T: FromStr>(args: &[&str], i: &mut usize) -> Option<T> {
        *i += 1;
        args.get(*i)?.parse().ok()
    }

    while i < args.len() {
        match args[i] {
            "depth" => info.depth = Some(value(args, &mut i)?),
            "seldepth" => info.seldepth = Some(value(args, &mut i)?),
            "multipv" => info.multipv = Some(value(args, &mut i)?),
            "nodes" => info.nodes = Some(value(args, &mut i)?),
            "nps" => info.nps = Some(value(args, &mut i)?),
            "time" => info.time_ms = Some(value(args, &mut i)?),
            "hashfull" => info.hashfull = Some(value(args, &mut i)?),
            "currmovenumber" => info.currmovenumber = Some(value(args, &mut i)?),
            "currmove" => {
                i += 1;
                let mv = args.get(i)?;
                if !looks_like_move(mv) {
                    return None;
                }
                info.currmove = Some(mv.to_string());
            }
            "score" => {
                i += 1;
                let kind = *args.get(i)?;
                let n: i32 = value(args, &mut i)?;
                info.score = Some(match kind {
                    "cp" => Score::Centipawns(n),
                    "mate" => Score::Mate(n),
                    _ => return None,
                });
                match args.get(i + 1).copied() {
                    Some("lowerbound") => {
                        info.bound = Some(ScoreBound::Lower);
                        i += 1;
                    }
                    Some("upperbound") => {
                        info.bound = Some(ScoreBound::Upper);
                        i += 1;
                    }
                    _ => {}
                }
            }
            "pv" => {
                let line = &args[i + 1..];
                if line.is_empty() || !line.iter().all(|m| looks_like_move(m)) {
                    return None;
                }
                info.pv = line.iter().map(|m| m.to_string()).collect();
                break;
            }
            "string" => {
                info.string = Some(args[i + 1..].join(" "));
                break;
            }
            // Keys this client does not track (wdl, tbhits, refutation...) and
            // their values are skipped.
            _ => {}
        }
        i += 1;
    }

    Some(info)
}

/// Shape check for coordinate notation; legality is the translator's job.
fn looks_like_move(text: &str) -> bool {
    let b = text.as_bytes();
    (4..=5).contains(&b.len())
        && (b'a'..=b'h').contains(&b[0])
        && (b'1'..=b'8').contains(&b[1])
        && (b'a'..=b'h').contains(&b[2])
        && (b'1'..=b'8').contains(&b[3])
        && b.get(4).map_or(true, |p| b"qrbn".contains(p))
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod protocol_tests;
