//! Engine session over the UCI line protocol.
//!
//! - [`protocol`]: outbound commands and the inbound line parser
//! - [`session`]: handshake, single-slot request multiplexing, timeouts
//! - [`transport`]: in-memory and child-process line channels
//! - [`envelope`]: JSON envelope relay for engines behind a socket

pub mod envelope;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use protocol::{BestMove, Command, EngineResponse, Handshake, Score, ScoreBound, SearchInfo};
pub use session::{
    EngineRequest, EngineSession, Pending, RequestId, SearchOutcome, SessionConfig, SessionState,
};
pub use transport::{LineChannel, ProcessTransport};
