//! Synthesis session admission and buffered output delivery.
//!
//! A [`SynthesisSession`] runs one request at a time. Requests submitted
//! while a run is in flight wait in a FIFO queue; warmup requests wait in a
//! second, lower-priority queue. Packets produced by a run pass through an
//! [`OutputBuffer`] that releases them in arrival order once enough audio has
//! accumulated or the run's final packet arrives.

use crate::runtime_adapter::RuntimeError;
use thiserror::Error;

mod buffer;
mod packet;
mod session;

pub use buffer::OutputBuffer;
pub use packet::{DataPacket, PacketMetadata, RequestOverride, SynthRequest};
pub use session::{
    Admission, SessionConfig, SessionState, SessionStats, SynthesisSession, Synthesizer,
};

/// Error type for synthesis sessions.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Synthesis failed for session {session_id}: {message}")]
    Synthesis { session_id: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type for synthesis sessions.
pub type SessionResult<T> = Result<T, SessionError>;
