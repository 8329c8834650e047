//! Call-by-name RPC between the master and its slaves.
//!
//! Frames are newline-delimited JSON over a plain TCP stream. A request
//! carries `{id, method, params}`, the matching response `{id, result}` or
//! `{id, error}`. Calls on one connection are answered in order.

pub mod client;
pub mod protocol;
pub mod server;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

pub use client::{RpcClient, DIAL_TIMEOUT};
pub use protocol::{Ping, PingReply, SubmissionJob, SubmissionJobResult};
pub use server::{JudgeService, RpcServer};

/// Largest accepted frame. Jobs carry every test case inline.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("dialing {address} timed out after {timeout_secs}s")]
    DialTimeout { address: String, timeout_secs: u64 },

    #[error("failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Codec(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("response id {got} does not match request id {expected}")]
    ResponseMismatch { expected: u64, got: u64 },

    /// The remote handler ran and reported a failure
    #[error("remote error: {0}")]
    Remote(String),
}

impl RpcError {
    /// True for failures of the connection itself rather than of the call
    pub fn is_transport(&self) -> bool {
        !matches!(self, RpcError::Remote(_))
    }
}

impl From<LinesCodecError> for RpcError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(e) => RpcError::Io(e),
            LinesCodecError::MaxLineLengthExceeded => {
                RpcError::Codec("frame exceeds maximum length".into())
            }
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Codec(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_are_not_transport_errors() {
        assert!(!RpcError::Remote("boom".into()).is_transport());
        assert!(RpcError::ConnectionClosed.is_transport());
        assert!(RpcError::DialTimeout {
            address: "10.0.0.1:28499".into(),
            timeout_secs: 15
        }
        .is_transport());
    }
}
