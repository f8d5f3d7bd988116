//! Error types for the bridge.
//!
//! - `ProviderError`: frame acquisition or playback control failed (transient, non-fatal)
//! - `EncodeError`: a message cannot be encoded within the packet limit (fatal)
//! - `TransportError`: a datagram could not be sent (logged and dropped)

use thiserror::Error;

/// Tracking / recording provider failures
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A recorded or streamed frame could not be parsed
    #[error("invalid frame at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("seek out of range: index {index}, recording has {len} frames")]
    SeekOutOfRange { index: u64, len: u64 },

    #[error("invalid playback speed: {0}")]
    InvalidSpeed(f32),
}

/// OSC encoding failures
#[derive(Error, Debug)]
pub enum EncodeError {
    /// A single message does not fit into one packet
    #[error("message {address} needs {size} bytes, packet limit is {max}")]
    MessageTooLarge {
        address: String,
        size: usize,
        max: usize,
    },

    #[error("OSC encoder error: {0}")]
    Osc(#[from] rosc::OscError),
}

/// Network transport failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve target address {0}")]
    Resolve(String),
}

/// Errors surfaced by `FrameProcessor::tick`
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodeError),
}

impl BridgeError {
    /// Encoding overflow means the schema or the packet limit is wrong; nothing to retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Encoding(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_are_not_fatal() {
        let err = BridgeError::from(ProviderError::SeekOutOfRange { index: 10, len: 5 });
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "provider error: seek out of range: index 10, recording has 5 frames"
        );
    }

    #[test]
    fn test_encoding_errors_are_fatal() {
        let err = BridgeError::from(EncodeError::MessageTooLarge {
            address: "/user/1/state".to_string(),
            size: 2048,
            max: 1024,
        });
        assert!(err.is_fatal());
    }
}
