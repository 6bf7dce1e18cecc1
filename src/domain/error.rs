use crate::domain::models::GattStatus;
use thiserror::Error;

/// Errors surfaced by the emulator itself (never to the peer)
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("Emulator service is no longer running")]
    ServiceClosed,
}

/// Failures reported synchronously by the platform transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("operation not supported by the radio")]
    Unsupported,
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// LED matrix payload decoding failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid payload length {len} (expected 13)")]
    InvalidLength { len: usize },
    #[error("invalid write offset {offset}")]
    InvalidOffset { offset: u16 },
}

impl From<CodecError> for GattStatus {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::InvalidLength { .. } => GattStatus::InvalidAttributeLength,
            CodecError::InvalidOffset { .. } => GattStatus::InvalidOffset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_status() {
        assert_eq!(
            GattStatus::from(CodecError::InvalidLength { len: 4 }),
            GattStatus::InvalidAttributeLength
        );
        assert_eq!(
            GattStatus::from(CodecError::InvalidOffset { offset: 1 }),
            GattStatus::InvalidOffset
        );
    }
}
