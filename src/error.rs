use thiserror::Error;

use crate::geo::CodecError;

#[derive(Debug, Error)]
pub enum GeonumError {
    #[error("redis error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("malformed user record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("unexpected reply to {command}")]
    UnexpectedReply { command: &'static str },

    #[error("write queue closed")]
    WriterClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GeonumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_converts() {
        let err: GeonumError = CodecError::InvalidPrecision(0).into();
        assert!(matches!(err, GeonumError::Codec(CodecError::InvalidPrecision(0))));
        assert_eq!(err.to_string(), "codec error: unsupported precision: 0");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: GeonumError = json_err.into();
        assert!(matches!(err, GeonumError::Record(_)));
        assert!(err.to_string().starts_with("malformed user record"));
    }
}
