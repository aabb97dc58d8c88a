//! Crypto error types.

/// Errors from key handling and config packaging.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid base64 key: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Archive packaging failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
