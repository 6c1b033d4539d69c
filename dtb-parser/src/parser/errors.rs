use thiserror::Error;

/// Errors that can occur while decoding a device tree blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The blob is not a well-formed flattened device tree.
    #[error("malformed device tree blob: {0}")]
    MalformedBlob(String),
    /// Fewer bytes are available than the blob declares.
    #[error("truncated device tree blob: {needed} bytes needed but only {available} available")]
    TruncatedInput { needed: usize, available: usize },
}

impl DecodeError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DecodeError::MalformedBlob(msg.into())
    }
}
