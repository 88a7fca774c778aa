use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("url decode error: {0}")]
    Url(String),
    #[error("base64 decode error: {0}")]
    Base64(String),
}
