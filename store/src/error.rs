use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key {key} is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("cannot set {key}: {segment} is not an object")]
    NotAnObject { key: String, segment: String },

    #[error("store lock poisoned")]
    Poisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
