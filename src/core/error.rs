use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("cannot draw from an empty sequence (stream key: {key})")]
    EmptySequence { key: String },

    #[error("scope value cannot be canonically encoded: {0}")]
    ScopeEncoding(String),

    #[error("time must be monotonic: currently at day {current}, requested day {requested}")]
    NonMonotonicTime { current: u64, requested: u64 },

    #[error("day hook '{hook}' failed on day {day}: {message}")]
    HookFailed {
        hook: String,
        day: u64,
        message: String,
    },

    #[error("subscriber {id} failed on event {seq}: {message}")]
    SubscriberFault { id: u64, seq: u64, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot rejected: {0}")]
    SnapshotFormat(String),

    #[error("hook error: {0}")]
    Hook(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KernelError>;
