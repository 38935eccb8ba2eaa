use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HwError {
    #[error("device not connected")]
    Disconnected,
    #[error("sensor timeout")]
    Timeout,
    #[error("heater command rejected: {0}")]
    CommandRejected(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
