use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("queue not found: {0}")]
    QueueNotFound(String),
    #[error("peek failed: {0}")]
    PeekFailed(String),
    #[error("close failed: {0}")]
    CloseFailed(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}
