use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("LOG_FORMAT: {0} (expected: text|json|journald)")]
    InvalidFormat(String),
    #[error("LOG_FORMAT: journald is not supported on this platform or build")]
    JournaldNotSupported,
    #[error("logger has been already initialized")]
    AlreadyInitialized,
    #[error("failed to initialize logger: {0}")]
    InitializationFailed(String),
    #[error("LOG_LEVEL: invalid filter {0:?}")]
    InvalidLogLevel(String),
}
