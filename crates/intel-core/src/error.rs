use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntelError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Bus error: {0}")]
    BusError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
