use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("Invalid trace key: {0}")]
    InvalidKey(String),
}
