#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A configuration value is missing, unparseable, or out of range.
    /// Fatal: raised before any run starts.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A raw record failed required-field validation in the normalizer.
    #[error("Malformed {kind} record: {reason}")]
    MalformedRecord { kind: &'static str, reason: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        AppError::ConfigurationInvalid(msg.into())
    }

    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        AppError::MalformedRecord {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
