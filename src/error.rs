use std::fmt;
use std::time::Duration;

/// Errors raised by the synchronization core.
///
/// The variant decides how the caller reacts:
/// - `Config`: fatal, the process exits
/// - `NotFound`: fatal at startup, treated as transient once running
/// - `Transient`: logged, retried on the next tick
/// - `Validation`: command rejected, nothing written, no retry
/// - `Upstream`: the vehicle API refused the command, no retry
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    Config(String),
    NotFound(String),
    Transient(String),
    Validation(String),
    Upstream(String),
}

impl SyncError {
    /// Timeout of a store, bus or HTTP call.
    pub fn timeout(operation: &str, after: Duration) -> Self {
        SyncError::Transient(format!(
            "{} timed out after {}ms",
            operation,
            after.as_millis()
        ))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }

    /// Startup reports a missing vehicle as a configuration problem; a running
    /// process reports it as a transient read failure.
    pub fn into_runtime(self) -> Self {
        match self {
            SyncError::NotFound(msg) => SyncError::Transient(msg),
            other => other,
        }
    }

    pub fn into_startup(self) -> Self {
        match self {
            SyncError::NotFound(msg) => SyncError::Config(msg),
            other => other,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Config(msg) => write!(f, "configuration error: {}", msg),
            SyncError::NotFound(msg) => write!(f, "not found: {}", msg),
            SyncError::Transient(msg) => write!(f, "transient failure: {}", msg),
            SyncError::Validation(msg) => write!(f, "rejected: {}", msg),
            SyncError::Upstream(msg) => write!(f, "vehicle API error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => SyncError::NotFound(e.to_string()),
            other => SyncError::Transient(format!("database: {}", other)),
        }
    }
}

impl From<rumqttc::ClientError> for SyncError {
    fn from(e: rumqttc::ClientError) -> Self {
        SyncError::Transient(format!("mqtt: {}", e))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transient(format!("http: {}", e))
    }
}

/// Bounds `fut` by `limit`, mapping an elapsed timer to `SyncError::Transient`.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, SyncError>
where
    F: std::future::Future<Output = Result<T, SyncError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::timeout(operation, limit)),
    }
}
