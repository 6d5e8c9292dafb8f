use std::time::Duration;

/// Core error type for the curator.
///
/// Adapter crates map their transport errors into this type so the core can
/// tell per-link failures, skippable scopes and retry-after signals apart.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("fetch failed{}: {reason}", status_suffix(.status))]
    Fetch { status: Option<u16>, reason: String },

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("missing permission in {scope}")]
    Permission { scope: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn permission(scope: impl Into<String>) -> Self {
        Error::Permission {
            scope: scope.into(),
        }
    }

    pub fn fetch_status(status: u16) -> Self {
        Error::Fetch {
            status: Some(status),
            reason: "non-success status".to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
