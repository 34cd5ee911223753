use thiserror::Error;

/// Error taxonomy shared by every adapter and service.
///
/// Variants map 1:1 onto the externally observable failure classes: the
/// HTTP layer turns them into status codes and the pipeline turns them
/// into document status transitions. `Transient` is the only class the
/// retry helper will re-attempt.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the retry helper should re-attempt the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Short message recorded in `documents.error_message` on FAILED.
    pub fn pipeline_message(&self) -> String {
        match self {
            Self::UnsupportedMedia(mime) => format!("unsupported media type: {mime}"),
            other => other.to_string().chars().take(500).collect(),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("row", "unknown"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Transient(err.to_string()),
            _ => Self::Permanent(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found("file", err.to_string()),
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::Interrupted => Self::Transient(err.to_string()),
            _ => Self::Permanent(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Connectivity problems and 5xx responses are worth retrying,
        // 4xx responses are not.
        let retryable = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.is_server_error())
                .unwrap_or(false);
        if retryable {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent(format!("serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Transient("timeout".into()).is_transient());
        assert!(!Error::Permanent("bad schema".into()).is_transient());
        assert!(!Error::Validation("empty name".into()).is_transient());
    }

    #[test]
    fn not_found_display() {
        let err = Error::not_found("document", "d-1");
        assert_eq!(err.to_string(), "document not found: d-1");
    }

    #[test]
    fn unsupported_media_pipeline_message() {
        let err = Error::UnsupportedMedia("image/png".into());
        assert_eq!(err.pipeline_message(), "unsupported media type: image/png");
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(Error::from(io), Error::NotFound { .. }));
    }

    #[test]
    fn io_timeout_maps_to_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(Error::from(io).is_transient());
    }
}
