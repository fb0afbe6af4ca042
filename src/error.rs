//! Error taxonomy for the extract pipeline.
//!
//! Every failure carries the pipeline stage it happened in. Collaborators
//! (query engine, file store, publisher) report plain [`anyhow::Error`]s; the
//! orchestration layer wraps them in the matching variant without touching
//! the cause, so the original chain is still reachable through
//! [`std::error::Error::source`]:
//!
//! ```
//! use hyperleaup::error::HyperleaupError;
//!
//! fn report(err: &HyperleaupError) -> String {
//!     match err {
//!         HyperleaupError::Configuration(msg) => format!("bad arguments: {msg}"),
//!         HyperleaupError::Publish(cause) => format!("upload failed: {cause:#}"),
//!         other => format!("{} stage failed: {other}", other.stage()),
//!     }
//! }
//! ```

use std::fmt;

/// Main error type for extract operations.
#[derive(Debug)]
pub enum HyperleaupError {
    /// Invalid or contradictory construction arguments
    Configuration(String),

    /// The source SQL could not be resolved to a dataset
    Query(anyhow::Error),

    /// Normalizing or writing the extract file failed
    Materialization(anyhow::Error),

    /// Reading the materialized extract failed
    FileAccess(anyhow::Error),

    /// Authentication or upload to the remote server failed
    Publish(anyhow::Error),
}

impl HyperleaupError {
    /// Name of the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Query(_) => "query",
            Self::Materialization(_) => "materialization",
            Self::FileAccess(_) => "file access",
            Self::Publish(_) => "publish",
        }
    }
}

impl fmt::Display for HyperleaupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            Self::Query(e) => write!(f, "Query error: {e:#}"),
            Self::Materialization(e) => write!(f, "Materialization error: {e:#}"),
            Self::FileAccess(e) => write!(f, "File access error: {e:#}"),
            Self::Publish(e) => write!(f, "Publish error: {e:#}"),
        }
    }
}

impl std::error::Error for HyperleaupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(_) => None,
            Self::Query(e) | Self::Materialization(e) | Self::FileAccess(e) | Self::Publish(e) => {
                Some(&**e)
            }
        }
    }
}

impl From<serde_json::Error> for HyperleaupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("JSON error: {err}"))
    }
}

// Plain-text surfaces (CLI output, bindings) only need the message
impl From<HyperleaupError> for String {
    fn from(err: HyperleaupError) -> Self {
        err.to_string()
    }
}

/// Result type alias for extract operations.
pub type Result<T> = std::result::Result<T, HyperleaupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = HyperleaupError::Configuration("exactly one source is required".to_owned());
        assert_eq!(
            err.to_string(),
            "Configuration error: exactly one source is required"
        );
    }

    #[test]
    fn test_stage_wrapping_keeps_cause() {
        let cause = anyhow::anyhow!("connection reset").context("Failed to sign in");
        let err = HyperleaupError::Publish(cause);

        assert_eq!(err.stage(), "publish");
        assert_eq!(
            err.to_string(),
            "Publish error: Failed to sign in: connection reset"
        );
        let source = err.source().expect("publish errors carry their cause");
        assert_eq!(source.to_string(), "Failed to sign in");
    }

    #[test]
    fn test_configuration_has_no_source() {
        let err = HyperleaupError::Configuration("missing name".to_owned());
        assert!(err.source().is_none());
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = HyperleaupError::FileAccess(anyhow::anyhow!("extract file not found"));
        let s: String = err.into();
        assert_eq!(s, "File access error: extract file not found");
    }
}
