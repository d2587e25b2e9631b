use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("item {ordinal} is out of range (0..{count})")]
    OutOfRange { ordinal: usize, count: usize },
    #[error("unknown label: {0}")]
    UnknownLabel(String),
    #[error("invalid value {value:?} for label {label}")]
    InvalidValue { label: String, value: String },
    #[error("label {label} accepts a single value, got {count}")]
    TooManyValues { label: String, count: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to persist results to {path:?}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, AnnotateError>;

impl AnnotateError {
    /// Errors caused by the request itself rather than by the process state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnnotateError::OutOfRange { .. }
                | AnnotateError::UnknownLabel(_)
                | AnnotateError::InvalidValue { .. }
                | AnnotateError::TooManyValues { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_are_client_errors() {
        assert!(AnnotateError::UnknownLabel("topic".into()).is_client_error());
        assert!(AnnotateError::OutOfRange {
            ordinal: 3,
            count: 2
        }
        .is_client_error());
        let persist = AnnotateError::Persist {
            path: PathBuf::from("results.csv"),
            reason: "disk full".into(),
        };
        assert!(!persist.is_client_error());
    }
}
