use thiserror::Error;

/// Failure reported by a key-value backend.
///
/// Store operations surface these unchanged so callers can tell a storage
/// outage apart from a missing note or cell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage rejected the request: {0}")]
    Rejected(String),

    #[error("value of {size} bytes exceeds the storage quota of {limit} bytes")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("value could not be converted for storage: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("persisted notes record is malformed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("notes record changed concurrently; gave up after {attempts} attempts")]
    Conflict { attempts: usize },
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_pass_through_display_unchanged() {
        let inner = BackendError::rejected("Failed to save data: QUOTA_BYTES");
        let outer = StoreError::from(inner.clone());
        assert_eq!(outer.to_string(), inner.to_string());
        assert!(matches!(outer, StoreError::Backend(BackendError::Rejected(_))));
    }

    #[test]
    fn quota_message_names_both_sizes() {
        let err = BackendError::QuotaExceeded {
            size: 9000,
            limit: 8192,
        };
        assert_eq!(
            err.to_string(),
            "value of 9000 bytes exceeds the storage quota of 8192 bytes"
        );
    }
}
