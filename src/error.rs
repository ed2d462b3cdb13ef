use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum OrgError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("failed to update child departments: {0}")]
    UpdateChildren(#[source] sea_orm::DbErr),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for application
pub type OrgResult<T> = Result<T, OrgError>;

/// Helper trait for converting Option to OrgError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> OrgResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> OrgResult<T> {
        self.ok_or_else(|| OrgError::NotFound(msg.into()))
    }
}

/// Helper to convert anyhow errors to OrgError
impl From<anyhow::Error> for OrgError {
    fn from(err: anyhow::Error) -> Self {
        OrgError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("department");
        assert!(matches!(result, Err(OrgError::NotFound(_))));

        let opt = Some(7);
        assert_eq!(opt.ok_or_not_found("department").unwrap(), 7);
    }

    #[test]
    fn test_error_display() {
        let err = OrgError::Conflict("parent_id.conflict".to_string());
        assert_eq!(err.to_string(), "conflict: parent_id.conflict");

        let err = OrgError::Cancelled;
        assert_eq!(err.to_string(), "operation cancelled");
    }
}
