//! Error types.
//!
//! Input errors (malformed filter text, bad page numbers) never surface as
//! errors: they degrade to defaults inside the codecs. Configuration errors
//! found while building a collection are reported through [`ConfigError`];
//! ones found at query time are logged and skipped. Only execution and
//! bulk-action failures reach the host.

use thiserror::Error;

/// Failure reported by an [`Executor`](crate::executor::Executor).
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("executor task aborted")]
    Aborted,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ExecuteError {
    /// Message suitable for showing to the user.
    ///
    /// Internal errors are logged in full but shown vaguely.
    pub fn user_message(&self) -> String {
        match self {
            ExecuteError::Internal(e) => {
                tracing::error!(error = %e, "internal executor error");
                "internal error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Invalid collection configuration, rejected when the collection is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size must be greater than zero")]
    ZeroPageSize,

    #[error("default page size {default} exceeds maximum {max}")]
    PageSizeAboveMax { default: u32, max: u32 },

    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("field name '{0}' is reserved for pagination state")]
    ReservedField(String),

    #[error("id field must not be empty")]
    EmptyIdField,

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("sort cycle for field '{0}' is empty")]
    EmptySortCycle(String),
}

/// Failure of a bulk action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BulkError {
    #[error("no rows selected")]
    EmptySelection,

    #[error("another bulk action is still running")]
    AlreadyRunning,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("{0}")]
    Failed(String),
}

/// The controller's task has exited (unmounted or all handles dropped).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("collection controller has stopped")]
pub struct ControllerStopped;

/// Result alias for executor calls.
pub type ExecuteResult<T> = Result<T, ExecuteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_vague_to_users() {
        let err = ExecuteError::Internal(anyhow::anyhow!("connection reset by peer"));
        assert_eq!(err.user_message(), "internal error");

        let err = ExecuteError::Query("statement timeout".to_string());
        assert_eq!(err.user_message(), "query failed: statement timeout");
    }

    #[test]
    fn bulk_error_messages() {
        assert_eq!(BulkError::EmptySelection.to_string(), "no rows selected");
        assert_eq!(
            BulkError::UnknownAction("archive".to_string()).to_string(),
            "unknown action 'archive'"
        );
    }
}
