use std::fmt;

use serde_json::{json, Value};

pub const SECURITY_ERROR_NAME: &str = "SecurityError";
pub const DATA_ERROR_NAME: &str = "DataError";
pub const UNKNOWN_ERROR_NAME: &str = "UnknownError";
pub const CONSTRAINT_ERROR_NAME: &str = "ConstraintError";
pub const ABORT_ERROR_NAME: &str = "AbortError";
pub const NOT_FOUND_ERROR_NAME: &str = "NotFoundError";
pub const INVALID_STATE_ERROR_NAME: &str = "InvalidStateError";
pub const INVALID_ACCESS_ERROR_NAME: &str = "InvalidAccessError";

/// Typed failure delivered on every error-completion path.
///
/// Remote failures keep the server-reported `errorName`/`error` pair verbatim;
/// local failures synthesize the same shape so the host observes one format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageFailure {
    pub name: String,
    pub message: String,
}

impl StorageFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Remote error passed through with both fields preserved.
    pub fn remote(error_name: Option<&str>, error_message: &str) -> Self {
        Self {
            name: error_name.unwrap_or(UNKNOWN_ERROR_NAME).to_owned(),
            message: error_message.to_owned(),
        }
    }

    pub fn not_connected() -> Self {
        Self::new(
            INVALID_STATE_ERROR_NAME,
            "connection to remote storage is not open",
        )
    }

    pub fn connection_lost(close_code: u16, close_reason: &str) -> Self {
        Self::new(
            ABORT_ERROR_NAME,
            format!("connection lost (code {close_code}): {close_reason}"),
        )
    }

    pub fn aborted() -> Self {
        Self::new(ABORT_ERROR_NAME, "transaction was aborted")
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(CONSTRAINT_ERROR_NAME, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(NOT_FOUND_ERROR_NAME, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(INVALID_STATE_ERROR_NAME, message)
    }

    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::new(INVALID_ACCESS_ERROR_NAME, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(DATA_ERROR_NAME, message)
    }

    pub fn is_security(&self) -> bool {
        self.name == SECURITY_ERROR_NAME
    }

    pub fn log_payload(&self) -> Value {
        json!({
            "error_name": self.name,
            "error": self.message,
        })
    }
}

impl fmt::Display for StorageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for StorageFailure {}

#[cfg(test)]
mod tests {
    use super::{StorageFailure, ABORT_ERROR_NAME, UNKNOWN_ERROR_NAME};

    #[test]
    fn remote_failure_preserves_name_and_message_verbatim() {
        let failure = StorageFailure::remote(Some("SecurityError"), "Session expired, please reload");
        assert_eq!(failure.name, "SecurityError");
        assert_eq!(failure.message, "Session expired, please reload");
    }

    #[test]
    fn remote_failure_without_name_defaults_to_unknown() {
        let failure = StorageFailure::remote(None, "Database write failed");
        assert_eq!(failure.name, UNKNOWN_ERROR_NAME);
    }

    #[test]
    fn connection_lost_carries_close_code_and_reason() {
        let failure = StorageFailure::connection_lost(1006, "socket read error");
        assert_eq!(failure.name, ABORT_ERROR_NAME);
        assert!(failure.message.contains("1006"));
        assert!(failure.message.contains("socket read error"));
    }

    #[test]
    fn display_joins_name_and_message() {
        let failure = StorageFailure::constraint("object store 'save' already exists");
        assert_eq!(
            failure.to_string(),
            "ConstraintError: object store 'save' already exists"
        );
    }
}
