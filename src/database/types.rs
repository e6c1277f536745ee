//! Database-facing types and error definitions.

use thiserror::Error;

/// Outcome of an idempotent bucket creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    Existing,
}

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The HTTP API could not be reached.
    #[error("database unreachable: {0}")]
    Unreachable(String),

    /// The write credential was rejected.
    #[error("database rejected the write credential (HTTP {0})")]
    Unauthorized(u16),

    /// The organization does not exist or is not visible to the credential.
    #[error("organization not found: {0}")]
    UnknownOrganization(String),

    /// The bucket already exists.
    #[error("bucket already exists: {0}")]
    AlreadyExists(String),

    /// Any other non-success response.
    #[error("database returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid database address: {0}")]
    Address(String),

    #[error("unexpected database response: {0}")]
    Decode(String),
}

impl DatabaseError {
    /// Map a non-success status to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => DatabaseError::Unauthorized(status),
            _ => DatabaseError::Status { status, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            DatabaseError::from_status(401, String::new()),
            DatabaseError::Unauthorized(401)
        ));
        assert!(matches!(
            DatabaseError::from_status(500, "boom".into()),
            DatabaseError::Status { status: 500, .. }
        ));
    }
}
