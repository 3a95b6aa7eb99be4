//! Error types for identity operations

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The facade operation an error or deadline belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Initialize,
    AuthenticateUser,
    GetSessionCookie,
    AuthUser,
    GetUserByUid,
    CreateCustomToken,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Initialize => "initialize",
            Step::AuthenticateUser => "authenticate user",
            Step::GetSessionCookie => "get session cookie",
            Step::AuthUser => "verify session cookie",
            Step::GetUserByUid => "get user by uid",
            Step::CreateCustomToken => "create custom token",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::AuthSession`] operations
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A prerequisite field was never set (caller programming error)
    #[error("{0} is not set")]
    Config(&'static str),

    #[error("error initializing admin client: {0}")]
    Init(String),

    /// The password grant was rejected; carries the provider message
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected provider response: {0}")]
    Protocol(String),

    #[error("session cookie error: {0}")]
    Session(String),

    #[error("failed to get user: {0}")]
    Lookup(String),

    #[error("failed to create custom token: {0}")]
    Mint(String),

    #[error("{step} timed out after {after:?}")]
    Timeout { step: Step, after: Duration },
}

impl IdentityError {
    /// Error kind name, stable for logging
    pub fn kind(&self) -> &'static str {
        match self {
            IdentityError::Config(_) => "config",
            IdentityError::Init(_) => "init",
            IdentityError::Auth(_) => "auth",
            IdentityError::Protocol(_) => "protocol",
            IdentityError::Session(_) => "session",
            IdentityError::Lookup(_) => "lookup",
            IdentityError::Mint(_) => "mint",
            IdentityError::Timeout { .. } => "timeout",
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_step() {
        assert_eq!(
            IdentityError::Config("ID token").to_string(),
            "ID token is not set"
        );
        assert_eq!(
            IdentityError::Auth("INVALID_PASSWORD".to_string()).to_string(),
            "authentication failed: INVALID_PASSWORD"
        );

        let timeout = IdentityError::Timeout {
            step: Step::GetSessionCookie,
            after: Duration::from_millis(250),
        };
        assert_eq!(timeout.to_string(), "get session cookie timed out after 250ms");
        assert_eq!(timeout.kind(), "timeout");
    }
}
