//! Service-account key loading

use std::path::Path;

use jsonwebtoken::EncodingKey;
use serde::Deserialize;

/// Token endpoint used when the key file does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Parsed service-account key file
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type")]
    pub account_type: String,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Never print the private key.
impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Read and validate a key file
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CredentialsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CredentialsError> {
        let account: ServiceAccount =
            serde_json::from_str(raw).map_err(|e| CredentialsError::Malformed(e.to_string()))?;

        if account.account_type != "service_account" {
            return Err(CredentialsError::WrongType(account.account_type));
        }
        if account.project_id.is_empty() {
            return Err(CredentialsError::Malformed("project_id is empty".to_string()));
        }
        if account.client_email.is_empty() {
            return Err(CredentialsError::Malformed(
                "client_email is empty".to_string(),
            ));
        }
        Ok(account)
    }

    /// RS256 signing key for assertions and custom tokens
    pub fn signing_key(&self) -> Result<EncodingKey, CredentialsError> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| CredentialsError::InvalidKey(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("cannot read credentials file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("malformed credentials file: {0}")]
    Malformed(String),
    #[error("credentials file has type {0:?}, expected \"service_account\"")]
    WrongType(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    fn key_json(account_type: &str, private_key: &str) -> String {
        json!({
            "type": account_type,
            "project_id": "demo-project",
            "private_key_id": "abc123",
            "private_key": private_key,
            "client_email": "admin@demo-project.iam.gserviceaccount.com",
        })
        .to_string()
    }

    #[test]
    fn test_parses_key_and_defaults_token_uri() {
        let account = ServiceAccount::from_json(&key_json("service_account", TEST_KEY)).unwrap();
        assert_eq!(account.project_id, "demo-project");
        assert_eq!(account.token_uri, DEFAULT_TOKEN_URI);
        assert!(account.signing_key().is_ok());
        assert!(!format!("{account:?}").contains("PRIVATE KEY"));
    }

    #[test]
    fn test_rejects_wrong_type() {
        let result = ServiceAccount::from_json(&key_json("authorized_user", TEST_KEY));
        assert!(matches!(result, Err(CredentialsError::WrongType(t)) if t == "authorized_user"));
    }

    #[test]
    fn test_rejects_malformed_json_and_bad_key() {
        assert!(matches!(
            ServiceAccount::from_json("{ not json"),
            Err(CredentialsError::Malformed(_))
        ));

        let account =
            ServiceAccount::from_json(&key_json("service_account", "not a pem")).unwrap();
        assert!(matches!(
            account.signing_key(),
            Err(CredentialsError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ServiceAccount::from_file(Path::new("/nonexistent/service-account.json"));
        assert!(matches!(result, Err(CredentialsError::Read { .. })));
    }
}
