//! Service-account access tokens via the OAuth2 JWT-bearer grant

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform \
https://www.googleapis.com/auth/firebase \
https://www.googleapis.com/auth/identitytoolkit \
https://www.googleapis.com/auth/userinfo.email";

const ASSERTION_TTL_SECS: i64 = 3600;

/// Refresh this long before the provider-reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Only the fields the JWT-bearer grant needs. Not `Serialize`, so the
/// token cannot end up in logs by accident.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: OffsetDateTime,
}

/// Exchanges a signed assertion for a bearer token and keeps the current one
pub struct AccessTokenSource {
    client: Client,
    token_uri: String,
    client_email: String,
    signing_key: EncodingKey,
    current: Mutex<Option<AccessToken>>,
}

impl AccessTokenSource {
    pub fn new(
        client: Client,
        token_uri: impl Into<String>,
        client_email: impl Into<String>,
        signing_key: EncodingKey,
    ) -> Self {
        Self {
            client,
            token_uri: token_uri.into(),
            client_email: client_email.into(),
            signing_key,
            current: Mutex::new(None),
        }
    }

    /// Current bearer token, exchanging a new assertion when the held one is
    /// missing or about to expire
    pub async fn token(&self) -> Result<String, TokenSourceError> {
        let mut current = self.current.lock().await;
        let now = OffsetDateTime::now_utc();
        if let Some(token) = current.as_ref() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange(now).await?;
        let value = fresh.value.clone();
        *current = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self, now: OffsetDateTime) -> Result<AccessToken, TokenSourceError> {
        let iat = now.unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| TokenSourceError::Signing(e.to_string()))?;

        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TokenSourceError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenSourceError::Http(e.to_string()))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or_else(|| format!("status {status}"));
            return Err(TokenSourceError::Rejected(reason));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| TokenSourceError::Malformed(e.to_string()))?;
        tracing::debug!(
            expires_in = ?token.expires_in,
            "Obtained service-account access token"
        );

        let expires_in = token.expires_in.unwrap_or(ASSERTION_TTL_SECS);
        if expires_in <= 0 {
            return Err(TokenSourceError::Malformed(format!(
                "expires_in must be positive, got {expires_in}"
            )));
        }
        let expires_at = now
            .checked_add(Duration::seconds(expires_in))
            .ok_or_else(|| TokenSourceError::Malformed("expires_in out of range".to_string()))?;

        Ok(AccessToken {
            value: token.access_token,
            expires_at,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenSourceError {
    #[error("failed to sign assertion: {0}")]
    Signing(String),
    #[error("token endpoint unreachable: {0}")]
    Http(String),
    #[error("token endpoint rejected credentials: {0}")]
    Rejected(String),
    #[error("malformed token response: {0}")]
    Malformed(String),
}
