//! Administrative client for the identity provider
//!
//! Covers the four administrative calls the session facade consumes:
//! session cookie creation, session cookie verification with a revocation
//! check, user lookup, and custom token minting.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::credentials::{CredentialsError, ServiceAccount};
use super::jwt::{
    validate_uid, CustomTokenSigner, JwtError, SessionClaims, SessionCookieKeys,
    SessionCookieVerifier,
};
use super::token_source::{AccessTokenSource, TokenSourceError};
use crate::config::Endpoints;
use crate::user::{RawUser, UserLookup, UserRecord};

/// Shortest session cookie the provider will issue
pub const MIN_SESSION_COOKIE_DURATION: Duration = Duration::from_secs(5 * 60);
/// Longest session cookie the provider will issue
pub const MAX_SESSION_COOKIE_DURATION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionCookieRequest<'a> {
    id_token: &'a str,
    valid_duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionCookieResponse {
    session_cookie: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: Option<String>,
}

/// Pull `error.message` out of a provider error body
pub(crate) fn provider_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
}

/// Long-lived administrative client bound to one project
pub struct AdminClient {
    client: Client,
    endpoints: Endpoints,
    project_id: String,
    tokens: AccessTokenSource,
    signer: CustomTokenSigner,
    verifier: SessionCookieVerifier,
}

impl AdminClient {
    /// Bind a client to the project named by `account`. Makes no network call.
    pub fn new(
        client: Client,
        account: &ServiceAccount,
        endpoints: Endpoints,
    ) -> Result<Self, CredentialsError> {
        let signing_key = account.signing_key()?;
        Ok(Self {
            tokens: AccessTokenSource::new(
                client.clone(),
                account.token_uri.clone(),
                account.client_email.clone(),
                signing_key.clone(),
            ),
            signer: CustomTokenSigner::new(signing_key, account.client_email.clone()),
            verifier: SessionCookieVerifier::new(account.project_id.clone()),
            project_id: account.project_id.clone(),
            client,
            endpoints,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Exchange the service-account key for a bearer token, so rejected
    /// credentials surface before the first real call
    pub async fn authorize(&self) -> Result<(), AdminError> {
        self.tokens.token().await?;
        Ok(())
    }

    /// Exchange an ID token for a session cookie valid for `valid_for`
    pub async fn create_session_cookie(
        &self,
        id_token: &str,
        valid_for: Duration,
    ) -> Result<String, AdminError> {
        if id_token.is_empty() {
            return Err(AdminError::InvalidArgument(
                "ID token must be a non-empty string".to_string(),
            ));
        }
        if valid_for < MIN_SESSION_COOKIE_DURATION || valid_for > MAX_SESSION_COOKIE_DURATION {
            return Err(AdminError::InvalidArgument(format!(
                "session cookie duration must be between {} and {} seconds, got {}",
                MIN_SESSION_COOKIE_DURATION.as_secs(),
                MAX_SESSION_COOKIE_DURATION.as_secs(),
                valid_for.as_secs()
            )));
        }

        let request = CreateSessionCookieRequest {
            id_token,
            valid_duration: valid_for.as_secs(),
        };
        let body = self
            .post_json(
                &self
                    .endpoints
                    .project_url(&self.project_id, ":createSessionCookie"),
                &request,
            )
            .await?;

        serde_json::from_str::<CreateSessionCookieResponse>(&body)
            .map_err(|e| AdminError::Malformed(e.to_string()))?
            .session_cookie
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AdminError::Malformed("sessionCookie missing from response".to_string()))
    }

    /// Verify a session cookie and reject it if the user was disabled or
    /// their tokens were revoked after the cookie's sign-in
    pub async fn verify_session_cookie_and_check_revoked(
        &self,
        cookie: &str,
    ) -> Result<SessionClaims, AdminError> {
        let keys = self.fetch_session_cookie_keys().await?;
        let claims = self.verifier.verify(cookie, &keys)?;

        let user = match self.get_user(claims.uid()).await? {
            UserLookup::Found(user) => user,
            UserLookup::NotFound => {
                return Err(AdminError::Rejected(format!(
                    "no user record found for uid {}",
                    claims.uid()
                )))
            }
        };
        if user.disabled {
            return Err(AdminError::UserDisabled);
        }
        if let Some(valid_since) = user.tokens_valid_after {
            if claims.auth_time < valid_since {
                return Err(AdminError::Revoked);
            }
        }

        Ok(claims)
    }

    /// Look up a user by uid; an unknown uid is `UserLookup::NotFound`
    pub async fn get_user(&self, uid: &str) -> Result<UserLookup, AdminError> {
        validate_uid(uid).map_err(|e| AdminError::InvalidArgument(e.to_string()))?;

        let request = LookupRequest { local_id: [uid] };
        let body = match self
            .post_json(
                &self.endpoints.project_url(&self.project_id, "/accounts:lookup"),
                &request,
            )
            .await
        {
            Ok(body) => body,
            Err(AdminError::Rejected(message)) if message.starts_with("USER_NOT_FOUND") => {
                return Ok(UserLookup::NotFound)
            }
            Err(e) => return Err(e),
        };

        let response: LookupResponse =
            serde_json::from_str(&body).map_err(|e| AdminError::Malformed(e.to_string()))?;
        match response.users.into_iter().next() {
            Some(raw) => Ok(UserLookup::Found(UserRecord::from(raw))),
            None => Ok(UserLookup::NotFound),
        }
    }

    /// Mint a custom token asserting `uid`
    pub fn custom_token(
        &self,
        uid: &str,
        developer_claims: Option<Map<String, Value>>,
    ) -> Result<String, AdminError> {
        Ok(self.signer.mint(uid, developer_claims)?)
    }

    async fn fetch_session_cookie_keys(&self) -> Result<SessionCookieKeys, AdminError> {
        let response = self
            .client
            .get(&self.endpoints.session_cookie_keys)
            .send()
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(AdminError::Http(format!(
                "fetching session cookie keys returned {status}"
            )));
        }

        let keys = SessionCookieKeys::from_jwks(&body)?;
        tracing::debug!(count = keys.len(), "Fetched session cookie public keys");
        Ok(keys)
    }

    /// Authorized JSON POST; returns the body of a 2xx response
    async fn post_json<T: Serialize>(&self, url: &str, request: &T) -> Result<String, AdminError> {
        let bearer = self.tokens.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdminError::Http(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        let message =
            provider_error_message(&body).unwrap_or_else(|| format!("provider returned {status}"));
        tracing::warn!(status = %status, url = %url, message = %message, "Admin call rejected");
        Err(AdminError::Rejected(message))
    }
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("project_id", &self.project_id)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    AccessToken(#[from] TokenSourceError),
    #[error("request failed: {0}")]
    Http(String),
    /// Provider returned a non-2xx status; carries `error.message`
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Token(#[from] JwtError),
    #[error("user record is disabled")]
    UserDisabled,
    #[error("session cookie has been revoked")]
    Revoked,
}
