//! Session facade over the password grant and the admin client
//!
//! [`AuthSession`] holds the artifacts each step produces (ID token,
//! session cookie, verified claims, custom token) and refuses to run a step
//! whose input was never produced. Every network operation takes an explicit
//! deadline; nothing is retried and nothing is printed.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::admin::client::provider_error_message;
use crate::admin::{AdminClient, ServiceAccount, SessionClaims};
use crate::config::{Endpoints, ProviderConfig};
use crate::error::{IdentityError, IdentityResult, Step};
use crate::user::UserLookup;

/// Message used when a rejected password grant carries no `error.message`
pub const UNKNOWN_PROVIDER_ERROR: &str = "Unknown error occurred";

// Not Debug: carries the password.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordGrantRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordGrantResponse {
    id_token: Option<String>,
}

/// Run `operation` under `timeout`, reporting which step ran out of time
async fn with_deadline<T>(
    step: Step,
    timeout: Duration,
    operation: impl Future<Output = IdentityResult<T>>,
) -> IdentityResult<T> {
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| IdentityError::Timeout {
            step,
            after: timeout,
        })?
}

/// One user's walk through password sign-in, session cookie exchange,
/// verification and custom token minting.
///
/// Mutating operations take `&mut self`; one instance serves one logical
/// session. Sharing it between tasks needs external locking.
pub struct AuthSession {
    http: Client,
    admin: AdminClient,
    endpoints: Endpoints,
    api_key_url: Option<String>,
    id_token: Option<String>,
    session_cookie: Option<String>,
    decoded_claims: Option<SessionClaims>,
    custom_token: Option<String>,
}

impl AuthSession {
    /// Load the service-account key, bind an admin client to its project and
    /// confirm the provider accepts the credentials.
    pub async fn initialize(config: &ProviderConfig, timeout: Duration) -> IdentityResult<Self> {
        let account = ServiceAccount::from_file(&config.service_account_path)
            .map_err(|e| IdentityError::Init(e.to_string()))?;

        let http = Client::new();
        let admin = AdminClient::new(http.clone(), &account, config.endpoints.clone())
            .map_err(|e| IdentityError::Init(e.to_string()))?;

        with_deadline(Step::Initialize, timeout, async {
            admin
                .authorize()
                .await
                .map_err(|e| IdentityError::Init(e.to_string()))
        })
        .await?;

        tracing::debug!(project_id = %admin.project_id(), "Admin client initialized");

        let mut session = Self {
            http,
            admin,
            endpoints: config.endpoints.clone(),
            api_key_url: None,
            id_token: None,
            session_cookie: None,
            decoded_claims: None,
            custom_token: None,
        };
        if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            session.set_api_key(api_key);
        }
        Ok(session)
    }

    /// Store the web API key as the password-grant URL. No network call.
    pub fn set_api_key(&mut self, api_key: &str) {
        let key: String = url::form_urlencoded::byte_serialize(api_key.as_bytes()).collect();
        self.api_key_url = Some(format!("{}?key={}", self.endpoints.password_sign_in, key));
    }

    pub fn set_id_token(&mut self, id_token: impl Into<String>) {
        self.id_token = Some(id_token.into());
    }

    pub fn set_session_cookie(&mut self, session_cookie: impl Into<String>) {
        self.session_cookie = Some(session_cookie.into());
    }

    pub fn set_custom_token(&mut self, custom_token: impl Into<String>) {
        self.custom_token = Some(custom_token.into());
    }

    /// Sign in with email and password; returns and stores the ID token
    pub async fn authenticate_user(
        &mut self,
        email: &str,
        password: &str,
        timeout: Duration,
    ) -> IdentityResult<String> {
        let url = self
            .api_key_url
            .as_deref()
            .ok_or(IdentityError::Config("API key"))?;

        let request = PasswordGrantRequest {
            email,
            password,
            return_secure_token: "true",
        };
        let id_token = with_deadline(
            Step::AuthenticateUser,
            timeout,
            password_grant(&self.http, url, &request),
        )
        .await?;

        self.id_token = Some(id_token.clone());
        Ok(id_token)
    }

    /// Exchange the stored ID token for a session cookie valid for `valid_for`
    pub async fn get_session_cookie(
        &mut self,
        valid_for: Duration,
        timeout: Duration,
    ) -> IdentityResult<String> {
        let id_token = self
            .id_token
            .as_deref()
            .ok_or(IdentityError::Config("ID token"))?;

        let admin = &self.admin;
        let cookie = with_deadline(Step::GetSessionCookie, timeout, async {
            admin
                .create_session_cookie(id_token, valid_for)
                .await
                .map_err(|e| IdentityError::Session(format!("failed to create session cookie: {e}")))
        })
        .await?;

        self.session_cookie = Some(cookie.clone());
        Ok(cookie)
    }

    /// Verify the stored session cookie, including revocation; returns and
    /// stores the decoded claims
    pub async fn auth_user(&mut self, timeout: Duration) -> IdentityResult<SessionClaims> {
        let cookie = self
            .session_cookie
            .as_deref()
            .ok_or(IdentityError::Config("session cookie"))?;

        let admin = &self.admin;
        let claims = with_deadline(Step::AuthUser, timeout, async {
            admin
                .verify_session_cookie_and_check_revoked(cookie)
                .await
                .map_err(|e| IdentityError::Session(format!("failed to verify session cookie: {e}")))
        })
        .await?;

        self.decoded_claims = Some(claims.clone());
        Ok(claims)
    }

    /// Look up a user profile. An unknown uid is `UserLookup::NotFound`.
    pub async fn get_user_by_uid(&self, uid: &str, timeout: Duration) -> IdentityResult<UserLookup> {
        with_deadline(Step::GetUserByUid, timeout, async {
            self.admin
                .get_user(uid)
                .await
                .map_err(|e| IdentityError::Lookup(e.to_string()))
        })
        .await
    }

    /// Mint and store a custom token asserting `uid`. Signing happens
    /// locally with the service-account key, so there is no deadline.
    pub fn create_custom_token(&mut self, uid: &str) -> IdentityResult<String> {
        self.create_custom_token_with_claims(uid, None)
    }

    /// Like [`Self::create_custom_token`], with developer claims embedded
    pub fn create_custom_token_with_claims(
        &mut self,
        uid: &str,
        claims: Option<Map<String, Value>>,
    ) -> IdentityResult<String> {
        let token = self
            .admin
            .custom_token(uid, claims)
            .map_err(|e| IdentityError::Mint(e.to_string()))?;
        self.custom_token = Some(token.clone());
        Ok(token)
    }

    pub fn project_id(&self) -> &str {
        self.admin.project_id()
    }

    pub fn api_key_url(&self) -> Option<&str> {
        self.api_key_url.as_deref()
    }

    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    pub fn session_cookie(&self) -> Option<&str> {
        self.session_cookie.as_deref()
    }

    pub fn decoded_claims(&self) -> Option<&SessionClaims> {
        self.decoded_claims.as_ref()
    }

    pub fn custom_token(&self) -> Option<&str> {
        self.custom_token.as_deref()
    }
}

async fn password_grant(
    http: &Client,
    url: &str,
    request: &PasswordGrantRequest<'_>,
) -> IdentityResult<String> {
    let response = http
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| IdentityError::Auth(format!("error making HTTP request: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| IdentityError::Auth(format!("error reading response: {e}")))?;

    if status == StatusCode::OK {
        let parsed: PasswordGrantResponse = serde_json::from_str(&body)
            .map_err(|e| IdentityError::Protocol(format!("error decoding response: {e}")))?;
        return parsed
            .id_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| IdentityError::Protocol("ID token not found in response".to_string()));
    }

    let message =
        provider_error_message(&body).unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.to_string());
    Err(IdentityError::Auth(message))
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("project_id", &self.admin.project_id())
            .field("has_api_key", &self.api_key_url.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("has_session_cookie", &self.session_cookie.is_some())
            .field("subject", &self.decoded_claims.as_ref().map(SessionClaims::uid))
            .field("has_custom_token", &self.custom_token.is_some())
            .finish()
    }
}
