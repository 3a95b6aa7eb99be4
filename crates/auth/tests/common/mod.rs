//! Stub identity provider shared by the integration tests

#![allow(dead_code)]

use std::time::Duration;

use fbspells_auth::{AuthSession, Endpoints, ProviderConfig};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;
use time::OffsetDateTime;

pub const PROJECT_ID: &str = "demo-project";
pub const CLIENT_EMAIL: &str = "firebase-adminsdk@demo-project.iam.gserviceaccount.com";
pub const KEY_ID: &str = "test-key-1";
pub const ACCESS_TOKEN: &str = "ya29.test-access-token";
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const TEST_KEY: &str = include_str!("../fixtures/service_account_key.pem");
pub const TEST_PUB: &str = include_str!("../fixtures/service_account_pub.pem");
pub const SESSION_KEYS: &str = include_str!("../fixtures/session_cookie_keys.json");

pub const SIGN_IN_PATH: &str = "/v1/accounts:signInWithPassword";
pub const CREATE_COOKIE_PATH: &str = "/v1/projects/demo-project:createSessionCookie";
pub const LOOKUP_PATH: &str = "/v1/projects/demo-project/accounts:lookup";
pub const KEYS_PATH: &str = "/v1/sessionCookiePublicKeys";

/// A mockito server standing in for both the token endpoint and the
/// Identity Toolkit, plus a service-account key file pointing at it
pub struct StubProvider {
    pub server: ServerGuard,
    pub config: ProviderConfig,
    token_mock: Mock,
    key_dir: TempDir,
}

impl StubProvider {
    pub async fn start() -> Self {
        let mut server = Server::new_async().await;
        let token_mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "access_token": ACCESS_TOKEN,
                    "expires_in": 3600,
                    "token_type": "Bearer"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let token_uri = format!("{}/token", server.url());
        let key_dir = tempfile::tempdir().unwrap();
        let key_path = key_dir.path().join("service-account.json");
        std::fs::write(&key_path, service_account_json(&token_uri)).unwrap();

        let config =
            ProviderConfig::new(key_path).with_endpoints(Endpoints::with_base(&server.url()));

        Self {
            server,
            config,
            token_mock,
            key_dir,
        }
    }

    pub async fn session(&self) -> AuthSession {
        AuthSession::initialize(&self.config, TIMEOUT).await.unwrap()
    }

    pub fn bearer() -> Matcher {
        Matcher::Exact(format!("Bearer {ACCESS_TOKEN}"))
    }

    pub async fn mock_sign_in(&mut self, status: usize, body: &str) -> Mock {
        self.server
            .mock("POST", SIGN_IN_PATH)
            .match_query(Matcher::UrlEncoded("key".to_string(), "K".to_string()))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    pub async fn mock_session_keys(&mut self) -> Mock {
        self.server
            .mock("GET", KEYS_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SESSION_KEYS)
            .create_async()
            .await
    }

    pub async fn mock_lookup(&mut self, status: usize, body: serde_json::Value) -> Mock {
        self.server
            .mock("POST", LOOKUP_PATH)
            .match_header("authorization", Self::bearer())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    /// Fails the test if anything beyond the token exchange reaches the server
    pub async fn forbid_calls(&mut self) -> Vec<Mock> {
        let mut mocks = Vec::new();
        for method in ["GET", "POST"] {
            mocks.push(
                self.server
                    .mock(method, Matcher::Regex("^/v1/".to_string()))
                    .expect(0)
                    .create_async()
                    .await,
            );
        }
        mocks
    }
}

pub fn service_account_json(token_uri: &str) -> String {
    json!({
        "type": "service_account",
        "project_id": PROJECT_ID,
        "private_key_id": "0123456789abcdef",
        "private_key": TEST_KEY,
        "client_email": CLIENT_EMAIL,
        "client_id": "1234567890",
        "token_uri": token_uri,
    })
    .to_string()
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// A session cookie as the provider would issue it for `uid`
pub fn sign_session_cookie(uid: &str, auth_time: i64, valid_for_secs: i64) -> String {
    let issued_at = now();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KEY_ID.to_string());
    let claims = json!({
        "iss": format!("https://session.firebase.google.com/{PROJECT_ID}"),
        "aud": PROJECT_ID,
        "auth_time": auth_time,
        "user_id": uid,
        "sub": uid,
        "iat": issued_at,
        "exp": issued_at + valid_for_secs,
        "email": "a@b.com",
        "email_verified": true,
        "firebase": {
            "identities": { "email": ["a@b.com"] },
            "sign_in_provider": "password"
        }
    });
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(TEST_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn lookup_body(uid: &str, valid_since: i64, disabled: bool) -> serde_json::Value {
    json!({
        "kind": "identitytoolkit#GetAccountInfoResponse",
        "users": [{
            "localId": uid,
            "email": "a@b.com",
            "emailVerified": true,
            "passwordHash": "UkVEQUNURUQ=",
            "validSince": valid_since.to_string(),
            "disabled": disabled,
            "createdAt": "1700000000000",
            "lastLoginAt": "1700000500000",
            "providerUserInfo": [
                { "providerId": "password", "federatedId": "a@b.com", "email": "a@b.com", "rawId": "a@b.com" }
            ]
        }]
    })
}
