//! Provider and process configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Production Identity Toolkit host
pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";

/// One week, the lifetime the demo asks for
pub const DEFAULT_SESSION_COOKIE_TTL_SECS: u64 = 60 * 60 * 24 * 7;

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Identity Toolkit URLs, all derived from a single base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Password grant, `POST` with `?key=<web api key>`
    pub password_sign_in: String,
    /// Versioned admin root; project-scoped calls hang off `projects/<id>`
    pub toolkit_v1: String,
    /// JWK set used to verify session cookies
    pub session_cookie_keys: String,
}

impl Endpoints {
    /// Derive every endpoint from a toolkit base such as
    /// `https://identitytoolkit.googleapis.com` or a local stub server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            password_sign_in: format!("{base}/v1/accounts:signInWithPassword"),
            toolkit_v1: format!("{base}/v1"),
            session_cookie_keys: format!("{base}/v1/sessionCookiePublicKeys"),
        }
    }

    /// `<toolkit>/v1/projects/<project_id><suffix>`
    pub fn project_url(&self, project_id: &str, suffix: &str) -> String {
        format!("{}/projects/{}{}", self.toolkit_v1, project_id, suffix)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::with_base(DEFAULT_IDENTITY_TOOLKIT_URL)
    }
}

/// Everything [`crate::AuthSession::initialize`] needs to bind to one project
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Path to the service-account key file
    pub service_account_path: PathBuf,
    /// Web API key for the password grant; may also be supplied later
    pub api_key: Option<String>,
    pub endpoints: Endpoints,
}

impl ProviderConfig {
    pub fn new(service_account_path: impl Into<PathBuf>) -> Self {
        Self {
            service_account_path: service_account_path.into(),
            api_key: None,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

/// Configuration for a single demo run, loaded from environment variables
#[derive(Clone)]
pub struct RunConfig {
    pub provider: ProviderConfig,
    pub user_email: String,
    pub user_password: String,
    pub session_cookie_ttl: Duration,
    pub call_timeout: Duration,
    /// Subject for the minted custom token; defaults to the verified subject
    pub custom_token_uid: Option<String>,
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("provider", &self.provider)
            .field("user_email", &self.user_email)
            .field("user_password", &"<redacted>")
            .field("session_cookie_ttl", &self.session_cookie_ttl)
            .field("call_timeout", &self.call_timeout)
            .field("custom_token_uid", &self.custom_token_uid)
            .finish()
    }
}

impl RunConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_account_path = required("SERVICE_ACCOUNT_KEY_PATH")?;
        let api_key = required("FIREBASE_WEB_API_KEY")?;
        let user_email = required("USER_EMAIL")?;
        let user_password = required("USER_PASSWORD")?;

        let toolkit_url = env::var("IDENTITY_TOOLKIT_URL")
            .unwrap_or_else(|_| DEFAULT_IDENTITY_TOOLKIT_URL.to_string());
        Url::parse(&toolkit_url).map_err(|e| ConfigError::Invalid {
            name: "IDENTITY_TOOLKIT_URL",
            reason: e.to_string(),
        })?;

        let provider = ProviderConfig::new(service_account_path)
            .with_api_key(api_key)
            .with_endpoints(Endpoints::with_base(&toolkit_url));

        Ok(Self {
            provider,
            user_email,
            user_password,
            session_cookie_ttl: Duration::from_secs(seconds(
                "SESSION_COOKIE_TTL_SECS",
                DEFAULT_SESSION_COOKIE_TTL_SECS,
            )?),
            call_timeout: Duration::from_secs(seconds(
                "CALL_TIMEOUT_SECS",
                DEFAULT_CALL_TIMEOUT_SECS,
            )?),
            custom_token_uid: env::var("CUSTOM_TOKEN_UID")
                .ok()
                .filter(|uid| !uid.is_empty()),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn seconds(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("expected a whole number of seconds, got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "SERVICE_ACCOUNT_KEY_PATH",
        "FIREBASE_WEB_API_KEY",
        "USER_EMAIL",
        "USER_PASSWORD",
        "IDENTITY_TOOLKIT_URL",
        "SESSION_COOKIE_TTL_SECS",
        "CALL_TIMEOUT_SECS",
        "CUSTOM_TOKEN_UID",
    ];

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("SERVICE_ACCOUNT_KEY_PATH", "/tmp/service-account.json");
        env::set_var("FIREBASE_WEB_API_KEY", "web-api-key");
        env::set_var("USER_EMAIL", "a@b.com");
        env::set_var("USER_PASSWORD", "pw");
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_minimal_config_uses_defaults() {
        cleanup_config();
        setup_minimal_config();

        let config = RunConfig::from_env().unwrap();
        assert_eq!(
            config.provider.service_account_path,
            PathBuf::from("/tmp/service-account.json")
        );
        assert_eq!(config.provider.api_key.as_deref(), Some("web-api-key"));
        assert_eq!(config.provider.endpoints, Endpoints::default());
        assert_eq!(config.session_cookie_ttl, Duration::from_secs(604_800));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert!(config.custom_token_uid.is_none());

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_missing_or_empty_required_var_is_fatal() {
        cleanup_config();
        setup_minimal_config();
        env::remove_var("USER_PASSWORD");
        assert!(matches!(
            RunConfig::from_env(),
            Err(ConfigError::Missing("USER_PASSWORD"))
        ));

        setup_minimal_config();
        env::set_var("FIREBASE_WEB_API_KEY", "");
        assert!(matches!(
            RunConfig::from_env(),
            Err(ConfigError::Missing("FIREBASE_WEB_API_KEY"))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_optional_overrides() {
        cleanup_config();
        setup_minimal_config();
        env::set_var("IDENTITY_TOOLKIT_URL", "http://127.0.0.1:9099/");
        env::set_var("SESSION_COOKIE_TTL_SECS", "3600");
        env::set_var("CALL_TIMEOUT_SECS", "5");
        env::set_var("CUSTOM_TOKEN_UID", "user_uid");

        let config = RunConfig::from_env().unwrap();
        assert_eq!(
            config.provider.endpoints.password_sign_in,
            "http://127.0.0.1:9099/v1/accounts:signInWithPassword"
        );
        assert_eq!(config.session_cookie_ttl, Duration::from_secs(3600));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.custom_token_uid.as_deref(), Some("user_uid"));

        env::set_var("CALL_TIMEOUT_SECS", "soon");
        assert!(matches!(
            RunConfig::from_env(),
            Err(ConfigError::Invalid {
                name: "CALL_TIMEOUT_SECS",
                ..
            })
        ));

        env::set_var("CALL_TIMEOUT_SECS", "5");
        env::set_var("IDENTITY_TOOLKIT_URL", "not a url");
        assert!(matches!(
            RunConfig::from_env(),
            Err(ConfigError::Invalid {
                name: "IDENTITY_TOOLKIT_URL",
                ..
            })
        ));

        cleanup_config();
    }

    #[test]
    fn test_endpoints_derive_from_base() {
        let endpoints = Endpoints::with_base("https://example.test/");
        assert_eq!(endpoints.toolkit_v1, "https://example.test/v1");
        assert_eq!(
            endpoints.session_cookie_keys,
            "https://example.test/v1/sessionCookiePublicKeys"
        );
        assert_eq!(
            endpoints.project_url("demo", ":createSessionCookie"),
            "https://example.test/v1/projects/demo:createSessionCookie"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = RunConfig {
            provider: ProviderConfig::new("/tmp/key.json"),
            user_email: "a@b.com".to_string(),
            user_password: "hunter2".to_string(),
            session_cookie_ttl: Duration::from_secs(300),
            call_timeout: Duration::from_secs(1),
            custom_token_uid: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
