//! Run-once identity demo
//!
//! Signs a user in with email and password, exchanges the ID token for a
//! session cookie, verifies the cookie, looks the user up and mints a custom
//! token. Any failed step is logged and the process exits with status 1.
//!
//! ## Environment Variables
//! - SERVICE_ACCOUNT_KEY_PATH: service-account key file
//! - FIREBASE_WEB_API_KEY: web API key for the password grant
//! - USER_EMAIL / USER_PASSWORD: the user to sign in
//! - IDENTITY_TOOLKIT_URL, SESSION_COOKIE_TTL_SECS, CALL_TIMEOUT_SECS,
//!   CUSTOM_TOKEN_UID: optional overrides
//! - RUST_LOG, LOG_FORMAT=json: logging

use anyhow::Context;
use fbspells_auth::{AuthSession, RunConfig, UserLookup};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env before the subscriber so RUST_LOG from the file applies
    let dotenv = dotenvy::dotenv();
    init_tracing();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => warn!("No .env file found, using process environment"),
        Err(e) => {
            tracing::error!(error = %e, "Error loading .env file");
            std::process::exit(1);
        }
    }

    if let Err(e) = run().await {
        tracing::error!(error = %format!("{e:#}"), "Run failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = RunConfig::from_env().context("Invalid configuration")?;
    let timeout = config.call_timeout;

    let mut session = AuthSession::initialize(&config.provider, timeout)
        .await
        .context("Failed to initialize admin client")?;
    info!(project_id = %session.project_id(), "Admin client initialized");

    session
        .authenticate_user(&config.user_email, &config.user_password, timeout)
        .await
        .context("Failed to authenticate user")?;
    info!(email = %config.user_email, "User authenticated");

    session
        .get_session_cookie(config.session_cookie_ttl, timeout)
        .await
        .context("Failed to get session cookie")?;
    info!(
        valid_for_secs = config.session_cookie_ttl.as_secs(),
        "Session cookie issued"
    );

    let claims = session
        .auth_user(timeout)
        .await
        .context("Failed to authenticate user with session cookie")?;
    info!(
        uid = %claims.uid(),
        sign_in_provider = %claims.firebase.sign_in_provider,
        expires_at = claims.exp,
        "Session cookie verified"
    );

    match session
        .get_user_by_uid(claims.uid(), timeout)
        .await
        .context("Failed to look up user")?
    {
        UserLookup::Found(user) => info!(
            uid = %user.uid,
            email = ?user.email,
            email_verified = user.email_verified,
            providers = user.provider_data.len(),
            "User record found"
        ),
        UserLookup::NotFound => warn!(uid = %claims.uid(), "User not found"),
    }

    let uid = config
        .custom_token_uid
        .clone()
        .unwrap_or_else(|| claims.uid().to_string());
    session
        .create_custom_token(&uid)
        .context("Failed to create custom token")?;
    info!(uid = %uid, "Custom token minted");

    Ok(())
}
