//! fbspells identity client
//!
//! Password sign-in against the Identity Toolkit REST API, session cookie
//! exchange and verification, user lookup, and custom token minting with a
//! service-account key.

pub mod admin;
pub mod config;
pub mod error;
pub mod session;
pub mod user;

pub use admin::{SessionClaims, MAX_SESSION_COOKIE_DURATION, MIN_SESSION_COOKIE_DURATION};
pub use config::{ConfigError, Endpoints, ProviderConfig, RunConfig};
pub use error::{IdentityError, IdentityResult, Step};
pub use session::AuthSession;
pub use user::{ProviderUserInfo, UserLookup, UserRecord};
