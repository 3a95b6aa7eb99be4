//! Administrative access to the identity provider

pub mod client;
pub mod credentials;
pub mod jwt;
pub mod token_source;

pub use client::{AdminClient, AdminError, MAX_SESSION_COOKIE_DURATION, MIN_SESSION_COOKIE_DURATION};
pub use credentials::{CredentialsError, ServiceAccount};
pub use jwt::{CustomTokenClaims, FirebaseInfo, JwtError, SessionClaims, CUSTOM_TOKEN_AUDIENCE};
pub use token_source::{AccessTokenSource, TokenSourceError};
