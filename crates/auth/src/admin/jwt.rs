//! Custom token minting and session cookie verification

use std::collections::HashMap;

use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Audience every custom token must carry
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Session cookies are issued by `<prefix><project_id>`
pub const SESSION_COOKIE_ISSUER_PREFIX: &str = "https://session.firebase.google.com/";

pub const CUSTOM_TOKEN_TTL_SECS: i64 = 3600;
pub const MAX_UID_LEN: usize = 128;
pub const CLOCK_SKEW_SECS: u64 = 300;

/// Claim names developer claims may not shadow
pub const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase",
    "iat", "iss", "jti", "nbf", "nonce", "sub",
];

/// Payload of a minted custom token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Map<String, Value>>,
}

/// Verified payload of a session cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer
    pub iss: String,
    /// Audience (project id)
    pub aud: String,
    /// Subject (user id)
    pub sub: String,
    /// When the user originally signed in
    pub auth_time: i64,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    #[serde(default)]
    pub firebase: FirebaseInfo,
    /// Every other claim, including developer claims
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl SessionClaims {
    pub fn uid(&self) -> &str {
        &self.sub
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirebaseInfo {
    #[serde(default)]
    pub sign_in_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default)]
    pub identities: Map<String, Value>,
}

/// Reject uids the provider would refuse
pub fn validate_uid(uid: &str) -> Result<(), JwtError> {
    if uid.is_empty() {
        return Err(JwtError::InvalidUid("uid must be non-empty".to_string()));
    }
    if uid.chars().count() > MAX_UID_LEN {
        return Err(JwtError::InvalidUid(format!(
            "uid must not be longer than {MAX_UID_LEN} characters"
        )));
    }
    Ok(())
}

/// Mints custom tokens with the service-account key
#[derive(Clone)]
pub struct CustomTokenSigner {
    encoding_key: EncodingKey,
    client_email: String,
}

impl CustomTokenSigner {
    pub fn new(encoding_key: EncodingKey, client_email: impl Into<String>) -> Self {
        Self {
            encoding_key,
            client_email: client_email.into(),
        }
    }

    /// Sign a custom token asserting `uid`, with optional developer claims
    pub fn mint(
        &self,
        uid: &str,
        developer_claims: Option<Map<String, Value>>,
    ) -> Result<String, JwtError> {
        validate_uid(uid)?;
        if let Some(claims) = &developer_claims {
            let reserved: Vec<&str> = claims
                .keys()
                .map(String::as_str)
                .filter(|k| RESERVED_CLAIMS.contains(k))
                .collect();
            if !reserved.is_empty() {
                return Err(JwtError::ReservedClaims(reserved.join(", ")));
            }
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = CustomTokenClaims {
            iss: self.client_email.clone(),
            sub: self.client_email.clone(),
            aud: CUSTOM_TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + CUSTOM_TOKEN_TTL_SECS,
            uid: uid.to_string(),
            claims: developer_claims.filter(|c| !c.is_empty()),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    #[serde(default)]
    kty: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// Public keys the provider signs session cookies with, by key id
pub struct SessionCookieKeys {
    keys: HashMap<String, DecodingKey>,
}

impl SessionCookieKeys {
    /// Parse a JWK set document
    pub fn from_jwks(body: &str) -> Result<Self, JwtError> {
        let jwks: JwksResponse =
            serde_json::from_str(body).map_err(|e| JwtError::Keys(e.to_string()))?;
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in jwks.keys {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                tracing::debug!(kid = %jwk.kid, kty = ?jwk.kty, "Skipping non-RSA key");
                continue;
            };
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| JwtError::Keys(format!("key {}: {}", jwk.kid, e)))?;
            keys.insert(jwk.kid, key);
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }
}

/// Checks session cookies for one project
#[derive(Debug, Clone)]
pub struct SessionCookieVerifier {
    project_id: String,
    issuer: String,
}

impl SessionCookieVerifier {
    pub fn new(project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        Self {
            issuer: format!("{SESSION_COOKIE_ISSUER_PREFIX}{project_id}"),
            project_id,
        }
    }

    /// Verify signature, expiry, audience, issuer and subject of a cookie
    pub fn verify(&self, cookie: &str, keys: &SessionCookieKeys) -> Result<SessionClaims, JwtError> {
        let header = decode_header(cookie).map_err(|_| JwtError::Invalid)?;
        if header.alg != Algorithm::RS256 {
            return Err(JwtError::Validation(format!(
                "expected RS256 signature, got {:?}",
                header.alg
            )));
        }
        let kid = header.kid.ok_or(JwtError::MissingKeyId)?;
        let key = keys.get(&kid).ok_or(JwtError::UnknownKeyId(kid))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

        let claims = decode::<SessionClaims>(cookie, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    JwtError::Validation(format!("audience is not {}", self.project_id))
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    JwtError::Validation(format!("issuer is not {}", self.issuer))
                }
                _ => JwtError::Validation(e.to_string()),
            })?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if claims.iat > now + CLOCK_SKEW_SECS as i64 {
            return Err(JwtError::Validation("cookie issued in the future".to_string()));
        }
        validate_uid(&claims.sub).map_err(|_| {
            JwtError::Validation("subject must be 1 to 128 characters".to_string())
        })?;

        Ok(claims)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token has no key id")]
    MissingKeyId,
    #[error("token signed with unknown key {0}")]
    UnknownKeyId(String),
    #[error("invalid uid: {0}")]
    InvalidUid(String),
    #[error("developer claims use reserved names: {0}")]
    ReservedClaims(String),
    #[error("malformed public keys: {0}")]
    Keys(String),
    #[error("token encoding failed: {0}")]
    Encoding(String),
    #[error("token validation failed: {0}")]
    Validation(String),
}
