//! User records returned by the admin lookup

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Result of a lookup by uid. A missing user is not an error.
#[derive(Debug, Clone)]
pub enum UserLookup {
    Found(UserRecord),
    NotFound,
}

impl UserLookup {
    pub fn found(self) -> Option<UserRecord> {
        match self {
            UserLookup::Found(record) => Some(record),
            UserLookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, UserLookup::Found(_))
    }
}

/// A user profile as held by the identity provider
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub disabled: bool,
    /// Developer claims attached to the user, parsed from the provider's JSON string
    pub custom_claims: Map<String, Value>,
    /// Tokens issued before this unix second are revoked
    pub tokens_valid_after: Option<i64>,
    pub created_at: Option<OffsetDateTime>,
    pub last_login_at: Option<OffsetDateTime>,
    pub tenant_id: Option<String>,
    pub provider_data: Vec<ProviderUserInfo>,
}

/// A linked sign-in provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUserInfo {
    pub provider_id: String,
    #[serde(default, rename = "rawId")]
    pub uid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Wire shape of a user in an `accounts:lookup` response. Numeric
/// timestamps arrive as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    custom_attributes: Option<String>,
    #[serde(default)]
    valid_since: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_login_at: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<ProviderUserInfo>,
}

fn from_unix_millis(raw: Option<&str>) -> Option<OffsetDateTime> {
    let millis: i64 = raw?.parse().ok()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

impl From<RawUser> for UserRecord {
    fn from(raw: RawUser) -> Self {
        let custom_claims = raw
            .custom_attributes
            .as_deref()
            .and_then(|attrs| match serde_json::from_str::<Map<String, Value>>(attrs) {
                Ok(map) => Some(map),
                Err(e) => {
                    tracing::warn!(uid = %raw.local_id, error = %e, "Ignoring unparsable custom claims");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            tokens_valid_after: raw.valid_since.as_deref().and_then(|s| s.parse().ok()),
            created_at: from_unix_millis(raw.created_at.as_deref()),
            last_login_at: from_unix_millis(raw.last_login_at.as_deref()),
            uid: raw.local_id,
            email: raw.email,
            email_verified: raw.email_verified,
            display_name: raw.display_name,
            phone_number: raw.phone_number,
            photo_url: raw.photo_url,
            disabled: raw.disabled,
            custom_claims,
            tenant_id: raw.tenant_id,
            provider_data: raw.provider_user_info,
        }
    }
}
