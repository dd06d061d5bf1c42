use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix that marks a bearer token as an API key rather than a session token
pub const API_KEY_PREFIX: &str = "koya_";

/// Stored API key. Only the SHA-256 hash of the secret is persisted.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: i64,
    pub business_id: String,
    pub name: String,
    /// First characters of the key, shown in the dashboard
    pub key_prefix: String,
    pub key_hash: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// API key as returned to the dashboard (no hash)
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub name: String,
    pub key_prefix: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn to_response(&self) -> ApiKeyResponse {
        ApiKeyResponse {
            id: self.id,
            name: self.name.clone(),
            key_prefix: self.key_prefix.clone(),
            last_used_at: self.last_used_at,
            revoked: self.revoked_at.is_some(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

/// Dashboard login session bound to one business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub business_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
