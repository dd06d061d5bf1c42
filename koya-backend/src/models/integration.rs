use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Refresh OAuth access tokens this long before they expire
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalendarProviderKind {
    Google,
    Outlook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CrmProviderKind {
    Hubspot,
}

/// OAuth token pair with its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    /// True when the access token is expired or expires within the refresh buffer.
    /// Tokens without a known expiry are treated as long-lived.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now <= Duration::seconds(TOKEN_REFRESH_BUFFER_SECS),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarIntegration {
    pub business_id: String,
    pub provider: CalendarProviderKind,
    /// Google calendar id or Outlook mailbox address
    pub calendar_id: String,
    pub tokens: OAuthTokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmIntegration {
    pub business_id: String,
    pub provider: CrmProviderKind,
    pub tokens: OAuthTokens,
}

/// Stripe Connect account linked to a business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub business_id: String,
    pub stripe_account_id: String,
    pub charges_enabled: bool,
}
