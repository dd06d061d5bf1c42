use std::env;

/// Default SIP domain Retell uses for custom telephony bridging
pub const DEFAULT_RETELL_SIP_DOMAIN: &str = "5t4n6j0wnrl.sip.livekit.cloud";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub admin_token: Option<String>,
    /// Public URL Twilio uses to reach this service (used for signature checks and callbacks)
    pub public_base_url: String,
    pub session_ttl_hours: i64,
    /// How often the outbound campaign dispatcher wakes up
    pub campaign_dispatch_secs: u64,
    pub retell: RetellConfig,
    pub twilio: Option<TwilioConfig>,
    pub stripe: Option<StripeConfig>,
    pub nylas: Option<NylasConfig>,
    pub hubspot: Option<OAuthClientConfig>,
    pub google: Option<OAuthClientConfig>,
    pub microsoft: Option<OAuthClientConfig>,
}

#[derive(Clone, Debug)]
pub struct RetellConfig {
    pub api_key: Option<String>,
    pub sip_domain: String,
    /// Accept function-call webhooks without a signature (local development only)
    pub allow_unsigned_webhooks: bool,
}

#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Platform fee in basis points taken from connected-account payments
    pub platform_fee_bps: u32,
}

#[derive(Clone, Debug)]
pub struct NylasConfig {
    pub api_key: String,
    pub api_uri: String,
}

#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(key: &str) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn oauth_client(id_key: &str, secret_key: &str) -> Option<OAuthClientConfig> {
    Some(OAuthClientConfig {
        client_id: non_empty(id_key)?,
        client_secret: non_empty(secret_key)?,
    })
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or_else(|_| {
                log::warn!("[config] PORT is not a valid number, using 8080");
                8080
            });

        Self {
            port,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/koya.db".to_string()),
            admin_token: non_empty("ADMIN_TOKEN"),
            public_base_url: non_empty("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            campaign_dispatch_secs: env::var("CAMPAIGN_DISPATCH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(60),
            retell: RetellConfig {
                api_key: non_empty("RETELL_API_KEY"),
                sip_domain: non_empty("RETELL_SIP_DOMAIN")
                    .unwrap_or_else(|| DEFAULT_RETELL_SIP_DOMAIN.to_string()),
                allow_unsigned_webhooks: flag("ALLOW_UNSIGNED_WEBHOOKS"),
            },
            twilio: match (non_empty("TWILIO_ACCOUNT_SID"), non_empty("TWILIO_AUTH_TOKEN")) {
                (Some(account_sid), Some(auth_token)) => Some(TwilioConfig { account_sid, auth_token }),
                _ => None,
            },
            stripe: non_empty("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
                secret_key,
                platform_fee_bps: env::var("STRIPE_PLATFORM_FEE_BPS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            }),
            nylas: non_empty("NYLAS_API_KEY").map(|api_key| NylasConfig {
                api_key,
                api_uri: non_empty("NYLAS_API_URI").unwrap_or_else(|| "https://api.us.nylas.com".to_string()),
            }),
            hubspot: oauth_client("HUBSPOT_CLIENT_ID", "HUBSPOT_CLIENT_SECRET"),
            google: oauth_client("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            microsoft: oauth_client("MICROSOFT_CLIENT_ID", "MICROSOFT_CLIENT_SECRET"),
        }
    }

    /// Configuration suitable for tests: in-memory database and no integrations
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_url: ":memory:".to_string(),
            admin_token: Some("admin-secret".to_string()),
            public_base_url: "https://koya.test".to_string(),
            session_ttl_hours: 24,
            campaign_dispatch_secs: 60,
            retell: RetellConfig {
                api_key: Some("retell-test-key".to_string()),
                sip_domain: DEFAULT_RETELL_SIP_DOMAIN.to_string(),
                allow_unsigned_webhooks: false,
            },
            twilio: None,
            stripe: None,
            nylas: None,
            hubspot: None,
            google: None,
            microsoft: None,
        }
    }
}
