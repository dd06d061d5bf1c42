//! Thin adapters around the third-party APIs the receptionist talks to.
//!
//! Every adapter takes its base URL at construction so tests can point it at a
//! local mock server. An adapter exists only when its credentials are configured.

pub mod calendar;
pub mod hubspot;
pub mod nylas;
pub mod oauth;
pub mod retell;
pub mod stripe;
pub mod twilio;
pub mod twiml;

use std::time::Duration;

use reqwest::{Client, Response};

use crate::config::Config;

pub use calendar::CalendarClient;
pub use hubspot::HubspotClient;
pub use nylas::NylasClient;
pub use retell::RetellClient;
pub use stripe::StripeClient;
pub use twilio::TwilioClient;

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Access token expired and could not be refreshed")]
    TokenExpired,
}

pub type IntegrationResult<T> = Result<T, IntegrationError>;

/// Turn a non-2xx response into an `Api` error carrying the body
pub(crate) async fn check_status(service: &'static str, response: Response) -> IntegrationResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::Api {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}

/// All configured adapters, shared through the app state
pub struct Integrations {
    pub twilio: Option<TwilioClient>,
    pub retell: Option<RetellClient>,
    pub stripe: Option<StripeClient>,
    pub nylas: Option<NylasClient>,
    pub hubspot: Option<HubspotClient>,
    pub calendar: CalendarClient,
}

impl Integrations {
    pub fn from_config(config: &Config) -> Self {
        let http = http_client();
        let integrations = Self {
            twilio: config.twilio.as_ref().map(|c| TwilioClient::new(http.clone(), c)),
            retell: config.retell.api_key.as_deref().map(|key| RetellClient::new(http.clone(), key)),
            stripe: config
                .stripe
                .as_ref()
                .map(|c| StripeClient::new(http.clone(), c, &config.public_base_url)),
            nylas: config.nylas.as_ref().map(|c| NylasClient::new(http.clone(), c)),
            hubspot: config.hubspot.as_ref().map(|c| HubspotClient::new(http.clone(), c)),
            calendar: CalendarClient::new(http, config.google.clone(), config.microsoft.clone()),
        };

        log::info!(
            "[integrations] twilio={} retell={} stripe={} nylas={} hubspot={}",
            integrations.twilio.is_some(),
            integrations.retell.is_some(),
            integrations.stripe.is_some(),
            integrations.nylas.is_some(),
            integrations.hubspot.is_some()
        );
        integrations
    }

    /// No third-party services at all
    pub fn disabled() -> Self {
        Self {
            twilio: None,
            retell: None,
            stripe: None,
            nylas: None,
            hubspot: None,
            calendar: CalendarClient::new(http_client(), None, None),
        }
    }
}
