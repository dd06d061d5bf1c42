//! Outbound email through Nylas v3

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{check_status, IntegrationError, IntegrationResult};
use crate::config::NylasConfig;

#[derive(Debug, Deserialize)]
struct SendResponse {
    data: SentMessage,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Clone)]
pub struct NylasClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl NylasClient {
    pub fn new(http: Client, config: &NylasConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.api_uri.trim_end_matches('/').to_string(),
        }
    }

    /// Send from the mailbox connected as `grant` (a grant id or its email address)
    pub async fn send_email(&self, grant: &str, to: &str, subject: &str, body: &str) -> IntegrationResult<String> {
        let url = format!("{}/v3/grants/{}/messages/send", self.base_url, urlencoding::encode(grant));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "to": [{ "email": to }],
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?;
        let response = check_status("nylas", response).await?;
        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;
        log::info!("[nylas] Sent message {}", sent.data.id);
        Ok(sent.data.id)
    }
}
