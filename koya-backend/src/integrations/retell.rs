//! Retell voice agent: webhook signatures and the call APIs

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use super::{check_status, IntegrationError, IntegrationResult};

pub const RETELL_API_BASE: &str = "https://api.retellai.com";
pub const SIGNATURE_HEADER: &str = "x-retell-signature";
/// Signed webhooks older (or newer) than this are rejected
pub const SIGNATURE_TOLERANCE_MS: i64 = 5 * 60 * 1000;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac_for(api_key: &str, body: &[u8], timestamp_ms: i64) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(api_key.as_bytes()).ok()?;
    mac.update(body);
    mac.update(timestamp_ms.to_string().as_bytes());
    Some(mac)
}

/// Build a header value `v=<unix ms>,d=<hex digest>`
pub fn sign(api_key: &str, body: &[u8], timestamp_ms: i64) -> String {
    let digest = mac_for(api_key, body, timestamp_ms)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("v={},d={}", timestamp_ms, digest)
}

/// Verify a signature header against the raw body
pub fn verify_signature(api_key: &str, body: &[u8], header: Option<&str>, now_ms: i64) -> Result<(), SignatureError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(SignatureError::Missing)?;

    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("v", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("d", d)) => digest = hex::decode(d).ok(),
            _ => {}
        }
    }
    let (timestamp, digest) = match (timestamp, digest) {
        (Some(t), Some(d)) => (t, d),
        _ => return Err(SignatureError::Malformed),
    };

    if (now_ms - timestamp).abs() > SIGNATURE_TOLERANCE_MS {
        return Err(SignatureError::Expired);
    }

    let mac = mac_for(api_key, body, timestamp).ok_or(SignatureError::Mismatch)?;
    mac.verify_slice(&digest).map_err(|_| SignatureError::Mismatch)
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterPhoneCall {
    pub agent_id: String,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub direction: &'static str,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePhoneCall {
    pub from_number: String,
    pub to_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_agent_id: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetellCall {
    pub call_id: String,
    #[serde(default)]
    pub call_status: Option<String>,
}

#[derive(Clone)]
pub struct RetellClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl RetellClient {
    pub fn new(http: Client, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: RETELL_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    async fn post<T: Serialize>(&self, path: &str, payload: &T) -> IntegrationResult<RetellCall> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        let response = check_status("retell", response).await?;
        response
            .json::<RetellCall>()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
    }

    /// Register an inbound call that Twilio will bridge over SIP
    pub async fn register_phone_call(&self, request: &RegisterPhoneCall) -> IntegrationResult<RetellCall> {
        let call = self.post("/v2/register-phone-call", request).await?;
        log::info!("[retell] Registered call {} for agent {}", call.call_id, request.agent_id);
        Ok(call)
    }

    /// Start an outbound call
    pub async fn create_phone_call(&self, request: &CreatePhoneCall) -> IntegrationResult<RetellCall> {
        let call = self.post("/v2/create-phone-call", request).await?;
        log::info!(
            "[retell] Created outbound call {} to ...{}",
            call.call_id,
            crate::phone::last_four(&request.to_number)
        );
        Ok(call)
    }
}

/// Current time in the unit used by signature headers
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const KEY: &str = "retell-key";
    const BODY: &[u8] = br#"{"name":"end_call","args":{}}"#;

    #[test]
    fn test_valid_signature() {
        let now = 1_900_000_000_000;
        let header = sign(KEY, BODY, now - 1000);
        assert_eq!(verify_signature(KEY, BODY, Some(&header), now), Ok(()));
    }

    #[test]
    fn test_signature_failures() {
        let now = 1_900_000_000_000;
        let header = sign(KEY, BODY, now);

        assert_eq!(verify_signature(KEY, BODY, None, now), Err(SignatureError::Missing));
        assert_eq!(verify_signature(KEY, BODY, Some("garbage"), now), Err(SignatureError::Malformed));
        assert_eq!(
            verify_signature(KEY, BODY, Some(&header), now + SIGNATURE_TOLERANCE_MS + 1),
            Err(SignatureError::Expired)
        );
        assert_eq!(verify_signature("wrong", BODY, Some(&header), now), Err(SignatureError::Mismatch));
        assert_eq!(
            verify_signature(KEY, br#"{"name":"book_appointment"}"#, Some(&header), now),
            Err(SignatureError::Mismatch)
        );
    }

    #[tokio::test]
    async fn test_register_phone_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/register-phone-call")
            .match_header("authorization", "Bearer retell-key")
            .match_body(Matcher::PartialJson(json!({"agent_id": "agent_1", "direction": "inbound"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"call_id":"call_123","call_status":"registered"}"#)
            .create_async()
            .await;

        let client = RetellClient::new(Client::new(), KEY).with_base_url(&server.url());
        let call = client
            .register_phone_call(&RegisterPhoneCall {
                agent_id: "agent_1".to_string(),
                from_number: Some("+15550001111".to_string()),
                to_number: Some("+15552223333".to_string()),
                direction: "inbound",
                metadata: json!({"business_id": "biz"}),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(call.call_id, "call_123");
    }
}
