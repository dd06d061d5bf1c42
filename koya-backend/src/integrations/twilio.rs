//! Twilio REST (SMS) and webhook signature validation

use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;

use super::{check_status, IntegrationError, IntegrationResult};
use crate::config::TwilioConfig;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Clone)]
pub struct TwilioClient {
    http: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(http: Client, config: &TwilioConfig) -> Self {
        Self {
            http,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            base_url: TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Send an SMS, returning the message SID
    pub async fn send_sms(&self, from: &str, to: &str, body: &str) -> IntegrationResult<String> {
        let url = format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, self.account_sid);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;
        let response = check_status("twilio", response).await?;
        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;
        log::info!("[twilio] SMS {} sent to ...{}", message.sid, crate::phone::last_four(to));
        Ok(message.sid)
    }

    /// Check an `X-Twilio-Signature` header for a form-encoded webhook
    pub fn validate_signature(&self, signature: &str, url: &str, params: &[(String, String)]) -> bool {
        verify_signature(&self.auth_token, signature, url, params)
    }
}

/// Twilio signs the full request URL followed by every POST parameter
/// (sorted by name, name and value concatenated) with HMAC-SHA1
fn signing_payload(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut payload = url.to_string();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload
}

pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return String::new();
    };
    mac.update(signing_payload(url, params).as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_signature(auth_token: &str, signature: &str, url: &str, params: &[(String, String)]) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(signing_payload(url, params).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn params() -> Vec<(String, String)> {
        vec![
            ("To".to_string(), "+15550001111".to_string()),
            ("From".to_string(), "+15552223333".to_string()),
            ("CallSid".to_string(), "CA123".to_string()),
        ]
    }

    #[test]
    fn test_signature_round_trip() {
        let url = "https://koya.test/api/twilio/voice";
        let signature = compute_signature("token", url, &params());
        assert!(verify_signature("token", &signature, url, &params()));

        // Parameter order in the request does not matter
        let mut reversed = params();
        reversed.reverse();
        assert!(verify_signature("token", &signature, url, &reversed));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let url = "https://koya.test/api/twilio/voice";
        let signature = compute_signature("token", url, &params());
        assert!(!verify_signature("other-token", &signature, url, &params()));
        assert!(!verify_signature("token", &signature, "https://evil.test/api/twilio/voice", &params()));
        assert!(!verify_signature("token", "not base64!", url, &params()));

        let mut changed = params();
        changed[0].1 = "+15559999999".to_string();
        assert!(!verify_signature("token", &signature, url, &changed));
    }

    #[tokio::test]
    async fn test_send_sms() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC1/Messages.json")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".into(), "+15550001111".into()),
                Matcher::UrlEncoded("Body".into(), "See you Tuesday".into()),
            ]))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"sid":"SM42"}"#)
            .create_async()
            .await;

        let client = TwilioClient::new(
            Client::new(),
            &TwilioConfig {
                account_sid: "AC1".to_string(),
                auth_token: "token".to_string(),
            },
        )
        .with_base_url(&server.url());

        let sid = client.send_sms("+15552223333", "+15550001111", "See you Tuesday").await.unwrap();
        assert_eq!(sid, "SM42");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_sms_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC1/Messages.json")
            .with_status(400)
            .with_body(r#"{"message":"Invalid To number"}"#)
            .create_async()
            .await;

        let client = TwilioClient::new(
            Client::new(),
            &TwilioConfig {
                account_sid: "AC1".to_string(),
                auth_token: "token".to_string(),
            },
        )
        .with_base_url(&server.url());

        let err = client.send_sms("+15552223333", "bogus", "hi").await.unwrap_err();
        assert!(matches!(err, IntegrationError::Api { status: 400, .. }));
    }
}
