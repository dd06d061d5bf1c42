//! Stripe Connect checkout links for collecting payment over the phone

use reqwest::Client;
use serde::Deserialize;

use super::{check_status, IntegrationError, IntegrationResult};
use crate::config::StripeConfig;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLink {
    pub session_id: String,
    pub url: String,
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    platform_fee_bps: u32,
    return_base_url: String,
    base_url: String,
}

/// Platform fee in cents for a charge, rounded down
pub fn application_fee(amount_cents: i64, fee_bps: u32) -> i64 {
    amount_cents * fee_bps as i64 / 10_000
}

impl StripeClient {
    pub fn new(http: Client, config: &StripeConfig, public_base_url: &str) -> Self {
        Self {
            http,
            secret_key: config.secret_key.clone(),
            platform_fee_bps: config.platform_fee_bps,
            return_base_url: public_base_url.trim_end_matches('/').to_string(),
            base_url: STRIPE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Create a hosted Checkout session on the business's connected account
    pub async fn create_checkout_link(
        &self,
        connected_account_id: &str,
        amount_cents: i64,
        description: &str,
    ) -> IntegrationResult<CheckoutLink> {
        let amount = amount_cents.to_string();
        let fee = application_fee(amount_cents, self.platform_fee_bps).to_string();
        let success_url = format!("{}/payment/success", self.return_base_url);
        let cancel_url = format!("{}/payment/cancelled", self.return_base_url);

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            ("line_items[0][price_data][product_data][name]", description),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];
        if self.platform_fee_bps > 0 {
            form.push(("payment_intent_data[application_fee_amount]", fee.as_str()));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .header("Stripe-Account", connected_account_id)
            .form(&form)
            .send()
            .await?;
        let response = check_status("stripe", response).await?;
        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| IntegrationError::InvalidResponse("checkout session has no url".to_string()))?;
        log::info!("[stripe] Checkout session {} on {}", session.id, connected_account_id);
        Ok(CheckoutLink {
            session_id: session.id,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_application_fee_rounds_down() {
        assert_eq!(application_fee(10_000, 250), 250);
        assert_eq!(application_fee(999, 250), 24);
        assert_eq!(application_fee(5_000, 0), 0);
    }

    #[tokio::test]
    async fn test_checkout_link_on_connected_account() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkout/sessions")
            .match_header("stripe-account", "acct_123")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("line_items[0][price_data][unit_amount]".into(), "4500".into()),
                Matcher::UrlEncoded("payment_intent_data[application_fee_amount]".into(), "90".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"cs_1","url":"https://checkout.stripe.com/c/cs_1"}"#)
            .create_async()
            .await;

        let client = StripeClient::new(
            Client::new(),
            &StripeConfig {
                secret_key: "sk_test".to_string(),
                platform_fee_bps: 200,
            },
            "https://koya.test",
        )
        .with_base_url(&server.url());

        let link = client.create_checkout_link("acct_123", 4500, "Deposit").await.unwrap();
        mock.assert_async().await;
        assert_eq!(link.url, "https://checkout.stripe.com/c/cs_1");
    }
}
