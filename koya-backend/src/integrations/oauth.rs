//! OAuth refresh-token grant shared by the calendar and CRM adapters

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{check_status, IntegrationError, IntegrationResult};
use crate::config::OAuthClientConfig;
use crate::models::OAuthTokens;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
pub const HUBSPOT_TOKEN_URL: &str = "https://api.hubapi.com/oauth/v1/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Exchange a refresh token for a new access token.
/// Providers that don't rotate refresh tokens keep the old one.
pub async fn refresh_tokens(
    http: &Client,
    service: &'static str,
    token_url: &str,
    app: &OAuthClientConfig,
    current: &OAuthTokens,
    now: DateTime<Utc>,
) -> IntegrationResult<OAuthTokens> {
    let refresh_token = current.refresh_token.as_deref().ok_or(IntegrationError::TokenExpired)?;

    let response = http
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
        ])
        .send()
        .await?;
    let response = check_status(service, response).await?;
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

    log::info!("[oauth] Refreshed {} access token", service);
    Ok(OAuthTokens {
        access_token: body.access_token,
        refresh_token: body.refresh_token.or_else(|| current.refresh_token.clone()),
        expires_at: body.expires_in.map(|secs| now + Duration::seconds(secs)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn app() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "r-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"a-2","expires_in":3600}"#)
            .create_async()
            .await;

        let now = Utc::now();
        let current = OAuthTokens {
            access_token: "a-1".to_string(),
            refresh_token: Some("r-1".to_string()),
            expires_at: Some(now),
        };
        let url = format!("{}/token", server.url());
        let fresh = refresh_tokens(&Client::new(), "google", &url, &app(), &current, now)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fresh.access_token, "a-2");
        assert_eq!(fresh.refresh_token.as_deref(), Some("r-1"));
        assert_eq!(fresh.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let current = OAuthTokens {
            access_token: "a-1".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        let result = refresh_tokens(&Client::new(), "google", "http://unused", &app(), &current, Utc::now()).await;
        assert!(matches!(result, Err(IntegrationError::TokenExpired)));
    }
}
