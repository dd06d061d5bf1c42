//! Free/busy lookups against the business's connected calendar

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::oauth::{refresh_tokens, GOOGLE_TOKEN_URL, MICROSOFT_TOKEN_URL};
use super::{check_status, IntegrationError, IntegrationResult};
use crate::config::OAuthClientConfig;
use crate::db::Database;
use crate::models::{CalendarIntegration, CalendarProviderKind, OAuthTokens};
use crate::scheduling::Interval;

pub const GOOGLE_CALENDAR_BASE: &str = "https://www.googleapis.com";
pub const MICROSOFT_GRAPH_BASE: &str = "https://graph.microsoft.com";

#[derive(Debug, Deserialize)]
struct GoogleFreeBusy {
    #[serde(default)]
    calendars: HashMap<String, GoogleCalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarBusy {
    #[serde(default)]
    busy: Vec<GoogleBusyPeriod>,
}

#[derive(Debug, Deserialize)]
struct GoogleBusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GraphSchedules {
    #[serde(default)]
    value: Vec<GraphSchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphSchedule {
    #[serde(default)]
    schedule_items: Vec<GraphScheduleItem>,
}

#[derive(Debug, Deserialize)]
struct GraphScheduleItem {
    status: String,
    start: GraphDateTime,
    end: GraphDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
}

impl GraphDateTime {
    /// Graph returns naive timestamps in the zone requested (UTC here), with 7 fractional digits
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.date_time, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[derive(Clone)]
pub struct CalendarClient {
    http: Client,
    google: Option<OAuthClientConfig>,
    microsoft: Option<OAuthClientConfig>,
    google_base: String,
    graph_base: String,
    google_token_url: String,
    microsoft_token_url: String,
}

impl CalendarClient {
    pub fn new(http: Client, google: Option<OAuthClientConfig>, microsoft: Option<OAuthClientConfig>) -> Self {
        Self {
            http,
            google,
            microsoft,
            google_base: GOOGLE_CALENDAR_BASE.to_string(),
            graph_base: MICROSOFT_GRAPH_BASE.to_string(),
            google_token_url: GOOGLE_TOKEN_URL.to_string(),
            microsoft_token_url: MICROSOFT_TOKEN_URL.to_string(),
        }
    }

    /// Point every endpoint at one mock server
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.google_base = base.to_string();
        self.graph_base = base.to_string();
        self.google_token_url = format!("{}/google/token", base);
        self.microsoft_token_url = format!("{}/microsoft/token", base);
        self
    }

    /// Return a usable access token, refreshing and persisting it when close to expiry
    async fn access_token(
        &self,
        db: &Database,
        integration: &CalendarIntegration,
        now: DateTime<Utc>,
    ) -> IntegrationResult<String> {
        if !integration.tokens.needs_refresh(now) {
            return Ok(integration.tokens.access_token.clone());
        }

        let (app, token_url, service) = match integration.provider {
            CalendarProviderKind::Google => (self.google.as_ref(), &self.google_token_url, "google"),
            CalendarProviderKind::Outlook => (self.microsoft.as_ref(), &self.microsoft_token_url, "microsoft"),
        };
        let app = app.ok_or(IntegrationError::NotConfigured(service))?;
        let fresh: OAuthTokens = refresh_tokens(&self.http, service, token_url, app, &integration.tokens, now).await?;

        if let Err(e) = db.update_calendar_tokens(&integration.business_id, &fresh) {
            log::error!("[calendar] Failed to store refreshed tokens for {}: {}", integration.business_id, e);
        }
        Ok(fresh.access_token)
    }

    /// Busy intervals on the connected calendar that intersect `window`
    pub async fn busy_intervals(
        &self,
        db: &Database,
        integration: &CalendarIntegration,
        window: Interval,
        now: DateTime<Utc>,
    ) -> IntegrationResult<Vec<Interval>> {
        let token = self.access_token(db, integration, now).await?;
        let busy = match integration.provider {
            CalendarProviderKind::Google => self.google_busy(&token, &integration.calendar_id, window).await?,
            CalendarProviderKind::Outlook => self.outlook_busy(&token, &integration.calendar_id, window).await?,
        };
        log::debug!(
            "[calendar] {} busy intervals for {} between {} and {}",
            busy.len(),
            integration.business_id,
            window.start,
            window.end
        );
        Ok(busy)
    }

    async fn google_busy(&self, token: &str, calendar_id: &str, window: Interval) -> IntegrationResult<Vec<Interval>> {
        let response = self
            .http
            .post(format!("{}/calendar/v3/freeBusy", self.google_base))
            .bearer_auth(token)
            .json(&json!({
                "timeMin": window.start.to_rfc3339(),
                "timeMax": window.end.to_rfc3339(),
                "items": [{ "id": calendar_id }],
            }))
            .send()
            .await?;
        let response = check_status("google calendar", response).await?;
        let body: GoogleFreeBusy = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        Ok(body
            .calendars
            .get(calendar_id)
            .map(|c| c.busy.iter().map(|p| Interval::new(p.start, p.end)).collect())
            .unwrap_or_default())
    }

    async fn outlook_busy(&self, token: &str, mailbox: &str, window: Interval) -> IntegrationResult<Vec<Interval>> {
        let fmt = "%Y-%m-%dT%H:%M:%S";
        let response = self
            .http
            .post(format!("{}/v1.0/me/calendar/getSchedule", self.graph_base))
            .bearer_auth(token)
            .header("Prefer", "outlook.timezone=\"UTC\"")
            .json(&json!({
                "schedules": [mailbox],
                "startTime": { "dateTime": window.start.format(fmt).to_string(), "timeZone": "UTC" },
                "endTime": { "dateTime": window.end.format(fmt).to_string(), "timeZone": "UTC" },
                "availabilityViewInterval": 30,
            }))
            .send()
            .await?;
        let response = check_status("outlook calendar", response).await?;
        let body: GraphSchedules = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;

        let mut busy = Vec::new();
        for item in body.value.iter().flat_map(|s| s.schedule_items.iter()) {
            if item.status.eq_ignore_ascii_case("free") {
                continue;
            }
            match (item.start.to_utc(), item.end.to_utc()) {
                (Some(start), Some(end)) => busy.push(Interval::new(start, end)),
                _ => log::warn!("[calendar] Skipping Outlook item with unparsable times"),
            }
        }
        Ok(busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateBusinessRequest;
    use chrono::{Duration, TimeZone};
    use mockito::Server;

    fn window() -> Interval {
        Interval::new(
            Utc.with_ymd_and_hms(2030, 3, 5, 14, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 3, 5, 22, 0, 0).unwrap(),
        )
    }

    fn setup(provider: CalendarProviderKind, expires_at: Option<DateTime<Utc>>) -> (Database, CalendarIntegration) {
        let db = Database::new(":memory:").unwrap();
        let business = db
            .create_business(&CreateBusinessRequest {
                name: "Cal".to_string(),
                phone_number: None,
                owner_phone: None,
                owner_email: None,
                timezone: None,
            })
            .unwrap();
        let integration = CalendarIntegration {
            business_id: business.id,
            provider,
            calendar_id: "primary".to_string(),
            tokens: OAuthTokens {
                access_token: "access".to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at,
            },
        };
        db.upsert_calendar_integration(&integration).unwrap();
        (db, integration)
    }

    #[tokio::test]
    async fn test_google_busy_intervals() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/calendar/v3/freeBusy")
            .match_header("authorization", "Bearer access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"calendars":{"primary":{"busy":[{"start":"2030-03-05T15:00:00Z","end":"2030-03-05T16:00:00Z"}]}}}"#,
            )
            .create_async()
            .await;

        let (db, integration) = setup(CalendarProviderKind::Google, None);
        let client = CalendarClient::new(Client::new(), None, None).with_base_url(&server.url());
        let busy = client.busy_intervals(&db, &integration, window(), Utc::now()).await.unwrap();

        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].start, Utc.with_ymd_and_hms(2030, 3, 5, 15, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_outlook_skips_free_items() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1.0/me/calendar/getSchedule")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"value":[{"scheduleItems":[
                    {"status":"busy","start":{"dateTime":"2030-03-05T15:00:00.0000000","timeZone":"UTC"},"end":{"dateTime":"2030-03-05T15:30:00.0000000","timeZone":"UTC"}},
                    {"status":"free","start":{"dateTime":"2030-03-05T17:00:00.0000000","timeZone":"UTC"},"end":{"dateTime":"2030-03-05T18:00:00.0000000","timeZone":"UTC"}}
                ]}]}"#,
            )
            .create_async()
            .await;

        let (db, integration) = setup(CalendarProviderKind::Outlook, None);
        let client = CalendarClient::new(Client::new(), None, None).with_base_url(&server.url());
        let busy = client.busy_intervals(&db, &integration, window(), Utc::now()).await.unwrap();

        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].end, Utc.with_ymd_and_hms(2030, 3, 5, 15, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed_and_stored() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/google/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"fresh","expires_in":3600}"#)
            .create_async()
            .await;
        let busy_mock = server
            .mock("POST", "/calendar/v3/freeBusy")
            .match_header("authorization", "Bearer fresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"calendars":{}}"#)
            .create_async()
            .await;

        let now = Utc::now();
        let (db, integration) = setup(CalendarProviderKind::Google, Some(now + Duration::minutes(2)));
        let google = OAuthClientConfig {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        };
        let client = CalendarClient::new(Client::new(), Some(google), None).with_base_url(&server.url());
        let busy = client.busy_intervals(&db, &integration, window(), now).await.unwrap();

        assert!(busy.is_empty());
        busy_mock.assert_async().await;
        let stored = db.get_calendar_integration(&integration.business_id).unwrap().unwrap();
        assert_eq!(stored.tokens.access_token, "fresh");
        assert_eq!(stored.tokens.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_expiring_token_without_app_credentials() {
        let now = Utc::now();
        let (db, integration) = setup(CalendarProviderKind::Outlook, Some(now));
        let client = CalendarClient::new(Client::new(), None, None);
        let err = client.busy_intervals(&db, &integration, window(), now).await.unwrap_err();
        assert!(matches!(err, IntegrationError::NotConfigured("microsoft")));
    }
}
