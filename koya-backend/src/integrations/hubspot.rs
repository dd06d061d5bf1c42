//! HubSpot CRM: push leads captured on calls as contacts

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::oauth::{refresh_tokens, HUBSPOT_TOKEN_URL};
use super::{check_status, IntegrationError, IntegrationResult};
use crate::config::OAuthClientConfig;
use crate::db::Database;
use crate::models::{CrmIntegration, CrmProviderKind, Lead};

pub const HUBSPOT_API_BASE: &str = "https://api.hubapi.com";

#[derive(Debug, Deserialize)]
struct ContactResponse {
    id: String,
}

#[derive(Clone)]
pub struct HubspotClient {
    http: Client,
    app: OAuthClientConfig,
    base_url: String,
    token_url: String,
}

/// Split a spoken full name into HubSpot's first/last name fields
fn split_name(name: &str) -> (String, Option<String>) {
    let mut parts = name.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.next().map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    (first, last)
}

fn contact_properties(lead: &Lead) -> Value {
    let (first, last) = split_name(&lead.name);
    let mut props = Map::new();
    props.insert("firstname".to_string(), json!(first));
    if let Some(last) = last {
        props.insert("lastname".to_string(), json!(last));
    }
    if let Some(phone) = &lead.phone {
        props.insert("phone".to_string(), json!(phone));
    }
    if let Some(email) = &lead.email {
        props.insert("email".to_string(), json!(email));
    }
    let note = [lead.interest.as_deref(), lead.notes.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" - ");
    if !note.is_empty() {
        props.insert("message".to_string(), json!(note));
    }
    props.insert("hs_lead_status".to_string(), json!("NEW"));
    Value::Object(props)
}

impl HubspotClient {
    pub fn new(http: Client, app: &OAuthClientConfig) -> Self {
        Self {
            http,
            app: app.clone(),
            base_url: HUBSPOT_API_BASE.to_string(),
            token_url: HUBSPOT_TOKEN_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.base_url = base.to_string();
        self.token_url = format!("{}/oauth/v1/token", base);
        self
    }

    /// Create a contact for a lead, refreshing the access token first when it is
    /// about to expire. Returns the HubSpot contact id.
    pub async fn push_lead(
        &self,
        db: &Database,
        integration: &CrmIntegration,
        lead: &Lead,
        now: DateTime<Utc>,
    ) -> IntegrationResult<String> {
        let token = if integration.tokens.needs_refresh(now) {
            let fresh = refresh_tokens(&self.http, "hubspot", &self.token_url, &self.app, &integration.tokens, now).await?;
            if let Err(e) = db.upsert_crm_tokens(&integration.business_id, CrmProviderKind::Hubspot, &fresh) {
                log::error!("[hubspot] Failed to store refreshed tokens for {}: {}", integration.business_id, e);
            }
            fresh.access_token
        } else {
            integration.tokens.access_token.clone()
        };

        let response = self
            .http
            .post(format!("{}/crm/v3/objects/contacts", self.base_url))
            .bearer_auth(&token)
            .json(&json!({ "properties": contact_properties(lead) }))
            .send()
            .await?;
        let response = check_status("hubspot", response).await?;
        let contact: ContactResponse = response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;
        log::info!("[hubspot] Created contact {} for lead {}", contact.id, lead.id);
        Ok(contact.id)
    }
}
