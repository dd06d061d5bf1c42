//! Outbound campaign dispatcher.
//!
//! Running campaigns are worked through in batches: each due contact is checked
//! against the DNC list and then dialed through Retell. Failed or unanswered
//! attempts back off exponentially until the campaign's attempt limit.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;

use crate::db::Database;
use crate::integrations::retell::CreatePhoneCall;
use crate::integrations::{IntegrationError, Integrations};
use crate::models::{Campaign, CampaignContact, CampaignStatus, ContactStatus};

/// Longest wait between two attempts on the same contact
pub const MAX_RETRY_DELAY_MINUTES: i64 = 24 * 60;
/// Contacts dialed per campaign per dispatch pass
pub const DISPATCH_BATCH_SIZE: i64 = 25;
/// Calls shorter than this count as unanswered
pub const MIN_CONNECTED_SECONDS: i64 = 10;
/// A dialed contact with no call result after this long is treated as unanswered
pub const CALL_RESULT_TIMEOUT_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("campaign is {0}, not running")]
    NotRunning(CampaignStatus),

    #[error("business {0} has no phone number to call from")]
    NoCallerId(String),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// What one dispatch pass did
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub placed: usize,
    pub skipped_dnc: usize,
    pub retried: usize,
    pub failed: usize,
    /// Contacts whose call result never arrived
    pub timed_out: usize,
    pub campaign_completed: bool,
}

/// Minutes to wait before the next attempt, after `attempt` attempts so far
pub fn retry_delay_minutes(attempt: i64, base_minutes: i64) -> i64 {
    let exponent = (attempt.max(1) - 1).min(20) as u32;
    base_minutes
        .max(1)
        .saturating_mul(2_i64.saturating_pow(exponent))
        .min(MAX_RETRY_DELAY_MINUTES)
}

/// Whether an ended outbound call reached someone
pub fn was_answered(disconnection_reason: Option<&str>, duration_seconds: i64) -> bool {
    let unreachable = disconnection_reason.is_some_and(|r| r.starts_with("dial_") || r == "voicemail_reached");
    !unreachable && duration_seconds >= MIN_CONNECTED_SECONDS
}

/// Requeue a contact after a failed attempt, or fail it once attempts run out
fn retry_or_fail(
    db: &Database,
    campaign: &Campaign,
    contact: &CampaignContact,
    attempts: i64,
    error: &str,
    now: DateTime<Utc>,
) -> Result<bool, CampaignError> {
    if attempts >= campaign.max_attempts {
        db.finish_contact(contact.id, ContactStatus::Failed, Some(error))?;
        log::info!(
            "[campaigns] Contact {} failed after {} attempts: {}",
            contact.id,
            attempts,
            error
        );
        return Ok(false);
    }
    let next = now + Duration::minutes(retry_delay_minutes(attempts, campaign.retry_base_minutes));
    db.schedule_contact_retry(contact.id, next, error)?;
    log::debug!("[campaigns] Contact {} retry at {}", contact.id, next);
    Ok(true)
}

/// Close out a running campaign that has no callable contacts left
fn complete_if_drained(db: &Database, campaign: &Campaign) -> Result<bool, CampaignError> {
    if db.open_campaign_contacts(campaign.id)? > 0 {
        return Ok(false);
    }
    let current = db.get_campaign_by_id(campaign.id)?;
    if current.is_some_and(|c| c.status == CampaignStatus::Running) {
        db.set_campaign_status(&campaign.business_id, campaign.id, CampaignStatus::Completed)?;
        log::info!("[campaigns] Campaign {} completed", campaign.id);
        return Ok(true);
    }
    Ok(false)
}

/// Dial every due contact of a running campaign
pub async fn dispatch_campaign(
    db: &Database,
    integrations: &Integrations,
    campaign: &Campaign,
    now: DateTime<Utc>,
) -> Result<DispatchSummary, CampaignError> {
    if campaign.status != CampaignStatus::Running {
        return Err(CampaignError::NotRunning(campaign.status));
    }
    let retell = integrations
        .retell
        .as_ref()
        .ok_or(IntegrationError::NotConfigured("retell"))?;
    let from_number = db
        .get_business(&campaign.business_id)?
        .and_then(|b| b.phone_number)
        .ok_or_else(|| CampaignError::NoCallerId(campaign.business_id.clone()))?;
    let agent_id = db
        .get_ai_config(&campaign.business_id)?
        .and_then(|c| c.retell_outbound_agent_id);

    let mut summary = DispatchSummary::default();
    let stale_before = now - Duration::minutes(CALL_RESULT_TIMEOUT_MINUTES);
    for contact in db.stale_calling_contacts(campaign.id, stale_before)? {
        log::warn!("[campaigns] No result for contact {} call {:?}", contact.id, contact.retell_call_id);
        retry_or_fail(db, campaign, &contact, contact.attempts, "call result timed out", now)?;
        summary.timed_out += 1;
    }

    for contact in db.due_campaign_contacts(campaign.id, now, DISPATCH_BATCH_SIZE)? {
        if db.is_on_dnc(&campaign.business_id, &contact.phone_number)? {
            db.finish_contact(contact.id, ContactStatus::SkippedDnc, None)?;
            summary.skipped_dnc += 1;
            continue;
        }
        if !db.claim_contact(contact.id, now)? {
            log::debug!("[campaigns] Contact {} already claimed", contact.id);
            continue;
        }

        let request = CreatePhoneCall {
            from_number: from_number.clone(),
            to_number: contact.phone_number.clone(),
            override_agent_id: agent_id.clone(),
            metadata: json!({
                "business_id": campaign.business_id,
                "campaign_id": campaign.id,
                "contact_id": contact.id,
            }),
        };
        match retell.create_phone_call(&request).await {
            Ok(call) => {
                db.set_contact_call_id(contact.id, &call.call_id)?;
                summary.placed += 1;
            }
            Err(e) => {
                log::warn!("[campaigns] Dial to contact {} failed: {}", contact.id, e);
                if retry_or_fail(db, campaign, &contact, contact.attempts + 1, &e.to_string(), now)? {
                    summary.retried += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }
    }

    summary.campaign_completed = complete_if_drained(db, campaign)?;
    log::info!(
        "[campaigns] Campaign {}: placed={} dnc={} retried={} failed={}",
        campaign.id,
        summary.placed,
        summary.skipped_dnc,
        summary.retried,
        summary.failed
    );
    Ok(summary)
}

/// Settle the campaign contact behind an ended outbound call.
/// Returns false when the call did not belong to a campaign.
pub fn handle_call_ended(
    db: &Database,
    retell_call_id: &str,
    answered: bool,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, CampaignError> {
    let Some(contact) = db.get_contact_by_retell_call_id(retell_call_id)? else {
        return Ok(false);
    };
    if contact.status != ContactStatus::Calling {
        return Ok(true);
    }
    let Some(campaign) = db.get_campaign_by_id(contact.campaign_id)? else {
        return Ok(true);
    };

    if answered {
        db.finish_contact(contact.id, ContactStatus::Completed, None)?;
    } else {
        let error = reason.unwrap_or("no answer");
        retry_or_fail(db, &campaign, &contact, contact.attempts, error, now)?;
    }
    complete_if_drained(db, &campaign)?;
    Ok(true)
}

/// Dispatch every running campaign once
pub async fn dispatch_all(db: &Database, integrations: &Integrations, now: DateTime<Utc>) {
    let campaigns = match db.list_running_campaigns() {
        Ok(campaigns) => campaigns,
        Err(e) => {
            log::error!("[campaigns] Failed to list running campaigns: {}", e);
            return;
        }
    };
    for campaign in campaigns {
        if let Err(e) = dispatch_campaign(db, integrations, &campaign, now).await {
            log::warn!("[campaigns] Dispatch of campaign {} failed: {}", campaign.id, e);
        }
    }
}

/// Background loop that dispatches running campaigns until shutdown
pub async fn run_dispatcher(
    db: Arc<Database>,
    integrations: Arc<Integrations>,
    every: StdDuration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    log::info!("[campaigns] Dispatcher started ({}s interval)", every.as_secs());
    loop {
        tokio::select! {
            _ = ticker.tick() => dispatch_all(&db, &integrations, Utc::now()).await,
            _ = &mut shutdown => {
                log::info!("[campaigns] Dispatcher stopped");
                break;
            }
        }
    }
}
