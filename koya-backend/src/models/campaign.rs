use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// Allowed next states from this one
    pub fn allowed_transitions(&self) -> &'static [CampaignStatus] {
        use CampaignStatus::*;
        match self {
            Draft => &[Scheduled, Running, Cancelled],
            Scheduled => &[Running, Draft, Cancelled],
            Running => &[Paused, Completed, Cancelled],
            Paused => &[Running, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Calling,
    Completed,
    Failed,
    SkippedDnc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub business_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub max_attempts: i64,
    pub retry_base_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: i64,
    pub campaign_id: i64,
    pub business_id: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub status: ContactStatus,
    pub attempts: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub retell_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub max_attempts: Option<i64>,
    pub retry_base_minutes: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignContactInput {
    pub phone_number: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCampaignStatusRequest {
    pub status: CampaignStatus,
}
