use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What a call achieved, shown in the dashboard call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallOutcome {
    Booked,
    Transferred,
    Info,
    Message,
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: i64,
    pub business_id: String,
    pub retell_call_id: Option<String>,
    pub twilio_call_sid: Option<String>,
    pub direction: CallDirection,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub outcome: Option<CallOutcome>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
}

/// Fields known when a call row is first created
#[derive(Debug, Clone)]
pub struct NewCall {
    pub business_id: String,
    pub retell_call_id: Option<String>,
    pub twilio_call_sid: Option<String>,
    pub direction: CallDirection,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
}
