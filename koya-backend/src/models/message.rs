use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

/// Inbox entry: a message taken by the receptionist or a voicemail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub business_id: String,
    pub call_id: Option<i64>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub body: String,
    pub urgency: Urgency,
    pub recording_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub business_id: String,
    pub call_id: Option<i64>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
    pub body: String,
    pub urgency: Urgency,
    pub recording_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DncEntry {
    pub id: i64,
    pub business_id: String,
    pub phone_number: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
