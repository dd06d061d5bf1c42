use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::personality::Personality;

/// A tenant: one business account using the receptionist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: String,
    pub name: String,
    /// E.164 number callers dial (forwarded to the Twilio number)
    pub phone_number: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
    /// IANA timezone name, e.g. "America/Chicago"
    pub timezone: String,
    /// Static payment page used when Stripe Connect is not set up
    pub payment_link_url: Option<String>,
    pub minutes_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Opening hours for one weekday (0 = Sunday)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    pub day_of_week: u8,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub is_closed: bool,
}

impl BusinessHours {
    pub fn open(day_of_week: u8, open_time: NaiveTime, close_time: NaiveTime) -> Self {
        Self {
            day_of_week,
            open_time,
            close_time,
            is_closed: false,
        }
    }

    /// Mon-Fri 9-5, weekends closed
    pub fn default_week() -> Vec<BusinessHours> {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default();
        (0..7u8)
            .map(|day| BusinessHours {
                day_of_week: day,
                open_time: nine,
                close_time: five,
                is_closed: day == 0 || day == 6,
            })
            .collect()
    }
}

/// Voice agent configuration for a business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub business_id: String,
    pub greeting: String,
    pub personality: Personality,
    pub retell_agent_id: Option<String>,
    pub retell_outbound_agent_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AiConfig {
    pub fn default_for(business_id: &str, business_name: &str) -> Self {
        Self {
            business_id: business_id.to_string(),
            greeting: format!("Thanks for calling {}! How can I help you today?", business_name),
            personality: Personality::default(),
            retell_agent_id: None,
            retell_outbound_agent_id: None,
            updated_at: Utc::now(),
        }
    }
}

/// Transfer and notification preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSettings {
    pub business_id: String,
    pub transfer_number: Option<String>,
    pub backup_transfer_number: Option<String>,
    /// Only transfer while the business is open
    pub transfer_hours_only: bool,
    /// Text customers a confirmation after booking
    pub sms_confirmations: bool,
    /// Text the owner when an urgent message is taken
    pub urgent_message_alerts: bool,
}

impl CallSettings {
    pub fn default_for(business_id: &str) -> Self {
        Self {
            business_id: business_id.to_string(),
            transfer_number: None,
            backup_transfer_number: None,
            transfer_hours_only: false,
            sms_confirmations: true,
            urgent_message_alerts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub business_id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBusinessRequest {
    pub name: String,
    pub phone_number: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBusinessRequest {
    pub name: Option<String>,
    pub phone_number: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_email: Option<String>,
    pub timezone: Option<String>,
    pub payment_link_url: Option<String>,
    pub hours: Option<Vec<BusinessHours>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAiConfigRequest {
    pub greeting: Option<String>,
    pub personality: Option<Personality>,
    pub retell_agent_id: Option<String>,
    pub retell_outbound_agent_id: Option<String>,
}
