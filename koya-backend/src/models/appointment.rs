use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    /// Only confirmed appointments can move, and only to a final state
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
            )
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub business_id: String,
    pub call_id: Option<i64>,
    pub service_id: Option<i64>,
    pub service_name: Option<String>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload shared by voice booking and the dashboard
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub business_id: String,
    pub call_id: Option<i64>,
    pub service_id: Option<i64>,
    pub service_name: Option<String>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Local date, YYYY-MM-DD
    pub date: String,
    /// Local time, HH:MM
    pub time: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub service: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trips_through_strings() {
        assert_eq!(AppointmentStatus::NoShow.as_ref(), "no_show");
        assert_eq!(AppointmentStatus::from_str("no_show").unwrap(), AppointmentStatus::NoShow);
        assert!(AppointmentStatus::from_str("rescheduled").is_err());
    }

    #[test]
    fn test_status_transitions() {
        assert!(AppointmentStatus::Confirmed.can_transition_to(AppointmentStatus::Cancelled));
        assert!(AppointmentStatus::Confirmed.can_transition_to(AppointmentStatus::NoShow));
        assert!(!AppointmentStatus::Cancelled.can_transition_to(AppointmentStatus::Confirmed));
        assert!(!AppointmentStatus::Completed.can_transition_to(AppointmentStatus::Cancelled));
        assert!(!AppointmentStatus::Confirmed.can_transition_to(AppointmentStatus::Confirmed));
    }
}
