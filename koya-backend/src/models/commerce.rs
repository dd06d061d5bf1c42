use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub business_id: String,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i64,
    pub price_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub business_id: String,
    pub order_number: String,
    pub customer_phone: Option<String>,
    /// Free-form status from the business's order system, e.g. "preparing", "shipped"
    pub status: String,
    pub total_cents: Option<i64>,
    pub estimated_ready_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub business_id: String,
    pub call_id: Option<i64>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub interest: Option<String>,
    pub notes: Option<String>,
    pub crm_contact_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewLead {
    pub business_id: String,
    pub call_id: Option<i64>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub interest: Option<String>,
    pub notes: Option<String>,
}

/// Table-service capacity for restaurants and similar businesses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSettings {
    pub business_id: String,
    /// Total covers that can be seated at once
    pub total_capacity: i64,
    pub max_party_size: i64,
    /// How long a table is held for one party
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub business_id: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub party_size: i64,
    pub reserved_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: String,
}
