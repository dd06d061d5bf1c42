//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.
//! Every tenant-owned query takes the business id and filters on it.

mod appointments; // appointments
mod auth;         // api_keys, auth_sessions
mod businesses;   // businesses, business_hours, ai_configs, call_settings
mod calls;        // calls
mod campaigns;    // campaigns, campaign_contacts
mod commerce;     // inventory_items, orders, leads, reservation_settings, reservations
mod integrations; // calendar_integrations, crm_integrations, payment_accounts
mod messages;     // messages, dnc_entries
mod services;     // services

pub use appointments::{AppointmentFilter, InsertOutcome};
