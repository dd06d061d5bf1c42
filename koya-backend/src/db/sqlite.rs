//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection management (new, init)
//! - Schema creation and migrations
//!
//! All table operations live in the tables/ subdirectory.

use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;

/// Main database wrapper; the Mutex serializes access to the single connection
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection and initialize schema
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize all database tables and run migrations
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        // Tenants
        conn.execute(
            "CREATE TABLE IF NOT EXISTS businesses (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone_number TEXT UNIQUE,
                owner_phone TEXT,
                owner_email TEXT,
                timezone TEXT NOT NULL DEFAULT 'America/New_York',
                payment_link_url TEXT,
                minutes_used INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS business_hours (
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
                open_time TEXT NOT NULL,
                close_time TEXT NOT NULL,
                is_closed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (business_id, day_of_week)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ai_configs (
                business_id TEXT PRIMARY KEY REFERENCES businesses(id) ON DELETE CASCADE,
                greeting TEXT NOT NULL,
                personality TEXT NOT NULL DEFAULT 'friendly',
                retell_agent_id TEXT UNIQUE,
                retell_outbound_agent_id TEXT,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS call_settings (
                business_id TEXT PRIMARY KEY REFERENCES businesses(id) ON DELETE CASCADE,
                transfer_number TEXT,
                backup_transfer_number TEXT,
                transfer_hours_only INTEGER NOT NULL DEFAULT 0,
                sms_confirmations INTEGER NOT NULL DEFAULT 1,
                urgent_message_alerts INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS services (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL DEFAULT 60,
                price_cents INTEGER,
                UNIQUE(business_id, name)
            )",
            [],
        )?;

        // Calls and what came out of them
        conn.execute(
            "CREATE TABLE IF NOT EXISTS calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                retell_call_id TEXT UNIQUE,
                twilio_call_sid TEXT,
                direction TEXT NOT NULL DEFAULT 'inbound',
                from_number TEXT,
                to_number TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_seconds INTEGER,
                outcome TEXT,
                transcript TEXT,
                summary TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS appointments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                call_id INTEGER REFERENCES calls(id) ON DELETE SET NULL,
                service_id INTEGER REFERENCES services(id) ON DELETE SET NULL,
                service_name TEXT,
                customer_name TEXT NOT NULL,
                customer_phone TEXT,
                customer_email TEXT,
                scheduled_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'confirmed',
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_appointments_business_time
                ON appointments(business_id, scheduled_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                call_id INTEGER REFERENCES calls(id) ON DELETE SET NULL,
                caller_name TEXT,
                caller_phone TEXT,
                body TEXT NOT NULL,
                urgency TEXT NOT NULL DEFAULT 'normal',
                recording_url TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS dnc_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                phone_number TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(business_id, phone_number)
            )",
            [],
        )?;

        // Auth
        conn.execute(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key_prefix TEXT NOT NULL,
                key_hash TEXT UNIQUE NOT NULL,
                last_used_at TEXT,
                revoked_at TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        // Third-party connections
        conn.execute(
            "CREATE TABLE IF NOT EXISTS calendar_integrations (
                business_id TEXT PRIMARY KEY REFERENCES businesses(id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                calendar_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS crm_integrations (
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (business_id, provider)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payment_accounts (
                business_id TEXT PRIMARY KEY REFERENCES businesses(id) ON DELETE CASCADE,
                stripe_account_id TEXT NOT NULL,
                charges_enabled INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Commerce lookups used by the voice agent
        conn.execute(
            "CREATE TABLE IF NOT EXISTS inventory_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                sku TEXT,
                quantity INTEGER NOT NULL DEFAULT 0,
                price_cents INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                order_number TEXT NOT NULL,
                customer_phone TEXT,
                status TEXT NOT NULL,
                total_cents INTEGER,
                estimated_ready_at TEXT,
                created_at TEXT NOT NULL,
                UNIQUE(business_id, order_number)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS leads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                call_id INTEGER REFERENCES calls(id) ON DELETE SET NULL,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                interest TEXT,
                notes TEXT,
                crm_contact_id TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reservation_settings (
                business_id TEXT PRIMARY KEY REFERENCES businesses(id) ON DELETE CASCADE,
                total_capacity INTEGER NOT NULL,
                max_party_size INTEGER NOT NULL,
                duration_minutes INTEGER NOT NULL DEFAULT 90
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reservations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                customer_name TEXT NOT NULL,
                customer_phone TEXT,
                party_size INTEGER NOT NULL,
                reserved_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'confirmed'
            )",
            [],
        )?;

        // Outbound campaigns
        conn.execute(
            "CREATE TABLE IF NOT EXISTS campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                max_attempts INTEGER NOT NULL DEFAULT 3,
                retry_base_minutes INTEGER NOT NULL DEFAULT 30,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS campaign_contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                business_id TEXT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
                phone_number TEXT NOT NULL,
                name TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                next_attempt_at TEXT NOT NULL,
                last_error TEXT,
                retell_call_id TEXT,
                UNIQUE(campaign_id, phone_number)
            )",
            [],
        )?;

        // Migration: Add payment_link_url column if it doesn't exist (for old DBs)
        let has_payment_link: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('businesses') WHERE name='payment_link_url'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|c| c > 0)
            .unwrap_or(false);

        if !has_payment_link {
            conn.execute("ALTER TABLE businesses ADD COLUMN payment_link_url TEXT", [])?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_on_disk_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("koya.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        drop(db);
        assert!(path.exists());

        // Re-opening runs init again without failing
        Database::new(path.to_str().unwrap()).unwrap();
    }
}
