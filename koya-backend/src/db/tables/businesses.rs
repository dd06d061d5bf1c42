//! Business (tenant) database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};
use uuid::Uuid;

use crate::db::{fmt_ts, parse_enum, parse_time, parse_ts, Database};
use crate::models::{AiConfig, Business, BusinessHours, CallSettings, CreateBusinessRequest, UpdateAiConfigRequest};

const BUSINESS_COLUMNS: &str = "id, name, phone_number, owner_phone, owner_email, timezone, payment_link_url, minutes_used, created_at, updated_at";

fn row_to_business(row: &Row) -> SqliteResult<Business> {
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Business {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number: row.get(2)?,
        owner_phone: row.get(3)?,
        owner_email: row.get(4)?,
        timezone: row.get(5)?,
        payment_link_url: row.get(6)?,
        minutes_used: row.get(7)?,
        created_at: parse_ts(8, &created_at)?,
        updated_at: parse_ts(9, &updated_at)?,
    })
}

fn row_to_ai_config(row: &Row) -> SqliteResult<AiConfig> {
    let personality: String = row.get(2)?;
    let updated_at: String = row.get(5)?;
    Ok(AiConfig {
        business_id: row.get(0)?,
        greeting: row.get(1)?,
        personality: parse_enum(2, &personality)?,
        retell_agent_id: row.get(3)?,
        retell_outbound_agent_id: row.get(4)?,
        updated_at: parse_ts(5, &updated_at)?,
    })
}

impl Database {
    /// Create a business with default hours, AI config and call settings.
    /// `phone_number` is expected to be normalized already.
    pub fn create_business(&self, req: &CreateBusinessRequest) -> SqliteResult<Business> {
        let id = Uuid::new_v4().to_string();
        let now = fmt_ts(Utc::now());
        let timezone = req.timezone.clone().unwrap_or_else(|| "America/New_York".to_string());

        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO businesses (id, name, phone_number, owner_phone, owner_email, timezone, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![&id, &req.name, &req.phone_number, &req.owner_phone, &req.owner_email, &timezone, &now],
            )?;

            for hours in BusinessHours::default_week() {
                tx.execute(
                    "INSERT INTO business_hours (business_id, day_of_week, open_time, close_time, is_closed)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        &id,
                        hours.day_of_week,
                        hours.open_time.format("%H:%M").to_string(),
                        hours.close_time.format("%H:%M").to_string(),
                        hours.is_closed as i64
                    ],
                )?;
            }

            let ai = AiConfig::default_for(&id, &req.name);
            tx.execute(
                "INSERT INTO ai_configs (business_id, greeting, personality, updated_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![&id, &ai.greeting, ai.personality.as_ref(), &now],
            )?;

            let settings = CallSettings::default_for(&id);
            tx.execute(
                "INSERT INTO call_settings (business_id, sms_confirmations, urgent_message_alerts) VALUES (?1, ?2, ?3)",
                rusqlite::params![&id, settings.sms_confirmations as i64, settings.urgent_message_alerts as i64],
            )?;
            tx.commit()?;
        }

        self.get_business(&id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn get_business(&self, business_id: &str) -> SqliteResult<Option<Business>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM businesses WHERE id = ?1", BUSINESS_COLUMNS),
            [business_id],
            row_to_business,
        )
        .optional()
    }

    /// Find the business that owns a dialed number
    pub fn get_business_by_phone(&self, phone_number: &str) -> SqliteResult<Option<Business>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM businesses WHERE phone_number = ?1", BUSINESS_COLUMNS),
            [phone_number],
            row_to_business,
        )
        .optional()
    }

    /// Find the business whose inbound or outbound voice agent has this id
    pub fn get_business_by_agent_id(&self, agent_id: &str) -> SqliteResult<Option<Business>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT b.id, b.name, b.phone_number, b.owner_phone, b.owner_email, b.timezone, b.payment_link_url, b.minutes_used, b.created_at, b.updated_at
             FROM businesses b JOIN ai_configs a ON a.business_id = b.id
             WHERE a.retell_agent_id = ?1 OR a.retell_outbound_agent_id = ?1
             LIMIT 1",
            [agent_id],
            row_to_business,
        )
        .optional()
    }

    pub fn list_businesses(&self) -> SqliteResult<Vec<Business>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM businesses ORDER BY created_at DESC", BUSINESS_COLUMNS))?;
        let businesses = stmt
            .query_map([], row_to_business)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(businesses)
    }

    /// Update profile fields; None leaves a field unchanged
    pub fn update_business_profile(
        &self,
        business_id: &str,
        name: Option<&str>,
        phone_number: Option<&str>,
        owner_phone: Option<&str>,
        owner_email: Option<&str>,
        timezone: Option<&str>,
        payment_link_url: Option<&str>,
    ) -> SqliteResult<Option<Business>> {
        {
            let conn = self.conn.lock().unwrap();
            let now = fmt_ts(Utc::now());
            conn.execute(
                "UPDATE businesses SET
                    name = COALESCE(?1, name),
                    phone_number = COALESCE(?2, phone_number),
                    owner_phone = COALESCE(?3, owner_phone),
                    owner_email = COALESCE(?4, owner_email),
                    timezone = COALESCE(?5, timezone),
                    payment_link_url = COALESCE(?6, payment_link_url),
                    updated_at = ?7
                 WHERE id = ?8",
                rusqlite::params![name, phone_number, owner_phone, owner_email, timezone, payment_link_url, &now, business_id],
            )?;
        }
        self.get_business(business_id)
    }

    /// Add billed minutes from a finished call
    pub fn add_minutes_used(&self, business_id: &str, minutes: i64) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE businesses SET minutes_used = minutes_used + ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![minutes, fmt_ts(Utc::now()), business_id],
        )?;
        Ok(())
    }

    pub fn get_business_hours(&self, business_id: &str) -> SqliteResult<Vec<BusinessHours>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT day_of_week, open_time, close_time, is_closed FROM business_hours
             WHERE business_id = ?1 ORDER BY day_of_week",
        )?;
        let hours = stmt
            .query_map([business_id], |row| {
                let open: String = row.get(1)?;
                let close: String = row.get(2)?;
                Ok(BusinessHours {
                    day_of_week: row.get(0)?,
                    open_time: parse_time(1, &open)?,
                    close_time: parse_time(2, &close)?,
                    is_closed: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(hours)
    }

    /// Replace the hours for the given weekdays
    pub fn set_business_hours(&self, business_id: &str, hours: &[BusinessHours]) -> SqliteResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for h in hours {
            tx.execute(
                "INSERT INTO business_hours (business_id, day_of_week, open_time, close_time, is_closed)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(business_id, day_of_week) DO UPDATE SET
                    open_time = excluded.open_time,
                    close_time = excluded.close_time,
                    is_closed = excluded.is_closed",
                rusqlite::params![
                    business_id,
                    h.day_of_week,
                    h.open_time.format("%H:%M").to_string(),
                    h.close_time.format("%H:%M").to_string(),
                    h.is_closed as i64
                ],
            )?;
        }
        tx.commit()
    }

    pub fn get_ai_config(&self, business_id: &str) -> SqliteResult<Option<AiConfig>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT business_id, greeting, personality, retell_agent_id, retell_outbound_agent_id, updated_at
             FROM ai_configs WHERE business_id = ?1",
            [business_id],
            row_to_ai_config,
        )
        .optional()
    }

    pub fn update_ai_config(&self, business_id: &str, req: &UpdateAiConfigRequest) -> SqliteResult<Option<AiConfig>> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE ai_configs SET
                    greeting = COALESCE(?1, greeting),
                    personality = COALESCE(?2, personality),
                    retell_agent_id = COALESCE(?3, retell_agent_id),
                    retell_outbound_agent_id = COALESCE(?4, retell_outbound_agent_id),
                    updated_at = ?5
                 WHERE business_id = ?6",
                rusqlite::params![
                    req.greeting,
                    req.personality.map(|p| p.as_ref().to_string()),
                    req.retell_agent_id,
                    req.retell_outbound_agent_id,
                    fmt_ts(Utc::now()),
                    business_id
                ],
            )?;
        }
        self.get_ai_config(business_id)
    }

    /// Call settings, falling back to defaults when the row is missing
    pub fn get_call_settings(&self, business_id: &str) -> SqliteResult<CallSettings> {
        let conn = self.conn.lock().unwrap();
        let settings = conn
            .query_row(
                "SELECT business_id, transfer_number, backup_transfer_number, transfer_hours_only, sms_confirmations, urgent_message_alerts
                 FROM call_settings WHERE business_id = ?1",
                [business_id],
                |row| {
                    Ok(CallSettings {
                        business_id: row.get(0)?,
                        transfer_number: row.get(1)?,
                        backup_transfer_number: row.get(2)?,
                        transfer_hours_only: row.get::<_, i64>(3)? != 0,
                        sms_confirmations: row.get::<_, i64>(4)? != 0,
                        urgent_message_alerts: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(settings.unwrap_or_else(|| CallSettings::default_for(business_id)))
    }

    pub fn upsert_call_settings(&self, settings: &CallSettings) -> SqliteResult<CallSettings> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO call_settings (business_id, transfer_number, backup_transfer_number, transfer_hours_only, sms_confirmations, urgent_message_alerts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(business_id) DO UPDATE SET
                    transfer_number = excluded.transfer_number,
                    backup_transfer_number = excluded.backup_transfer_number,
                    transfer_hours_only = excluded.transfer_hours_only,
                    sms_confirmations = excluded.sms_confirmations,
                    urgent_message_alerts = excluded.urgent_message_alerts",
                rusqlite::params![
                    &settings.business_id,
                    &settings.transfer_number,
                    &settings.backup_transfer_number,
                    settings.transfer_hours_only as i64,
                    settings.sms_confirmations as i64,
                    settings.urgent_message_alerts as i64
                ],
            )?;
        }
        self.get_call_settings(&settings.business_id)
    }
}
