//! Inbox messages and do-not-call list

use chrono::Utc;
use rusqlite::{Result as SqliteResult, Row};

use crate::db::{fmt_ts, parse_enum, parse_ts, Database};
use crate::models::{DncEntry, Message, NewMessage};

const MESSAGE_COLUMNS: &str = "id, business_id, call_id, caller_name, caller_phone, body, urgency, recording_url, is_read, created_at";

fn row_to_message(row: &Row) -> SqliteResult<Message> {
    let urgency: String = row.get(6)?;
    let created_at: String = row.get(9)?;
    Ok(Message {
        id: row.get(0)?,
        business_id: row.get(1)?,
        call_id: row.get(2)?,
        caller_name: row.get(3)?,
        caller_phone: row.get(4)?,
        body: row.get(5)?,
        urgency: parse_enum(6, &urgency)?,
        recording_url: row.get(7)?,
        is_read: row.get::<_, i64>(8)? != 0,
        created_at: parse_ts(9, &created_at)?,
    })
}

impl Database {
    pub fn insert_message(&self, new: &NewMessage) -> SqliteResult<Message> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (business_id, call_id, caller_name, caller_phone, body, urgency, recording_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                &new.business_id,
                new.call_id,
                &new.caller_name,
                &new.caller_phone,
                &new.body,
                new.urgency.as_ref(),
                &new.recording_url,
                fmt_ts(Utc::now())
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(&format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS), [id], row_to_message)
    }

    pub fn list_messages(&self, business_id: &str, unread_only: bool, limit: i64) -> SqliteResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE business_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            MESSAGE_COLUMNS
        ))?;
        let messages = stmt
            .query_map(rusqlite::params![business_id, unread_only as i64, limit], row_to_message)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(messages)
    }

    /// Mark a message read. Returns false when it doesn't exist for this business.
    pub fn mark_message_read(&self, business_id: &str, id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE messages SET is_read = 1 WHERE business_id = ?1 AND id = ?2",
            rusqlite::params![business_id, id],
        )?;
        Ok(updated > 0)
    }

    /// Whether a normalized number is on the business's do-not-call list
    pub fn is_on_dnc(&self, business_id: &str, phone_number: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dnc_entries WHERE business_id = ?1 AND phone_number = ?2",
            rusqlite::params![business_id, phone_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Add a number to the DNC list; adding an existing number updates its reason
    pub fn add_dnc(&self, business_id: &str, phone_number: &str, reason: Option<&str>) -> SqliteResult<DncEntry> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dnc_entries (business_id, phone_number, reason, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(business_id, phone_number) DO UPDATE SET reason = COALESCE(excluded.reason, reason)",
            rusqlite::params![business_id, phone_number, reason, fmt_ts(Utc::now())],
        )?;
        conn.query_row(
            "SELECT id, business_id, phone_number, reason, created_at FROM dnc_entries WHERE business_id = ?1 AND phone_number = ?2",
            rusqlite::params![business_id, phone_number],
            |row| {
                let created_at: String = row.get(4)?;
                Ok(DncEntry {
                    id: row.get(0)?,
                    business_id: row.get(1)?,
                    phone_number: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: parse_ts(4, &created_at)?,
                })
            },
        )
    }

    pub fn remove_dnc(&self, business_id: &str, phone_number: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM dnc_entries WHERE business_id = ?1 AND phone_number = ?2",
            rusqlite::params![business_id, phone_number],
        )?;
        Ok(deleted > 0)
    }

    pub fn list_dnc(&self, business_id: &str) -> SqliteResult<Vec<DncEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, business_id, phone_number, reason, created_at FROM dnc_entries
             WHERE business_id = ?1 ORDER BY created_at DESC",
        )?;
        let entries = stmt
            .query_map([business_id], |row| {
                let created_at: String = row.get(4)?;
                Ok(DncEntry {
                    id: row.get(0)?,
                    business_id: row.get(1)?,
                    phone_number: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: parse_ts(4, &created_at)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(entries)
    }
}
