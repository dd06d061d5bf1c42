//! Call log database operations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{fmt_ts, parse_enum, parse_opt_ts, parse_ts, Database};
use crate::models::{Call, CallOutcome, NewCall};

const CALL_COLUMNS: &str = "id, business_id, retell_call_id, twilio_call_sid, direction, from_number, to_number, started_at, ended_at, duration_seconds, outcome, transcript, summary";

fn row_to_call(row: &Row) -> SqliteResult<Call> {
    let direction: String = row.get(4)?;
    let started_at: String = row.get(7)?;
    let outcome: Option<String> = row.get(10)?;
    Ok(Call {
        id: row.get(0)?,
        business_id: row.get(1)?,
        retell_call_id: row.get(2)?,
        twilio_call_sid: row.get(3)?,
        direction: parse_enum(4, &direction)?,
        from_number: row.get(5)?,
        to_number: row.get(6)?,
        started_at: parse_ts(7, &started_at)?,
        ended_at: parse_opt_ts(8, row.get(8)?)?,
        duration_seconds: row.get(9)?,
        outcome: outcome.map(|o| parse_enum(10, &o)).transpose()?,
        transcript: row.get(11)?,
        summary: row.get(12)?,
    })
}

impl Database {
    pub fn create_call(&self, new: &NewCall) -> SqliteResult<Call> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO calls (business_id, retell_call_id, twilio_call_sid, direction, from_number, to_number, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                &new.business_id,
                &new.retell_call_id,
                &new.twilio_call_sid,
                new.direction.as_ref(),
                &new.from_number,
                &new.to_number,
                fmt_ts(Utc::now())
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(&format!("SELECT {} FROM calls WHERE id = ?1", CALL_COLUMNS), [id], row_to_call)
    }

    pub fn get_call_by_retell_id(&self, retell_call_id: &str) -> SqliteResult<Option<Call>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM calls WHERE retell_call_id = ?1", CALL_COLUMNS),
            [retell_call_id],
            row_to_call,
        )
        .optional()
    }

    pub fn get_call_by_twilio_sid(&self, business_id: &str, call_sid: &str) -> SqliteResult<Option<Call>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM calls WHERE business_id = ?1 AND twilio_call_sid = ?2", CALL_COLUMNS),
            rusqlite::params![business_id, call_sid],
            row_to_call,
        )
        .optional()
    }

    /// Get the call row for a Retell call id, creating it if the lifecycle
    /// webhook has not arrived yet
    pub fn ensure_call(&self, new: &NewCall) -> SqliteResult<Call> {
        if let Some(retell_call_id) = new.retell_call_id.as_deref() {
            if let Some(call) = self.get_call_by_retell_id(retell_call_id)? {
                return Ok(call);
            }
        }
        self.create_call(new)
    }

    pub fn get_call(&self, business_id: &str, id: i64) -> SqliteResult<Option<Call>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM calls WHERE business_id = ?1 AND id = ?2", CALL_COLUMNS),
            rusqlite::params![business_id, id],
            row_to_call,
        )
        .optional()
    }

    pub fn list_calls(&self, business_id: &str, limit: i64, offset: i64) -> SqliteResult<Vec<Call>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM calls WHERE business_id = ?1 ORDER BY started_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            CALL_COLUMNS
        ))?;
        let calls = stmt
            .query_map(rusqlite::params![business_id, limit, offset], row_to_call)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(calls)
    }

    /// Record what the call achieved. A booking is never downgraded by a later outcome.
    pub fn set_call_outcome(&self, call_id: i64, outcome: CallOutcome) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET outcome = ?1 WHERE id = ?2 AND (outcome IS NULL OR outcome != 'booked')",
            rusqlite::params![outcome.as_ref(), call_id],
        )?;
        Ok(())
    }

    /// Finish a call with its end time, duration and, if not yet set, an outcome.
    /// Returns false when the call had already ended.
    pub fn complete_call(
        &self,
        call_id: i64,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
        default_outcome: CallOutcome,
    ) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE calls SET ended_at = ?1, duration_seconds = ?2, outcome = COALESCE(outcome, ?3)
             WHERE id = ?4 AND ended_at IS NULL",
            rusqlite::params![fmt_ts(ended_at), duration_seconds, default_outcome.as_ref(), call_id],
        )?;
        Ok(changed == 1)
    }

    pub fn set_call_analysis(&self, call_id: i64, transcript: Option<&str>, summary: Option<&str>) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET transcript = COALESCE(?1, transcript), summary = COALESCE(?2, summary) WHERE id = ?3",
            rusqlite::params![transcript, summary, call_id],
        )?;
        Ok(())
    }

    pub fn set_call_retell_id(&self, call_id: i64, retell_call_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET retell_call_id = ?1 WHERE id = ?2",
            rusqlite::params![retell_call_id, call_id],
        )?;
        Ok(())
    }
}
