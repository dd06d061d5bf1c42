//! Outbound campaigns and their contact lists

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{fmt_ts, parse_enum, parse_ts, Database};
use crate::models::{Campaign, CampaignContact, CampaignStatus, ContactStatus, CreateCampaignRequest};

const CAMPAIGN_COLUMNS: &str = "id, business_id, name, status, max_attempts, retry_base_minutes, created_at, updated_at";
const CONTACT_COLUMNS: &str =
    "id, campaign_id, business_id, phone_number, name, status, attempts, next_attempt_at, last_error, retell_call_id";

fn row_to_campaign(row: &Row) -> SqliteResult<Campaign> {
    let status: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Campaign {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        status: parse_enum(3, &status)?,
        max_attempts: row.get(4)?,
        retry_base_minutes: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
        updated_at: parse_ts(7, &updated_at)?,
    })
}

fn row_to_contact(row: &Row) -> SqliteResult<CampaignContact> {
    let status: String = row.get(5)?;
    let next_attempt_at: String = row.get(7)?;
    Ok(CampaignContact {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        business_id: row.get(2)?,
        phone_number: row.get(3)?,
        name: row.get(4)?,
        status: parse_enum(5, &status)?,
        attempts: row.get(6)?,
        next_attempt_at: parse_ts(7, &next_attempt_at)?,
        last_error: row.get(8)?,
        retell_call_id: row.get(9)?,
    })
}

impl Database {
    pub fn create_campaign(&self, business_id: &str, request: &CreateCampaignRequest) -> SqliteResult<Campaign> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_ts(Utc::now());
        conn.execute(
            "INSERT INTO campaigns (business_id, name, status, max_attempts, retry_base_minutes, created_at, updated_at)
             VALUES (?1, ?2, 'draft', ?3, ?4, ?5, ?5)",
            rusqlite::params![
                business_id,
                request.name.trim(),
                request.max_attempts.unwrap_or(3).max(1),
                request.retry_base_minutes.unwrap_or(30).max(1),
                &now
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(&format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLUMNS), [id], row_to_campaign)
    }

    pub fn list_campaigns(&self, business_id: &str) -> SqliteResult<Vec<Campaign>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campaigns WHERE business_id = ?1 ORDER BY created_at DESC, id DESC",
            CAMPAIGN_COLUMNS
        ))?;
        let campaigns = stmt
            .query_map([business_id], row_to_campaign)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(campaigns)
    }

    pub fn get_campaign(&self, business_id: &str, id: i64) -> SqliteResult<Option<Campaign>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM campaigns WHERE business_id = ?1 AND id = ?2", CAMPAIGN_COLUMNS),
            rusqlite::params![business_id, id],
            row_to_campaign,
        )
        .optional()
    }

    /// Write a new status. Transition rules are enforced by the caller.
    pub fn set_campaign_status(&self, business_id: &str, id: i64, status: CampaignStatus) -> SqliteResult<Option<Campaign>> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE campaigns SET status = ?1, updated_at = ?2 WHERE business_id = ?3 AND id = ?4",
            rusqlite::params![status.as_ref(), fmt_ts(Utc::now()), business_id, id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        conn.query_row(&format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLUMNS), [id], row_to_campaign)
            .optional()
    }

    /// Insert already-normalized contacts; duplicates within a campaign are skipped.
    /// Returns how many rows were added.
    pub fn add_campaign_contacts(
        &self,
        business_id: &str,
        campaign_id: i64,
        contacts: &[(String, Option<String>)],
    ) -> SqliteResult<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = fmt_ts(Utc::now());
        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO campaign_contacts (campaign_id, business_id, phone_number, name, next_attempt_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (phone, name) in contacts {
                added += stmt.execute(rusqlite::params![campaign_id, business_id, phone, name, &now])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    pub fn list_campaign_contacts(&self, business_id: &str, campaign_id: i64) -> SqliteResult<Vec<CampaignContact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campaign_contacts WHERE business_id = ?1 AND campaign_id = ?2 ORDER BY id",
            CONTACT_COLUMNS
        ))?;
        let contacts = stmt
            .query_map(rusqlite::params![business_id, campaign_id], row_to_contact)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(contacts)
    }

    /// Pending contacts whose next attempt is due
    pub fn due_campaign_contacts(&self, campaign_id: i64, now: DateTime<Utc>, limit: i64) -> SqliteResult<Vec<CampaignContact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campaign_contacts
             WHERE campaign_id = ?1 AND status = 'pending' AND next_attempt_at <= ?2
             ORDER BY next_attempt_at, id LIMIT ?3",
            CONTACT_COLUMNS
        ))?;
        let contacts = stmt
            .query_map(rusqlite::params![campaign_id, fmt_ts(now), limit], row_to_contact)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(contacts)
    }

    /// Number of contacts that could still be called (pending or in flight)
    pub fn open_campaign_contacts(&self, campaign_id: i64) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = ?1 AND status IN ('pending', 'calling')",
            [campaign_id],
            |row| row.get(0),
        )
    }

    /// Take a pending contact for dialing: status becomes `calling`, the attempt
    /// is counted and `next_attempt_at` holds the claim time. Returns false when
    /// another dispatch pass claimed it first.
    pub fn claim_contact(&self, contact_id: i64, now: DateTime<Utc>) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE campaign_contacts SET status = 'calling', attempts = attempts + 1, next_attempt_at = ?1,
                retell_call_id = NULL, last_error = NULL
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![fmt_ts(now), contact_id],
        )?;
        Ok(changed == 1)
    }

    /// Remember which Retell call is dialing a claimed contact
    pub fn set_contact_call_id(&self, contact_id: i64, retell_call_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE campaign_contacts SET retell_call_id = ?1 WHERE id = ?2",
            rusqlite::params![retell_call_id, contact_id],
        )?;
        Ok(())
    }

    /// Contacts claimed before `claimed_before` that are still waiting on a call result
    pub fn stale_calling_contacts(&self, campaign_id: i64, claimed_before: DateTime<Utc>) -> SqliteResult<Vec<CampaignContact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campaign_contacts
             WHERE campaign_id = ?1 AND status = 'calling' AND next_attempt_at < ?2
             ORDER BY id",
            CONTACT_COLUMNS
        ))?;
        let contacts = stmt
            .query_map(rusqlite::params![campaign_id, fmt_ts(claimed_before)], row_to_contact)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(contacts)
    }

    /// Set a final status (completed, failed, skipped_dnc)
    pub fn finish_contact(&self, contact_id: i64, status: ContactStatus, error: Option<&str>) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE campaign_contacts SET status = ?1, last_error = COALESCE(?2, last_error) WHERE id = ?3",
            rusqlite::params![status.as_ref(), error, contact_id],
        )?;
        Ok(())
    }

    /// Put a contact back in the queue for a later attempt
    pub fn schedule_contact_retry(&self, contact_id: i64, next_attempt_at: DateTime<Utc>, error: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE campaign_contacts SET status = 'pending', next_attempt_at = ?1, last_error = ?2 WHERE id = ?3",
            rusqlite::params![fmt_ts(next_attempt_at), error, contact_id],
        )?;
        Ok(())
    }

    pub fn get_contact_by_retell_call_id(&self, retell_call_id: &str) -> SqliteResult<Option<CampaignContact>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM campaign_contacts WHERE retell_call_id = ?1", CONTACT_COLUMNS),
            [retell_call_id],
            row_to_contact,
        )
        .optional()
    }

    /// Campaign row for a contact, bypassing the tenant filter (webhook path)
    pub fn get_campaign_by_id(&self, id: i64) -> SqliteResult<Option<Campaign>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLUMNS), [id], row_to_campaign)
            .optional()
    }

    /// Running campaigns across all businesses, for the background dispatcher
    pub fn list_running_campaigns(&self) -> SqliteResult<Vec<Campaign>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campaigns WHERE status = 'running' ORDER BY id",
            CAMPAIGN_COLUMNS
        ))?;
        let campaigns = stmt
            .query_map([], row_to_campaign)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(campaigns)
    }
}
