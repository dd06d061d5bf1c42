//! API keys and dashboard sessions

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{fmt_ts, parse_opt_ts, parse_ts, Database};
use crate::models::{ApiKey, AuthSession};

const API_KEY_COLUMNS: &str = "id, business_id, name, key_prefix, key_hash, last_used_at, revoked_at, created_at";

fn row_to_api_key(row: &Row) -> SqliteResult<ApiKey> {
    let created_at: String = row.get(7)?;
    Ok(ApiKey {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        key_prefix: row.get(3)?,
        key_hash: row.get(4)?,
        last_used_at: parse_opt_ts(5, row.get(5)?)?,
        revoked_at: parse_opt_ts(6, row.get(6)?)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

impl Database {
    pub fn insert_api_key(&self, business_id: &str, name: &str, key_prefix: &str, key_hash: &str) -> SqliteResult<ApiKey> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_keys (business_id, name, key_prefix, key_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![business_id, name, key_prefix, key_hash, fmt_ts(Utc::now())],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(&format!("SELECT {} FROM api_keys WHERE id = ?1", API_KEY_COLUMNS), [id], row_to_api_key)
    }

    pub fn list_api_keys(&self, business_id: &str) -> SqliteResult<Vec<ApiKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM api_keys WHERE business_id = ?1 ORDER BY created_at DESC, id DESC",
            API_KEY_COLUMNS
        ))?;
        let keys = stmt
            .query_map([business_id], row_to_api_key)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(keys)
    }

    /// Resolve an active (non-revoked) key by hash and stamp its last use
    pub fn find_active_api_key(&self, key_hash: &str) -> SqliteResult<Option<ApiKey>> {
        let conn = self.conn.lock().unwrap();
        let key = conn
            .query_row(
                &format!("SELECT {} FROM api_keys WHERE key_hash = ?1 AND revoked_at IS NULL", API_KEY_COLUMNS),
                [key_hash],
                row_to_api_key,
            )
            .optional()?;
        if let Some(k) = &key {
            conn.execute(
                "UPDATE api_keys SET last_used_at = ?1 WHERE id = ?2",
                rusqlite::params![fmt_ts(Utc::now()), k.id],
            )?;
        }
        Ok(key)
    }

    pub fn revoke_api_key(&self, business_id: &str, id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE api_keys SET revoked_at = ?1 WHERE business_id = ?2 AND id = ?3 AND revoked_at IS NULL",
            rusqlite::params![fmt_ts(Utc::now()), business_id, id],
        )?;
        Ok(updated > 0)
    }

    pub fn create_session(&self, token: &str, business_id: &str, expires_at: DateTime<Utc>) -> SqliteResult<AuthSession> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO auth_sessions (token, business_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![token, business_id, fmt_ts(now), fmt_ts(expires_at)],
        )?;
        Ok(AuthSession {
            token: token.to_string(),
            business_id: business_id.to_string(),
            created_at: now,
            expires_at,
        })
    }

    /// Return the session if the token exists and hasn't expired
    pub fn validate_session(&self, token: &str) -> SqliteResult<Option<AuthSession>> {
        let conn = self.conn.lock().unwrap();
        let now = fmt_ts(Utc::now());
        conn.query_row(
            "SELECT token, business_id, created_at, expires_at FROM auth_sessions WHERE token = ?1 AND expires_at > ?2",
            rusqlite::params![token, &now],
            |row| {
                let created_at: String = row.get(2)?;
                let expires_at: String = row.get(3)?;
                Ok(AuthSession {
                    token: row.get(0)?,
                    business_id: row.get(1)?,
                    created_at: parse_ts(2, &created_at)?,
                    expires_at: parse_ts(3, &expires_at)?,
                })
            },
        )
        .optional()
    }

    pub fn delete_session(&self, token: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM auth_sessions WHERE token = ?1", [token])?;
        Ok(deleted > 0)
    }

    /// Drop expired sessions, returning how many were removed
    pub fn purge_expired_sessions(&self) -> SqliteResult<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM auth_sessions WHERE expires_at <= ?1", [fmt_ts(Utc::now())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateBusinessRequest;
    use chrono::Duration;

    fn setup() -> (Database, String) {
        let db = Database::new(":memory:").unwrap();
        let business = db
            .create_business(&CreateBusinessRequest {
                name: "Auth Test".to_string(),
                phone_number: None,
                owner_phone: None,
                owner_email: None,
                timezone: None,
            })
            .unwrap();
        (db, business.id)
    }

    #[test]
    fn test_revoked_keys_do_not_resolve() {
        let (db, business_id) = setup();
        let key = db.insert_api_key(&business_id, "zapier", "koya_abcd", "hash-1").unwrap();

        let found = db.find_active_api_key("hash-1").unwrap().unwrap();
        assert_eq!(found.business_id, business_id);

        assert!(!db.revoke_api_key("other", key.id).unwrap());
        assert!(db.revoke_api_key(&business_id, key.id).unwrap());
        assert!(db.find_active_api_key("hash-1").unwrap().is_none());
        // Revoking twice is a no-op
        assert!(!db.revoke_api_key(&business_id, key.id).unwrap());
    }

    #[test]
    fn test_expired_sessions_are_invalid() {
        let (db, business_id) = setup();
        db.create_session("live", &business_id, Utc::now() + Duration::hours(1)).unwrap();
        db.create_session("stale", &business_id, Utc::now() - Duration::hours(1)).unwrap();

        assert!(db.validate_session("live").unwrap().is_some());
        assert!(db.validate_session("stale").unwrap().is_none());
        assert_eq!(db.purge_expired_sessions().unwrap(), 1);

        assert!(db.delete_session("live").unwrap());
        assert!(db.validate_session("live").unwrap().is_none());
    }
}
