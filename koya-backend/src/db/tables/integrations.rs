//! Calendar, CRM and payment account connections

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult};

use crate::db::{fmt_ts, parse_enum, parse_opt_ts, Database};
use crate::models::{CalendarIntegration, CrmIntegration, CrmProviderKind, OAuthTokens, PaymentAccount};

impl Database {
    pub fn get_calendar_integration(&self, business_id: &str) -> SqliteResult<Option<CalendarIntegration>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT business_id, provider, calendar_id, access_token, refresh_token, expires_at
             FROM calendar_integrations WHERE business_id = ?1",
            [business_id],
            |row| {
                let provider: String = row.get(1)?;
                Ok(CalendarIntegration {
                    business_id: row.get(0)?,
                    provider: parse_enum(1, &provider)?,
                    calendar_id: row.get(2)?,
                    tokens: OAuthTokens {
                        access_token: row.get(3)?,
                        refresh_token: row.get(4)?,
                        expires_at: parse_opt_ts(5, row.get(5)?)?,
                    },
                })
            },
        )
        .optional()
    }

    pub fn upsert_calendar_integration(&self, integration: &CalendarIntegration) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO calendar_integrations (business_id, provider, calendar_id, access_token, refresh_token, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(business_id) DO UPDATE SET
                provider = excluded.provider,
                calendar_id = excluded.calendar_id,
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, refresh_token),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            rusqlite::params![
                &integration.business_id,
                integration.provider.as_ref(),
                &integration.calendar_id,
                &integration.tokens.access_token,
                &integration.tokens.refresh_token,
                integration.tokens.expires_at.map(fmt_ts),
                fmt_ts(Utc::now())
            ],
        )?;
        Ok(())
    }

    pub fn update_calendar_tokens(&self, business_id: &str, tokens: &OAuthTokens) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE calendar_integrations SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token), expires_at = ?3, updated_at = ?4
             WHERE business_id = ?5",
            rusqlite::params![
                &tokens.access_token,
                &tokens.refresh_token,
                tokens.expires_at.map(fmt_ts),
                fmt_ts(Utc::now()),
                business_id
            ],
        )?;
        Ok(())
    }

    pub fn get_crm_integration(&self, business_id: &str, provider: CrmProviderKind) -> SqliteResult<Option<CrmIntegration>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT business_id, provider, access_token, refresh_token, expires_at
             FROM crm_integrations WHERE business_id = ?1 AND provider = ?2",
            rusqlite::params![business_id, provider.as_ref()],
            |row| {
                let provider: String = row.get(1)?;
                Ok(CrmIntegration {
                    business_id: row.get(0)?,
                    provider: parse_enum(1, &provider)?,
                    tokens: OAuthTokens {
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        expires_at: parse_opt_ts(4, row.get(4)?)?,
                    },
                })
            },
        )
        .optional()
    }

    pub fn upsert_crm_tokens(&self, business_id: &str, provider: CrmProviderKind, tokens: &OAuthTokens) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crm_integrations (business_id, provider, access_token, refresh_token, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(business_id, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, refresh_token),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            rusqlite::params![
                business_id,
                provider.as_ref(),
                &tokens.access_token,
                &tokens.refresh_token,
                tokens.expires_at.map(fmt_ts),
                fmt_ts(Utc::now())
            ],
        )?;
        Ok(())
    }

    pub fn get_payment_account(&self, business_id: &str) -> SqliteResult<Option<PaymentAccount>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT business_id, stripe_account_id, charges_enabled FROM payment_accounts WHERE business_id = ?1",
            [business_id],
            |row| {
                Ok(PaymentAccount {
                    business_id: row.get(0)?,
                    stripe_account_id: row.get(1)?,
                    charges_enabled: row.get::<_, i64>(2)? != 0,
                })
            },
        )
        .optional()
    }

    pub fn upsert_payment_account(&self, account: &PaymentAccount) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO payment_accounts (business_id, stripe_account_id, charges_enabled, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(business_id) DO UPDATE SET
                stripe_account_id = excluded.stripe_account_id,
                charges_enabled = excluded.charges_enabled,
                updated_at = excluded.updated_at",
            rusqlite::params![
                &account.business_id,
                &account.stripe_account_id,
                account.charges_enabled as i64,
                fmt_ts(Utc::now())
            ],
        )?;
        Ok(())
    }
}
