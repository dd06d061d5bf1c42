//! Bookable services

use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::Database;
use crate::models::Service;

fn row_to_service(row: &Row) -> SqliteResult<Service> {
    Ok(Service {
        id: row.get(0)?,
        business_id: row.get(1)?,
        name: row.get(2)?,
        duration_minutes: row.get(3)?,
        price_cents: row.get(4)?,
    })
}

impl Database {
    pub fn list_services(&self, business_id: &str) -> SqliteResult<Vec<Service>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, business_id, name, duration_minutes, price_cents FROM services WHERE business_id = ?1 ORDER BY name",
        )?;
        let services = stmt
            .query_map([business_id], row_to_service)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(services)
    }

    /// Find a service by what the caller said: exact name first, then a substring match
    pub fn find_service_by_name(&self, business_id: &str, name: &str) -> SqliteResult<Option<Service>> {
        let conn = self.conn.lock().unwrap();
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let exact = conn
            .query_row(
                "SELECT id, business_id, name, duration_minutes, price_cents FROM services
                 WHERE business_id = ?1 AND lower(name) = ?2",
                rusqlite::params![business_id, &needle],
                row_to_service,
            )
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        conn.query_row(
            "SELECT id, business_id, name, duration_minutes, price_cents FROM services
             WHERE business_id = ?1 AND (instr(lower(name), ?2) > 0 OR instr(?2, lower(name)) > 0)
             ORDER BY length(name) LIMIT 1",
            rusqlite::params![business_id, &needle],
            row_to_service,
        )
        .optional()
    }

    pub fn create_service(
        &self,
        business_id: &str,
        name: &str,
        duration_minutes: i64,
        price_cents: Option<i64>,
    ) -> SqliteResult<Service> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO services (business_id, name, duration_minutes, price_cents) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![business_id, name, duration_minutes, price_cents],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, business_id, name, duration_minutes, price_cents FROM services WHERE id = ?1",
            [id],
            row_to_service,
        )
    }

    pub fn delete_service(&self, business_id: &str, id: i64) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM services WHERE business_id = ?1 AND id = ?2",
            rusqlite::params![business_id, id],
        )?;
        Ok(deleted > 0)
    }
}
