//! Inventory, orders, leads and reservations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use crate::db::{fmt_ts, parse_opt_ts, parse_ts, Database};
use crate::models::{InventoryItem, Lead, NewLead, Order, ReservationSettings};

const ORDER_COLUMNS: &str = "id, business_id, order_number, customer_phone, status, total_cents, estimated_ready_at, created_at";

fn row_to_order(row: &Row) -> SqliteResult<Order> {
    let created_at: String = row.get(7)?;
    Ok(Order {
        id: row.get(0)?,
        business_id: row.get(1)?,
        order_number: row.get(2)?,
        customer_phone: row.get(3)?,
        status: row.get(4)?,
        total_cents: row.get(5)?,
        estimated_ready_at: parse_opt_ts(6, row.get(6)?)?,
        created_at: parse_ts(7, &created_at)?,
    })
}

impl Database {
    /// Case-insensitive search on item name or exact SKU
    pub fn search_inventory(&self, business_id: &str, query: &str, limit: i64) -> SqliteResult<Vec<InventoryItem>> {
        let conn = self.conn.lock().unwrap();
        let needle = query.trim().to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT id, business_id, name, sku, quantity, price_cents FROM inventory_items
             WHERE business_id = ?1 AND (instr(lower(name), ?2) > 0 OR lower(sku) = ?2)
             ORDER BY quantity DESC, name LIMIT ?3",
        )?;
        let items = stmt
            .query_map(rusqlite::params![business_id, &needle, limit], |row| {
                Ok(InventoryItem {
                    id: row.get(0)?,
                    business_id: row.get(1)?,
                    name: row.get(2)?,
                    sku: row.get(3)?,
                    quantity: row.get(4)?,
                    price_cents: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    pub fn insert_inventory_item(
        &self,
        business_id: &str,
        name: &str,
        sku: Option<&str>,
        quantity: i64,
        price_cents: Option<i64>,
    ) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO inventory_items (business_id, name, sku, quantity, price_cents) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![business_id, name, sku, quantity, price_cents],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Order number match ignores a leading '#' and case
    pub fn find_order_by_number(&self, business_id: &str, order_number: &str) -> SqliteResult<Option<Order>> {
        let conn = self.conn.lock().unwrap();
        let cleaned = order_number.trim().trim_start_matches('#').to_uppercase();
        conn.query_row(
            &format!(
                "SELECT {} FROM orders WHERE business_id = ?1 AND upper(ltrim(order_number, '#')) = ?2",
                ORDER_COLUMNS
            ),
            rusqlite::params![business_id, &cleaned],
            row_to_order,
        )
        .optional()
    }

    /// Most recent order for a customer phone
    pub fn latest_order_for_phone(&self, business_id: &str, phone: &str) -> SqliteResult<Option<Order>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM orders WHERE business_id = ?1 AND customer_phone = ?2 ORDER BY created_at DESC, id DESC LIMIT 1",
                ORDER_COLUMNS
            ),
            rusqlite::params![business_id, phone],
            row_to_order,
        )
        .optional()
    }

    pub fn insert_order(
        &self,
        business_id: &str,
        order_number: &str,
        customer_phone: Option<&str>,
        status: &str,
        estimated_ready_at: Option<DateTime<Utc>>,
    ) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO orders (business_id, order_number, customer_phone, status, estimated_ready_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                business_id,
                order_number,
                customer_phone,
                status,
                estimated_ready_at.map(fmt_ts),
                fmt_ts(Utc::now())
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_lead(&self, new: &NewLead) -> SqliteResult<Lead> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO leads (business_id, call_id, name, phone, email, interest, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                &new.business_id,
                new.call_id,
                &new.name,
                &new.phone,
                &new.email,
                &new.interest,
                &new.notes,
                fmt_ts(now)
            ],
        )?;
        Ok(Lead {
            id: conn.last_insert_rowid(),
            business_id: new.business_id.clone(),
            call_id: new.call_id,
            name: new.name.clone(),
            phone: new.phone.clone(),
            email: new.email.clone(),
            interest: new.interest.clone(),
            notes: new.notes.clone(),
            crm_contact_id: None,
            created_at: now,
        })
    }

    pub fn set_lead_crm_contact(&self, lead_id: i64, crm_contact_id: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE leads SET crm_contact_id = ?1 WHERE id = ?2",
            rusqlite::params![crm_contact_id, lead_id],
        )?;
        Ok(())
    }

    pub fn get_reservation_settings(&self, business_id: &str) -> SqliteResult<Option<ReservationSettings>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT business_id, total_capacity, max_party_size, duration_minutes FROM reservation_settings WHERE business_id = ?1",
            [business_id],
            |row| {
                Ok(ReservationSettings {
                    business_id: row.get(0)?,
                    total_capacity: row.get(1)?,
                    max_party_size: row.get(2)?,
                    duration_minutes: row.get(3)?,
                })
            },
        )
        .optional()
    }

    pub fn upsert_reservation_settings(&self, settings: &ReservationSettings) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reservation_settings (business_id, total_capacity, max_party_size, duration_minutes)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(business_id) DO UPDATE SET
                total_capacity = excluded.total_capacity,
                max_party_size = excluded.max_party_size,
                duration_minutes = excluded.duration_minutes",
            rusqlite::params![
                &settings.business_id,
                settings.total_capacity,
                settings.max_party_size,
                settings.duration_minutes
            ],
        )?;
        Ok(())
    }

    /// Total guests in confirmed reservations overlapping [start, end)
    pub fn reserved_guests_between(&self, business_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(SUM(party_size), 0) FROM reservations
             WHERE business_id = ?1 AND status = 'confirmed' AND reserved_at < ?3 AND ends_at > ?2",
            rusqlite::params![business_id, fmt_ts(start), fmt_ts(end)],
            |row| row.get(0),
        )
    }

    pub fn insert_reservation(
        &self,
        business_id: &str,
        customer_name: &str,
        customer_phone: Option<&str>,
        party_size: i64,
        reserved_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reservations (business_id, customer_name, customer_phone, party_size, reserved_at, ends_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![business_id, customer_name, customer_phone, party_size, fmt_ts(reserved_at), fmt_ts(ends_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateBusinessRequest;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Database, String) {
        let db = Database::new(":memory:").unwrap();
        let business = db
            .create_business(&CreateBusinessRequest {
                name: "Shop".to_string(),
                phone_number: None,
                owner_phone: None,
                owner_email: None,
                timezone: None,
            })
            .unwrap();
        (db, business.id)
    }

    #[test]
    fn test_order_number_lookup_is_forgiving() {
        let (db, business_id) = setup();
        db.insert_order(&business_id, "#A1042", Some("+15551234567"), "preparing", None).unwrap();

        assert!(db.find_order_by_number(&business_id, "a1042").unwrap().is_some());
        assert!(db.find_order_by_number(&business_id, "#A1042").unwrap().is_some());
        assert!(db.find_order_by_number(&business_id, "A1043").unwrap().is_none());
        assert!(db.latest_order_for_phone(&business_id, "+15551234567").unwrap().is_some());
    }

    #[test]
    fn test_inventory_search() {
        let (db, business_id) = setup();
        db.insert_inventory_item(&business_id, "Blue Widget", Some("BW-1"), 4, Some(999)).unwrap();
        db.insert_inventory_item(&business_id, "Red Widget", None, 0, None).unwrap();

        assert_eq!(db.search_inventory(&business_id, "widget", 5).unwrap().len(), 2);
        assert_eq!(db.search_inventory(&business_id, "bw-1", 5).unwrap()[0].name, "Blue Widget");
        assert!(db.search_inventory("other", "widget", 5).unwrap().is_empty());
    }

    #[test]
    fn test_reserved_guests_overlap() {
        let (db, business_id) = setup();
        let seven = Utc.with_ymd_and_hms(2030, 6, 1, 19, 0, 0).unwrap();
        db.insert_reservation(&business_id, "Lee", None, 4, seven, seven + Duration::minutes(90)).unwrap();
        db.insert_reservation(&business_id, "Kim", None, 2, seven + Duration::hours(2), seven + Duration::hours(3)).unwrap();

        // 20:00-21:30 overlaps both parties
        let guests = db
            .reserved_guests_between(&business_id, seven + Duration::minutes(60), seven + Duration::minutes(150))
            .unwrap();
        assert_eq!(guests, 6);

        // 20:30-21:00 only touches Lee's end and Kim's start
        let guests = db
            .reserved_guests_between(&business_id, seven + Duration::minutes(90), seven + Duration::hours(2))
            .unwrap();
        assert_eq!(guests, 0);
    }
}
