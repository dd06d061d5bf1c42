//! Appointment database operations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result as SqliteResult, Row, TransactionBehavior};

use crate::db::{fmt_ts, parse_enum, parse_ts, Database};
use crate::models::{Appointment, AppointmentStatus, NewAppointment};

const APPOINTMENT_COLUMNS: &str = "id, business_id, call_id, service_id, service_name, customer_name, customer_phone, customer_email, scheduled_at, ends_at, duration_minutes, status, notes, created_at, updated_at";

fn row_to_appointment(row: &Row) -> SqliteResult<Appointment> {
    let scheduled_at: String = row.get(8)?;
    let ends_at: String = row.get(9)?;
    let status: String = row.get(11)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;
    Ok(Appointment {
        id: row.get(0)?,
        business_id: row.get(1)?,
        call_id: row.get(2)?,
        service_id: row.get(3)?,
        service_name: row.get(4)?,
        customer_name: row.get(5)?,
        customer_phone: row.get(6)?,
        customer_email: row.get(7)?,
        scheduled_at: parse_ts(8, &scheduled_at)?,
        ends_at: parse_ts(9, &ends_at)?,
        duration_minutes: row.get(10)?,
        status: parse_enum(11, &status)?,
        notes: row.get(12)?,
        created_at: parse_ts(13, &created_at)?,
        updated_at: parse_ts(14, &updated_at)?,
    })
}

/// Result of an atomic conflict-checked insert
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Appointment),
    /// Another confirmed appointment overlaps the requested interval
    Conflict(Appointment),
}

/// Dashboard list filters
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl Database {
    /// Confirmed appointments overlapping [start, end)
    pub fn confirmed_appointments_between(
        &self,
        business_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SqliteResult<Vec<Appointment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM appointments
             WHERE business_id = ?1 AND status = 'confirmed' AND scheduled_at < ?3 AND ends_at > ?2
             ORDER BY scheduled_at",
            APPOINTMENT_COLUMNS
        ))?;
        let appointments = stmt
            .query_map(rusqlite::params![business_id, fmt_ts(start), fmt_ts(end)], row_to_appointment)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(appointments)
    }

    /// Insert an appointment unless a confirmed one overlaps it.
    /// The overlap check and the insert run in one immediate transaction under the
    /// connection lock, so two bookings for the same slot cannot both succeed.
    pub fn insert_appointment_if_free(&self, new: &NewAppointment) -> SqliteResult<InsertOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let start = fmt_ts(new.scheduled_at);
        let end = fmt_ts(new.ends_at());

        let conflict = tx
            .query_row(
                &format!(
                    "SELECT {} FROM appointments
                     WHERE business_id = ?1 AND status = 'confirmed' AND scheduled_at < ?3 AND ends_at > ?2
                     ORDER BY scheduled_at LIMIT 1",
                    APPOINTMENT_COLUMNS
                ),
                rusqlite::params![&new.business_id, &start, &end],
                row_to_appointment,
            )
            .optional()?;

        if let Some(existing) = conflict {
            return Ok(InsertOutcome::Conflict(existing));
        }

        let now = fmt_ts(Utc::now());
        tx.execute(
            "INSERT INTO appointments (business_id, call_id, service_id, service_name, customer_name, customer_phone, customer_email, scheduled_at, ends_at, duration_minutes, status, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'confirmed', ?11, ?12, ?12)",
            rusqlite::params![
                &new.business_id,
                new.call_id,
                new.service_id,
                &new.service_name,
                &new.customer_name,
                &new.customer_phone,
                &new.customer_email,
                &start,
                &end,
                new.duration_minutes,
                &new.notes,
                &now
            ],
        )?;
        let id = tx.last_insert_rowid();
        let appointment = tx.query_row(
            &format!("SELECT {} FROM appointments WHERE id = ?1", APPOINTMENT_COLUMNS),
            [id],
            row_to_appointment,
        )?;
        tx.commit()?;

        Ok(InsertOutcome::Inserted(appointment))
    }

    pub fn get_appointment(&self, business_id: &str, id: i64) -> SqliteResult<Option<Appointment>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM appointments WHERE business_id = ?1 AND id = ?2", APPOINTMENT_COLUMNS),
            rusqlite::params![business_id, id],
            row_to_appointment,
        )
        .optional()
    }

    pub fn list_appointments(&self, business_id: &str, filter: &AppointmentFilter) -> SqliteResult<Vec<Appointment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM appointments
             WHERE business_id = ?1
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR scheduled_at >= ?3)
               AND (?4 IS NULL OR scheduled_at < ?4)
             ORDER BY scheduled_at
             LIMIT ?5",
            APPOINTMENT_COLUMNS
        ))?;
        let appointments = stmt
            .query_map(
                rusqlite::params![
                    business_id,
                    filter.status.map(|s| s.as_ref().to_string()),
                    filter.from.map(fmt_ts),
                    filter.to.map(fmt_ts),
                    filter.limit.unwrap_or(200)
                ],
                row_to_appointment,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(appointments)
    }

    /// Next confirmed appointment for a caller, optionally restricted to [from, to)
    pub fn next_appointment_for_phone(
        &self,
        business_id: &str,
        phone: &str,
        from: DateTime<Utc>,
        to: Option<DateTime<Utc>>,
    ) -> SqliteResult<Option<Appointment>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM appointments
                 WHERE business_id = ?1 AND customer_phone = ?2 AND status = 'confirmed'
                   AND scheduled_at >= ?3 AND (?4 IS NULL OR scheduled_at < ?4)
                 ORDER BY scheduled_at LIMIT 1",
                APPOINTMENT_COLUMNS
            ),
            rusqlite::params![business_id, phone, fmt_ts(from), to.map(fmt_ts)],
            row_to_appointment,
        )
        .optional()
    }

    /// Set the status of an appointment. Returns None if it does not belong to the business.
    pub fn update_appointment_status(
        &self,
        business_id: &str,
        id: i64,
        status: AppointmentStatus,
    ) -> SqliteResult<Option<Appointment>> {
        let updated = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE business_id = ?3 AND id = ?4",
                rusqlite::params![status.as_ref(), fmt_ts(Utc::now()), business_id, id],
            )?
        };
        if updated == 0 {
            return Ok(None);
        }
        self.get_appointment(business_id, id)
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
                name: "Test Salon".to_string(),
                phone_number: Some("+15550100000".to_string()),
                owner_phone: None,
                owner_email: None,
                timezone: Some("UTC".to_string()),
            })
            .unwrap();
        (db, business.id)
    }

    fn new_appt(business_id: &str, start: DateTime<Utc>, minutes: i64) -> NewAppointment {
        NewAppointment {
            business_id: business_id.to_string(),
            call_id: None,
            service_id: None,
            service_name: Some("Haircut".to_string()),
            customer_name: "Jane Doe".to_string(),
            customer_phone: Some("+15551234567".to_string()),
            customer_email: None,
            scheduled_at: start,
            duration_minutes: minutes,
            notes: None,
        }
    }

    #[test]
    fn test_overlapping_insert_is_rejected() {
        let (db, business_id) = setup();
        let ten = Utc.with_ymd_and_hms(2030, 3, 5, 10, 0, 0).unwrap();

        assert!(matches!(
            db.insert_appointment_if_free(&new_appt(&business_id, ten, 60)).unwrap(),
            InsertOutcome::Inserted(_)
        ));
        // 10:30 overlaps 10:00-11:00
        assert!(matches!(
            db.insert_appointment_if_free(&new_appt(&business_id, ten + Duration::minutes(30), 30)).unwrap(),
            InsertOutcome::Conflict(_)
        ));
        // 11:00 touches but does not overlap
        assert!(matches!(
            db.insert_appointment_if_free(&new_appt(&business_id, ten + Duration::minutes(60), 30)).unwrap(),
            InsertOutcome::Inserted(_)
        ));
    }

    #[test]
    fn test_cancelled_appointments_free_the_slot() {
        let (db, business_id) = setup();
        let ten = Utc.with_ymd_and_hms(2030, 3, 5, 10, 0, 0).unwrap();

        let first = match db.insert_appointment_if_free(&new_appt(&business_id, ten, 60)).unwrap() {
            InsertOutcome::Inserted(a) => a,
            other => panic!("unexpected {:?}", other),
        };
        db.update_appointment_status(&business_id, first.id, AppointmentStatus::Cancelled).unwrap();

        assert!(matches!(
            db.insert_appointment_if_free(&new_appt(&business_id, ten, 60)).unwrap(),
            InsertOutcome::Inserted(_)
        ));
    }

    #[test]
    fn test_tenant_isolation() {
        let (db, business_id) = setup();
        let other = db
            .create_business(&CreateBusinessRequest {
                name: "Other".to_string(),
                phone_number: Some("+15550200000".to_string()),
                owner_phone: None,
                owner_email: None,
                timezone: None,
            })
            .unwrap();
        let ten = Utc.with_ymd_and_hms(2030, 3, 5, 10, 0, 0).unwrap();

        let appt = match db.insert_appointment_if_free(&new_appt(&business_id, ten, 60)).unwrap() {
            InsertOutcome::Inserted(a) => a,
            other => panic!("unexpected {:?}", other),
        };
        // Same slot is free for a different business
        assert!(matches!(
            db.insert_appointment_if_free(&new_appt(&other.id, ten, 60)).unwrap(),
            InsertOutcome::Inserted(_)
        ));

        assert!(db.get_appointment(&other.id, appt.id).unwrap().is_none());
        assert!(db
            .update_appointment_status(&other.id, appt.id, AppointmentStatus::Cancelled)
            .unwrap()
            .is_none());
        assert_eq!(db.list_appointments(&business_id, &AppointmentFilter::default()).unwrap().len(), 1);
        assert_eq!(
            db.confirmed_appointments_between(&business_id, ten, ten + Duration::hours(1)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_next_appointment_for_phone() {
        let (db, business_id) = setup();
        let day = Utc.with_ymd_and_hms(2030, 3, 5, 9, 0, 0).unwrap();
        db.insert_appointment_if_free(&new_appt(&business_id, day + Duration::hours(5), 30)).unwrap();
        db.insert_appointment_if_free(&new_appt(&business_id, day + Duration::hours(2), 30)).unwrap();

        let next = db
            .next_appointment_for_phone(&business_id, "+15551234567", day, None)
            .unwrap()
            .unwrap();
        assert_eq!(next.scheduled_at, day + Duration::hours(2));
        assert!(db.next_appointment_for_phone(&business_id, "+15550000000", day, None).unwrap().is_none());
    }
}
