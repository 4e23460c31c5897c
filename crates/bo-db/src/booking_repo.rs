use crate::inventory_repo::apply_mutation;
use crate::util::{
    decode_enum, encode_enum, from_rfc3339, from_sql_int, store_err, to_rfc3339, to_sql_int,
};
use bo_core::bookings::BookingRepository;
use bo_core::error::StoreError;
use bo_core::types::{
    Booking, BookingId, BookingStatus, Inventory, InventoryId, InventoryMutation, NewBooking,
    PageRequest,
};
use chrono::Utc;
use rusqlite::{Connection, params};

const BOOKING_COLUMNS: &str =
    "id, inventory_id, user_id, ticket_count, status, inventory_version, booked_at, updated_at";

pub struct BookingRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> BookingRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Runs both halves of a paired write under one savepoint so they land
    /// together, whether or not an outer transaction is open.
    fn atomically<T>(
        &self,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.conn
            .execute_batch("SAVEPOINT booking_write")
            .map_err(store_err)?;
        match f() {
            Ok(value) => {
                self.conn
                    .execute_batch("RELEASE booking_write")
                    .map_err(store_err)?;
                Ok(value)
            }
            Err(err) => {
                self.conn
                    .execute_batch("ROLLBACK TO booking_write; RELEASE booking_write")
                    .map_err(store_err)?;
                Err(err)
            }
        }
    }

    fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)");
        self.conn
            .execute(
                &sql,
                params![
                    booking.id.as_str(),
                    booking.inventory_id.as_str(),
                    booking.user_id,
                    booking.ticket_count,
                    encode_enum(&booking.status)?,
                    to_sql_int(booking.inventory_version)?,
                    to_rfc3339(&booking.booked_at),
                    to_rfc3339(&booking.updated_at),
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

impl BookingRepository for BookingRepo<'_> {
    fn get(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let mut rows = stmt.query([id.as_str()]).map_err(store_err)?;
        let Some(row) = rows.next().map_err(store_err)? else {
            return Ok(None);
        };
        map_booking_row(row).map(Some)
    }

    fn list_by_user(&self, user_id: &str, page: PageRequest) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1 ORDER BY booked_at DESC, id DESC LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let mut rows = stmt
            .query(params![user_id, page.limit(), to_sql_int(page.offset())?])
            .map_err(store_err)?;
        let mut bookings = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            bookings.push(map_booking_row(row)?);
        }
        Ok(bookings)
    }

    fn count_by_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM bookings WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(from_sql_int(count)?)
    }

    fn confirmed_tickets(&self, inventory_id: &InventoryId) -> Result<u64, StoreError> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(ticket_count), 0) FROM bookings WHERE inventory_id = ?1 AND status = 'Confirmed'",
                [inventory_id.as_str()],
                |row| row.get(0),
            )
            .map_err(store_err)?;
        Ok(from_sql_int(total)?)
    }

    fn create_and_decrement(
        &self,
        booking: NewBooking,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError> {
        self.atomically(|| {
            let inventory = apply_mutation(
                self.conn,
                &booking.inventory_id,
                expected_version,
                InventoryMutation::Reserve(booking.ticket_count),
            )?;
            let created = Booking {
                id: BookingId::generate(),
                inventory_id: booking.inventory_id,
                user_id: booking.user_id,
                ticket_count: booking.ticket_count,
                status: BookingStatus::Confirmed,
                inventory_version: expected_version,
                booked_at: booking.booked_at,
                updated_at: booking.booked_at,
            };
            self.insert(&created)?;
            Ok((created, inventory))
        })
    }

    fn cancel_and_increment(
        &self,
        id: &BookingId,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError> {
        self.atomically(|| {
            let booking = self.get(id)?.ok_or(StoreError::NotFound)?;
            let now = Utc::now();
            let changed = self
                .conn
                .execute(
                    "UPDATE bookings SET status = 'Cancelled', updated_at = ?2 WHERE id = ?1 AND status = 'Confirmed'",
                    params![id.as_str(), to_rfc3339(&now)],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(StoreError::StatusConflict {
                    expected: BookingStatus::Confirmed,
                    actual: booking.status,
                });
            }
            let inventory = apply_mutation(
                self.conn,
                &booking.inventory_id,
                expected_version,
                InventoryMutation::Release(booking.ticket_count),
            )?;
            let cancelled = Booking {
                status: BookingStatus::Cancelled,
                updated_at: now,
                ..booking
            };
            Ok((cancelled, inventory))
        })
    }
}

fn map_booking_row(row: &rusqlite::Row<'_>) -> Result<Booking, StoreError> {
    let id: String = row.get(0).map_err(store_err)?;
    let inventory_id: String = row.get(1).map_err(store_err)?;
    let user_id: String = row.get(2).map_err(store_err)?;
    let ticket_count: u32 = row.get(3).map_err(store_err)?;
    let status: String = row.get(4).map_err(store_err)?;
    let inventory_version: i64 = row.get(5).map_err(store_err)?;
    let booked_at: String = row.get(6).map_err(store_err)?;
    let updated_at: String = row.get(7).map_err(store_err)?;

    let invalid_id = |err: bo_core::types::IdError| StoreError::Backend {
        message: err.to_string(),
    };
    Ok(Booking {
        id: BookingId::new(id).map_err(invalid_id)?,
        inventory_id: InventoryId::new(inventory_id).map_err(invalid_id)?,
        user_id,
        ticket_count,
        status: decode_enum(&status)?,
        inventory_version: from_sql_int(inventory_version)?,
        booked_at: from_rfc3339(&booked_at)?,
        updated_at: from_rfc3339(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory_repo::InventoryRepo;
    use crate::schema::with_test_db;
    use bo_core::inventories::InventoryRepository;
    use bo_core::types::{BookingWindow, CreateInventoryInput};
    use chrono::Duration;

    fn seed(conn: &Connection, capacity: u32) -> Inventory {
        let now = Utc::now();
        InventoryRepo::new(conn)
            .create(CreateInventoryInput {
                name: "Show".to_string(),
                artist: "Band".to_string(),
                venue: "Hall".to_string(),
                event_date: now + Duration::days(2),
                price_cents: 1000,
                total_capacity: capacity,
                booking_window: BookingWindow::new(
                    now - Duration::hours(1),
                    now + Duration::hours(1),
                ),
            })
            .unwrap()
    }

    fn new_booking(inventory: &Inventory, user_id: &str, count: u32) -> NewBooking {
        NewBooking {
            inventory_id: inventory.id.clone(),
            user_id: user_id.to_string(),
            ticket_count: count,
            booked_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_decrement_writes_both_rows() {
        let conn = with_test_db().unwrap();
        let inventory = seed(&conn, 10);
        let repo = BookingRepo::new(&conn);

        let (booking, updated) = repo
            .create_and_decrement(new_booking(&inventory, "alice", 3), 1)
            .unwrap();

        assert_eq!(updated.available, 7);
        assert_eq!(updated.version, 2);
        assert_eq!(booking.inventory_version, 1);
        assert_eq!(repo.get(&booking.id).unwrap(), Some(booking));
        assert_eq!(repo.confirmed_tickets(&inventory.id).unwrap(), 3);
    }

    #[test]
    fn failed_decrement_inserts_nothing() {
        let conn = with_test_db().unwrap();
        let inventory = seed(&conn, 2);
        let repo = BookingRepo::new(&conn);

        let err = repo
            .create_and_decrement(new_booking(&inventory, "alice", 3), 1)
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientTickets { .. }));
        assert_eq!(repo.count_by_user("alice").unwrap(), 0);
        let err = repo
            .create_and_decrement(new_booking(&inventory, "alice", 1), 7)
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert_eq!(repo.count_by_user("alice").unwrap(), 0);
    }

    #[test]
    fn cancel_returns_tickets_once() {
        let conn = with_test_db().unwrap();
        let inventory = seed(&conn, 10);
        let repo = BookingRepo::new(&conn);
        let (booking, updated) = repo
            .create_and_decrement(new_booking(&inventory, "alice", 4), 1)
            .unwrap();

        let (cancelled, restored) = repo.cancel_and_increment(&booking.id, updated.version).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(restored.available, 10);
        assert_eq!(restored.version, 3);

        let err = repo
            .cancel_and_increment(&booking.id, restored.version)
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::StatusConflict {
                expected: BookingStatus::Confirmed,
                actual: BookingStatus::Cancelled
            }
        );
        let current = InventoryRepo::new(&conn).get(&inventory.id).unwrap().unwrap();
        assert_eq!(current.available, 10);
        assert_eq!(repo.confirmed_tickets(&inventory.id).unwrap(), 0);
    }

    #[test]
    fn stale_cancel_keeps_booking_confirmed() {
        let conn = with_test_db().unwrap();
        let inventory = seed(&conn, 10);
        let repo = BookingRepo::new(&conn);
        let (booking, _) = repo
            .create_and_decrement(new_booking(&inventory, "alice", 4), 1)
            .unwrap();

        let err = repo.cancel_and_increment(&booking.id, 1).unwrap_err();

        assert!(matches!(err, StoreError::VersionConflict { .. }));
        let stored = repo.get(&booking.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[test]
    fn user_listing_is_newest_first() {
        let conn = with_test_db().unwrap();
        let inventory = seed(&conn, 10);
        let repo = BookingRepo::new(&conn);
        let mut older = new_booking(&inventory, "alice", 1);
        older.booked_at = Utc::now() - Duration::minutes(5);
        let (first, after_first) = repo.create_and_decrement(older, 1).unwrap();
        let (second, _) = repo
            .create_and_decrement(new_booking(&inventory, "alice", 1), after_first.version)
            .unwrap();

        let listed = repo
            .list_by_user("alice", PageRequest::normalized(1, 20))
            .unwrap();

        let ids: Vec<_> = listed.iter().map(|b| b.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert!(repo.list_by_user("bob", PageRequest::default()).unwrap().is_empty());
    }
}
