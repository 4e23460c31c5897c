use crate::util::{from_rfc3339, from_sql_int, store_err, to_rfc3339, to_sql_int};
use bo_core::error::StoreError;
use bo_core::inventories::InventoryRepository;
use bo_core::types::{
    BookingWindow, CreateInventoryInput, Inventory, InventoryDetails, InventoryFilter,
    InventoryId, InventoryMutation, PageRequest, fold_case,
};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};

const INVENTORY_COLUMNS: &str = "id, name, artist, venue, event_date, price_cents, total_capacity, available, booking_window_start, booking_window_end, version, created_at, updated_at";

pub struct InventoryRepo<'a> {
    pub conn: &'a Connection,
}

impl<'a> InventoryRepo<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl InventoryRepository for InventoryRepo<'_> {
    fn create(&self, input: CreateInventoryInput) -> Result<Inventory, StoreError> {
        let now = Utc::now();
        let inventory = Inventory {
            id: InventoryId::generate(),
            name: input.name,
            artist: input.artist,
            venue: input.venue,
            event_date: input.event_date,
            price_cents: input.price_cents,
            total_capacity: input.total_capacity,
            available: input.total_capacity,
            booking_window: input.booking_window,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let sql = format!(
            "INSERT INTO inventories ({INVENTORY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        );
        self.conn
            .execute(
                &sql,
                params![
                    inventory.id.as_str(),
                    inventory.name,
                    inventory.artist,
                    inventory.venue,
                    to_rfc3339(&inventory.event_date),
                    to_sql_int(inventory.price_cents)?,
                    inventory.total_capacity,
                    inventory.available,
                    to_rfc3339(&inventory.booking_window.start),
                    to_rfc3339(&inventory.booking_window.end),
                    to_sql_int(inventory.version)?,
                    to_rfc3339(&inventory.created_at),
                    to_rfc3339(&inventory.updated_at),
                ],
            )
            .map_err(store_err)?;

        Ok(inventory)
    }

    fn get(&self, id: &InventoryId) -> Result<Option<Inventory>, StoreError> {
        load(self.conn, id)
    }

    fn get_for_update(&self, id: &InventoryId) -> Result<Inventory, StoreError> {
        load(self.conn, id)?.ok_or(StoreError::NotFound)
    }

    fn conditional_update(
        &self,
        id: &InventoryId,
        expected_version: u64,
        details: InventoryDetails,
    ) -> Result<Inventory, StoreError> {
        apply_mutation(self.conn, id, expected_version, InventoryMutation::Details(details))
    }

    fn list(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> Result<Vec<Inventory>, StoreError> {
        let (clause, mut args) = filter_clause(filter);
        args.push(Value::Integer(i64::from(page.limit())));
        args.push(Value::Integer(to_sql_int(page.offset())?));
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventories{clause} ORDER BY event_date, id LIMIT ? OFFSET ?"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err)?;
        let mut rows = stmt.query(params_from_iter(args)).map_err(store_err)?;
        let mut inventories = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            inventories.push(map_inventory_row(row)?);
        }
        Ok(inventories)
    }

    fn count(&self, filter: &InventoryFilter) -> Result<u64, StoreError> {
        let (clause, args) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM inventories{clause}");
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(args), |row| row.get(0))
            .map_err(store_err)?;
        Ok(from_sql_int(count)?)
    }
}

pub(crate) fn load(conn: &Connection, id: &InventoryId) -> Result<Option<Inventory>, StoreError> {
    let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventories WHERE id = ?1");
    let mut stmt = conn.prepare(&sql).map_err(store_err)?;
    let mut rows = stmt.query([id.as_str()]).map_err(store_err)?;
    let Some(row) = rows.next().map_err(store_err)? else {
        return Ok(None);
    };
    map_inventory_row(row).map(Some)
}

/// Version-guarded write. Every guard lives in the `WHERE` clause, so a zero
/// row count means some guard failed; the row is then re-read to report which.
pub(crate) fn apply_mutation(
    conn: &Connection,
    id: &InventoryId,
    expected_version: u64,
    mutation: InventoryMutation,
) -> Result<Inventory, StoreError> {
    let now = to_rfc3339(&Utc::now());
    let version = to_sql_int(expected_version)?;
    let changed = match &mutation {
        InventoryMutation::Reserve(count) => conn.execute(
            "UPDATE inventories SET available = available - ?3, version = version + 1, updated_at = ?4 WHERE id = ?1 AND version = ?2 AND available >= ?3",
            params![id.as_str(), version, count, now],
        ),
        InventoryMutation::Release(count) => conn.execute(
            "UPDATE inventories SET available = available + ?3, version = version + 1, updated_at = ?4 WHERE id = ?1 AND version = ?2 AND available + ?3 <= total_capacity",
            params![id.as_str(), version, count, now],
        ),
        InventoryMutation::Details(details) => update_details(conn, id, version, details, &now),
    }
    .map_err(store_err)?;

    if changed == 1 {
        return load(conn, id)?.ok_or(StoreError::NotFound);
    }

    let current = load(conn, id)?.ok_or(StoreError::NotFound)?;
    if current.version != expected_version {
        return Err(StoreError::VersionConflict {
            expected: expected_version,
            actual: current.version,
        });
    }
    match mutation {
        InventoryMutation::Reserve(count) => Err(StoreError::InsufficientTickets {
            requested: count,
            available: current.available,
        }),
        InventoryMutation::Release(count) => Err(StoreError::CapacityExceeded {
            released: count,
            available: current.available,
            total_capacity: current.total_capacity,
        }),
        InventoryMutation::Details(_) => Err(StoreError::Backend {
            message: format!("inventory {id} was not updated"),
        }),
    }
}

fn update_details(
    conn: &Connection,
    id: &InventoryId,
    version: i64,
    details: &InventoryDetails,
    now: &str,
) -> rusqlite::Result<usize> {
    let price = details
        .price_cents
        .map(i64::try_from)
        .transpose()
        .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
    conn.execute(
        "UPDATE inventories SET
            name = COALESCE(?3, name),
            artist = COALESCE(?4, artist),
            venue = COALESCE(?5, venue),
            event_date = COALESCE(?6, event_date),
            price_cents = COALESCE(?7, price_cents),
            booking_window_start = COALESCE(?8, booking_window_start),
            booking_window_end = COALESCE(?9, booking_window_end),
            version = version + 1,
            updated_at = ?10
         WHERE id = ?1 AND version = ?2",
        params![
            id.as_str(),
            version,
            details.name,
            details.artist,
            details.venue,
            details.event_date.map(|value| to_rfc3339(&value)),
            price,
            details.booking_window.map(|window| to_rfc3339(&window.start)),
            details.booking_window.map(|window| to_rfc3339(&window.end)),
            now,
        ],
    )
}

fn filter_clause(filter: &InventoryFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();
    for (column, needle) in [
        ("name", &filter.name),
        ("artist", &filter.artist),
        ("venue", &filter.venue),
    ] {
        if let Some(needle) = needle {
            conditions.push(format!("instr(fold_case({column}), ?) > 0"));
            args.push(Value::Text(fold_case(needle)));
        }
    }
    if let Some(from) = filter.event_from {
        conditions.push("event_date >= ?".to_string());
        args.push(Value::Text(to_rfc3339(&from)));
    }
    if let Some(to) = filter.event_to {
        conditions.push("event_date <= ?".to_string());
        args.push(Value::Text(to_rfc3339(&to)));
    }
    if filter.available_only {
        conditions.push("available > 0".to_string());
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

fn map_inventory_row(row: &rusqlite::Row<'_>) -> Result<Inventory, StoreError> {
    let id: String = row.get(0).map_err(store_err)?;
    let name: String = row.get(1).map_err(store_err)?;
    let artist: String = row.get(2).map_err(store_err)?;
    let venue: String = row.get(3).map_err(store_err)?;
    let event_date: String = row.get(4).map_err(store_err)?;
    let price_cents: i64 = row.get(5).map_err(store_err)?;
    let total_capacity: u32 = row.get(6).map_err(store_err)?;
    let available: u32 = row.get(7).map_err(store_err)?;
    let window_start: String = row.get(8).map_err(store_err)?;
    let window_end: String = row.get(9).map_err(store_err)?;
    let version: i64 = row.get(10).map_err(store_err)?;
    let created_at: String = row.get(11).map_err(store_err)?;
    let updated_at: String = row.get(12).map_err(store_err)?;

    Ok(Inventory {
        id: InventoryId::new(id).map_err(|err| StoreError::Backend {
            message: err.to_string(),
        })?,
        name,
        artist,
        venue,
        event_date: from_rfc3339(&event_date)?,
        price_cents: from_sql_int(price_cents)?,
        total_capacity,
        available,
        booking_window: BookingWindow::new(from_rfc3339(&window_start)?, from_rfc3339(&window_end)?),
        version: from_sql_int(version)?,
        created_at: from_rfc3339(&created_at)?,
        updated_at: from_rfc3339(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking_repo::BookingRepo;
    use crate::schema::with_test_db;
    use bo_core::bookings::BookingRepository;
    use bo_core::types::NewBooking;
    use chrono::Duration;

    fn input(name: &str, artist: &str, days: i64, capacity: u32) -> CreateInventoryInput {
        let now = Utc::now();
        CreateInventoryInput {
            name: name.to_string(),
            artist: artist.to_string(),
            venue: "Hall".to_string(),
            event_date: now + Duration::days(days),
            price_cents: 5000,
            total_capacity: capacity,
            booking_window: BookingWindow::new(now - Duration::hours(1), now + Duration::hours(1)),
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        let created = repo.create(input("Show", "Band", 3, 20)).unwrap();

        let loaded = repo.get(&created.id).unwrap().unwrap();

        assert_eq!(loaded, created);
        assert_eq!(loaded.available, 20);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn reserve_reports_which_guard_failed() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        let created = repo.create(input("Show", "Band", 3, 5)).unwrap();

        let err = apply_mutation(repo.conn, &created.id, 1, InventoryMutation::Reserve(6))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::InsufficientTickets {
                requested: 6,
                available: 5
            }
        );

        let updated = apply_mutation(repo.conn, &created.id, 1, InventoryMutation::Reserve(2))
            .unwrap();
        assert_eq!(updated.available, 3);
        assert_eq!(updated.version, 2);

        let err = apply_mutation(repo.conn, &created.id, 1, InventoryMutation::Reserve(1))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn release_cannot_exceed_capacity() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        let created = repo.create(input("Show", "Band", 3, 5)).unwrap();

        let err = apply_mutation(repo.conn, &created.id, 1, InventoryMutation::Release(1))
            .unwrap_err();

        assert!(matches!(err, StoreError::CapacityExceeded { .. }));
        assert_eq!(repo.get(&created.id).unwrap().unwrap().version, 1);
    }

    #[test]
    fn details_update_keeps_counts() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        let created = repo.create(input("Show", "Band", 3, 5)).unwrap();

        let updated = repo
            .conditional_update(
                &created.id,
                1,
                InventoryDetails {
                    name: Some("Late Show".to_string()),
                    price_cents: Some(7000),
                    ..InventoryDetails::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Late Show");
        assert_eq!(updated.artist, "Band");
        assert_eq!(updated.price_cents, 7000);
        assert_eq!(updated.available, 5);
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn missing_record_is_not_found() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        let err = repo
            .conditional_update(&InventoryId::generate(), 1, InventoryDetails::default())
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert_eq!(
            repo.get_for_update(&InventoryId::generate()).unwrap_err(),
            StoreError::NotFound
        );
    }

    #[test]
    fn list_filters_orders_and_counts() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        repo.create(input("Later", "Aurora", 20, 5)).unwrap();
        repo.create(input("Sooner", "AURORA", 10, 5)).unwrap();
        repo.create(input("Other", "Quartet", 5, 5)).unwrap();
        let filter = InventoryFilter {
            artist: Some("aurora".to_string()),
            ..InventoryFilter::default()
        };

        let listed = repo.list(&filter, PageRequest::normalized(1, 20)).unwrap();

        let names: Vec<_> = listed.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Sooner", "Later"]);
        assert_eq!(repo.count(&filter).unwrap(), 2);
        assert_eq!(repo.count(&InventoryFilter::default()).unwrap(), 3);
        let second = repo
            .list(&InventoryFilter::default(), PageRequest::normalized(2, 2))
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "Later");
    }

    #[test]
    fn available_only_skips_sold_out() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        let sold_out = repo.create(input("Gone", "Band", 3, 1)).unwrap();
        repo.create(input("Open", "Band", 4, 1)).unwrap();
        BookingRepo::new(&conn)
            .create_and_decrement(
                NewBooking {
                    inventory_id: sold_out.id.clone(),
                    user_id: "alice".to_string(),
                    ticket_count: 1,
                    booked_at: Utc::now(),
                },
                1,
            )
            .unwrap();
        let filter = InventoryFilter {
            available_only: true,
            ..InventoryFilter::default()
        };

        let listed = repo.list(&filter, PageRequest::default()).unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Open");
        let booked = BookingRepo::new(&conn).confirmed_tickets(&sold_out.id).unwrap();
        assert_eq!(booked, 1);
    }

    #[test]
    fn text_filters_fold_non_ascii_case() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        repo.create(input("Récital", "Édith Piaf", 3, 5)).unwrap();
        repo.create(input("Other", "Edith Wharton", 4, 5)).unwrap();
        let filter = InventoryFilter {
            artist: Some("édith".to_string()),
            ..InventoryFilter::default()
        };

        let listed = repo.list(&filter, PageRequest::default()).unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].artist, "Édith Piaf");
        assert_eq!(repo.count(&filter).unwrap(), 1);
        let by_name = InventoryFilter {
            name: Some("RÉCI".to_string()),
            ..InventoryFilter::default()
        };
        assert_eq!(repo.count(&by_name).unwrap(), 1);
    }

    #[test]
    fn wildcard_characters_in_filters_match_literally() {
        let conn = with_test_db().unwrap();
        let repo = InventoryRepo::new(&conn);
        repo.create(input("50%_Off Night", "Band", 3, 5)).unwrap();
        repo.create(input("500 Off Night", "Band", 4, 5)).unwrap();
        let filter = InventoryFilter {
            name: Some("50%_off".to_string()),
            ..InventoryFilter::default()
        };

        assert_eq!(repo.count(&filter).unwrap(), 1);
    }
}
