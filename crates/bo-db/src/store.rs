use bo_core::error::StoreError;
use bo_core::store::Store;
use rusqlite::Connection;
use std::time::Duration;
use tracing::{debug, warn};

use crate::booking_repo::BookingRepo;
use crate::inventory_repo::InventoryRepo;
use crate::util::store_err;

/// One SQLite connection. Concurrent callers each open their own; SQLite's
/// database write lock taken by `BEGIN IMMEDIATE` is the exclusive lock.
pub struct DbStore {
    conn: Connection,
}

impl DbStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn run_tx<F, T, E>(&self, begin: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.conn.execute_batch(begin).map_err(store_err)?;
        match f(self) {
            Ok(value) => {
                if let Err(err) = self.conn.execute_batch("COMMIT") {
                    self.rollback();
                    return Err(store_err(err).into());
                }
                Ok(value)
            }
            Err(err) => {
                debug!("transaction rolled back");
                self.rollback();
                Err(err)
            }
        }
    }

    /// The caller's error is what gets reported; a failed rollback is only
    /// logged.
    fn rollback(&self) {
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %err, "rollback failed");
        }
    }
}

impl Store for DbStore {
    type Inventories<'a>
        = InventoryRepo<'a>
    where
        Self: 'a;
    type Bookings<'a>
        = BookingRepo<'a>
    where
        Self: 'a;

    fn inventories(&self) -> Self::Inventories<'_> {
        InventoryRepo::new(&self.conn)
    }

    fn bookings(&self) -> Self::Bookings<'_> {
        BookingRepo::new(&self.conn)
    }

    fn set_lock_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        self.conn.busy_timeout(timeout).map_err(store_err)
    }

    fn with_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.run_tx("BEGIN IMMEDIATE", f)
    }

    /// A deferred transaction reads one WAL snapshot without taking the
    /// database write lock.
    fn with_read_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.run_tx("BEGIN DEFERRED", f)
    }
}
