use crate::bookings::BookingRepository;
use crate::error::StoreError;
use crate::inventories::InventoryRepository;
use std::time::Duration;

pub trait Store {
    type Inventories<'a>: InventoryRepository
    where
        Self: 'a;
    type Bookings<'a>: BookingRepository
    where
        Self: 'a;

    fn inventories(&self) -> Self::Inventories<'_>;
    fn bookings(&self) -> Self::Bookings<'_>;

    /// Upper bound on how long the next `with_tx` may wait for the exclusive
    /// lock before failing with `StoreError::LockTimeout`.
    fn set_lock_timeout(&self, timeout: Duration) -> Result<(), StoreError>;

    /// Runs `f` under the store's exclusive lock. Commits when `f` returns
    /// `Ok`, rolls back otherwise.
    fn with_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>;

    /// Runs a read-only unit of work. Stores that can read a consistent
    /// snapshot without the write lock override this.
    fn with_read_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.with_tx(f)
    }
}
