use crate::bookings::BookingRepository;
use crate::error::StoreError;
use crate::memory::{MemoryBookings, MemoryInventories, MemoryStore};
use crate::store::Store;
use crate::types::{
    Booking, BookingId, BookingWindow, CreateInventoryInput, Inventory, InventoryId, NewBooking,
    PageRequest,
};
use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

pub fn inventory_input(capacity: u32, window: BookingWindow) -> CreateInventoryInput {
    CreateInventoryInput {
        name: "Night Show".to_string(),
        artist: "The Band".to_string(),
        venue: "Hall".to_string(),
        event_date: window.end + Duration::days(1),
        price_cents: 5000,
        total_capacity: capacity,
        booking_window: window,
    }
}

pub fn open_window(now: DateTime<Utc>) -> BookingWindow {
    BookingWindow::new(now - Duration::hours(1), now + Duration::hours(1))
}

/// Memory store whose next `conflicts` booking commits lose the version race.
pub struct ConflictingStore {
    pub inner: MemoryStore,
    conflicts_left: Cell<u32>,
}

impl ConflictingStore {
    pub fn new(inner: MemoryStore, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts_left: Cell::new(conflicts),
        }
    }

    pub fn conflicts_left(&self) -> u32 {
        self.conflicts_left.get()
    }
}

impl Store for ConflictingStore {
    type Inventories<'a>
        = MemoryInventories<'a>
    where
        Self: 'a;
    type Bookings<'a>
        = ConflictingBookings<'a>
    where
        Self: 'a;

    fn inventories(&self) -> Self::Inventories<'_> {
        self.inner.inventories()
    }

    fn bookings(&self) -> Self::Bookings<'_> {
        ConflictingBookings {
            inner: self.inner.bookings(),
            conflicts_left: &self.conflicts_left,
        }
    }

    fn set_lock_timeout(&self, timeout: std::time::Duration) -> Result<(), StoreError> {
        self.inner.set_lock_timeout(timeout)
    }

    fn with_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.inner.with_tx(|_| f(self))
    }
}

pub struct ConflictingBookings<'a> {
    inner: MemoryBookings<'a>,
    conflicts_left: &'a Cell<u32>,
}

impl BookingRepository for ConflictingBookings<'_> {
    fn get(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        self.inner.get(id)
    }

    fn list_by_user(&self, user_id: &str, page: PageRequest) -> Result<Vec<Booking>, StoreError> {
        self.inner.list_by_user(user_id, page)
    }

    fn count_by_user(&self, user_id: &str) -> Result<u64, StoreError> {
        self.inner.count_by_user(user_id)
    }

    fn confirmed_tickets(&self, inventory_id: &InventoryId) -> Result<u64, StoreError> {
        self.inner.confirmed_tickets(inventory_id)
    }

    fn create_and_decrement(
        &self,
        booking: NewBooking,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError> {
        let left = self.conflicts_left.get();
        if left > 0 {
            self.conflicts_left.set(left - 1);
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner.create_and_decrement(booking, expected_version)
    }

    fn cancel_and_increment(
        &self,
        id: &BookingId,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError> {
        self.inner.cancel_and_increment(id, expected_version)
    }
}
