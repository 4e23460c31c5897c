use crate::types::ids::InventoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interval during which reservations are accepted. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub id: InventoryId,
    pub name: String,
    pub artist: String,
    pub venue: String,
    pub event_date: DateTime<Utc>,
    pub price_cents: u64,
    pub total_capacity: u32,
    pub available: u32,
    pub booking_window: BookingWindow,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    pub fn is_booking_open(&self, now: DateTime<Utc>) -> bool {
        self.booking_window.is_open_at(now)
    }

    pub fn has_available(&self, count: u32) -> bool {
        self.available >= count
    }

    /// Tickets currently held by confirmed bookings.
    pub fn sold(&self) -> u32 {
        self.total_capacity.saturating_sub(self.available)
    }
}

/// Change applied by a version-guarded inventory update. Store adapters use
/// `Reserve` and `Release` only inside the paired booking writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryMutation {
    Reserve(u32),
    Release(u32),
    Details(InventoryDetails),
}

/// Descriptive fields an operator may edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDetails {
    pub name: Option<String>,
    pub artist: Option<String>,
    pub venue: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub price_cents: Option<u64>,
    pub booking_window: Option<BookingWindow>,
}

/// Accounting snapshot used to check that inventory and bookings agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLedger {
    pub total_capacity: u32,
    pub available: u32,
    pub confirmed_tickets: u64,
}

impl InventoryLedger {
    pub fn is_balanced(&self) -> bool {
        self.available <= self.total_capacity
            && u64::from(self.total_capacity - self.available) == self.confirmed_tickets
    }
}
