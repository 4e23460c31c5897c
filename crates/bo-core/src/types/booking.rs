use crate::types::enums::BookingStatus;
use crate::types::ids::{BookingId, InventoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub inventory_id: InventoryId,
    pub user_id: String,
    pub ticket_count: u32,
    pub status: BookingStatus,
    /// Inventory version observed by the transaction that created this booking.
    pub inventory_version: u64,
    pub booked_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}

/// Booking row to insert alongside an inventory decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub inventory_id: InventoryId,
    pub user_id: String,
    pub ticket_count: u32,
    pub booked_at: DateTime<Utc>,
}

/// Acknowledgement returned by a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub booking_id: BookingId,
    pub inventory_id: InventoryId,
    pub tickets_returned: u32,
    pub available: u32,
}
