use crate::error::StoreError;
use crate::types::{Booking, BookingId, Inventory, InventoryId, NewBooking, PageRequest};

pub trait BookingRepository {
    fn get(&self, id: &BookingId) -> Result<Option<Booking>, StoreError>;
    fn list_by_user(&self, user_id: &str, page: PageRequest) -> Result<Vec<Booking>, StoreError>;
    fn count_by_user(&self, user_id: &str) -> Result<u64, StoreError>;
    /// Sum of `ticket_count` over confirmed bookings of one inventory record.
    fn confirmed_tickets(&self, inventory_id: &InventoryId) -> Result<u64, StoreError>;
    /// Inserts the booking as `Confirmed` and decrements the inventory guarded
    /// by `expected_version`. Either both writes land or neither does.
    fn create_and_decrement(
        &self,
        booking: NewBooking,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError>;
    /// Moves a confirmed booking to `Cancelled` and returns its tickets to the
    /// inventory guarded by `expected_version`, as one unit.
    fn cancel_and_increment(
        &self,
        id: &BookingId,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError>;
}
