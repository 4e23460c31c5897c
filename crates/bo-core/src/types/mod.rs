pub mod booking;
pub mod enums;
pub mod ids;
pub mod inventory;
pub mod io;

pub use booking::{Booking, CancelAck, NewBooking};
pub use enums::BookingStatus;
pub use ids::{BookingId, IdError, InventoryId};
pub use inventory::{
    BookingWindow, Inventory, InventoryDetails, InventoryLedger, InventoryMutation,
};
pub use io::{
    BookingRequest, CancelRequest, CreateInventoryInput, InventoryFilter, Page, PageRequest,
    fold_case,
};
