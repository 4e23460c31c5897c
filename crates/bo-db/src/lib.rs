pub mod booking_repo;
pub mod inventory_repo;
pub mod schema;
pub mod store;
pub mod util;

pub use crate::booking_repo::BookingRepo;
pub use crate::inventory_repo::InventoryRepo;
pub use crate::store::DbStore;
