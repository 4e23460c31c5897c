pub mod bookings;
pub mod box_office;
pub mod cancellation;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod inventories;
pub mod memory;
pub mod reservation;
pub mod retry;
pub mod store;
pub mod validation;

pub mod types;

#[cfg(test)]
mod test_support;

pub use crate::box_office::{BoxOffice, RequestContext};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{BookingError, BoxOfficeError, CatalogError, StoreError};
pub use crate::memory::MemoryStore;
pub use crate::retry::RetryPolicy;
pub use crate::store::Store;
