use serde::{Deserialize, Serialize};

/// Bookings are created `Confirmed` and move to `Cancelled` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}
