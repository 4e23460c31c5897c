use crate::types::enums::BookingStatus;
use thiserror::Error;

/// Outcomes reported by the persistence collaborator. `NotFound` and
/// `VersionConflict` are kept distinguishable so callers can decide what to
/// retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("insufficient tickets: requested {requested}, available {available}")]
    InsufficientTickets { requested: u32, available: u32 },
    #[error("capacity exceeded: releasing {released} onto {available} of {total_capacity}")]
    CapacityExceeded {
        released: u32,
        available: u32,
        total_capacity: u32,
    },
    #[error("booking status is {actual:?}, expected {expected:?}")]
    StatusConflict {
        expected: BookingStatus,
        actual: BookingStatus,
    },
    #[error("timed out waiting for the inventory lock")]
    LockTimeout,
    #[error("store error: {message}")]
    Backend { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("not found")]
    NotFound,
    #[error("booking is closed")]
    BookingClosed,
    #[error("insufficient tickets: requested {requested}, available {available}")]
    InsufficientTickets { requested: u32, available: u32 },
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("booking failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<BookingError>,
    },
    #[error("unauthorized")]
    Unauthorized,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error("deadline exceeded")]
    Timeout,
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound => "not_found",
            Self::BookingClosed => "booking_closed",
            Self::InsufficientTickets { .. } => "insufficient_tickets",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Exhausted { .. } => "exhausted",
            Self::Unauthorized => "unauthorized",
            Self::AlreadyCancelled => "already_cancelled",
            Self::Timeout => "timeout",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Only optimistic conflicts are recovered by retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<StoreError> for BookingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Self::NotFound,
            StoreError::VersionConflict { expected, actual } => {
                Self::VersionConflict { expected, actual }
            }
            StoreError::InsufficientTickets {
                requested,
                available,
            } => Self::InsufficientTickets {
                requested,
                available,
            },
            StoreError::StatusConflict {
                actual: BookingStatus::Cancelled,
                ..
            } => Self::AlreadyCancelled,
            StoreError::LockTimeout => Self::Timeout,
            other @ (StoreError::CapacityExceeded { .. }
            | StoreError::StatusConflict { .. }
            | StoreError::Backend { .. }) => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("not found")]
    NotFound,
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CatalogError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Internal { .. } => "internal_error",
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Self::NotFound,
            StoreError::VersionConflict { expected, actual } => {
                Self::VersionConflict { expected, actual }
            }
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum BoxOfficeError {
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("config error: {message}")]
    Config { message: String },
}

impl BoxOfficeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Booking(err) => err.code(),
            Self::Catalog(err) => err.code(),
            Self::Store(_) => "store_error",
            Self::Config { .. } => "config_error",
        }
    }
}
