use bo_core::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::ErrorCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("json encode failed: {message}")]
    JsonEncode { message: String },
    #[error("json decode failed: {message}")]
    JsonDecode { message: String },
    #[error("invalid enum value: {value}")]
    InvalidEnum { value: String },
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
    #[error("integer out of range: {value}")]
    OutOfRange { value: String },
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Backend {
            message: value.to_string(),
        }
    }
}

/// Fixed-width UTC timestamps so text order matches time order.
pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn from_rfc3339(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DbError::InvalidTimestamp {
            value: value.to_string(),
        })
}

pub fn encode_enum<T: Serialize>(value: &T) -> Result<String, DbError> {
    let json = serde_json::to_value(value).map_err(|err| DbError::JsonEncode {
        message: err.to_string(),
    })?;
    match json {
        Value::String(value) => Ok(value),
        other => Err(DbError::InvalidEnum {
            value: other.to_string(),
        }),
    }
}

pub fn decode_enum<T: DeserializeOwned>(value: &str) -> Result<T, DbError> {
    let json = Value::String(value.to_string());
    serde_json::from_value(json).map_err(|err| DbError::JsonDecode {
        message: err.to_string(),
    })
}

pub fn to_sql_int(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::OutOfRange {
        value: value.to_string(),
    })
}

pub fn from_sql_int(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::OutOfRange {
        value: value.to_string(),
    })
}

/// SQLite reports a lock wait that outlived `busy_timeout` as busy or locked.
pub fn store_err(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::LockTimeout,
        _ => StoreError::Backend {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bo_core::types::BookingStatus;

    #[test]
    fn timestamps_round_trip_at_full_precision() {
        let now = Utc::now();
        assert_eq!(from_rfc3339(&to_rfc3339(&now)).unwrap(), now);
    }

    #[test]
    fn status_is_stored_as_its_name() {
        assert_eq!(encode_enum(&BookingStatus::Cancelled).unwrap(), "Cancelled");
        let status: BookingStatus = decode_enum("Confirmed").unwrap();
        assert_eq!(status, BookingStatus::Confirmed);
        assert!(decode_enum::<BookingStatus>("Pending").is_err());
    }

    #[test]
    fn busy_maps_to_lock_timeout() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert_eq!(store_err(err), StoreError::LockTimeout);
    }
}
