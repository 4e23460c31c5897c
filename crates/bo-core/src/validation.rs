use crate::error::{BookingError, CatalogError};
use crate::types::{
    BookingRequest, BookingWindow, CancelRequest, CreateInventoryInput, Inventory,
    InventoryDetails,
};
use chrono::{DateTime, Utc};

pub const MAX_TICKETS_PER_BOOKING: u32 = 10;

pub fn validate_booking_request(request: &BookingRequest) -> Result<(), BookingError> {
    if request.user_id.trim().is_empty() {
        return Err(BookingError::InvalidInput {
            message: "user_id is required".to_string(),
        });
    }
    if request.ticket_count == 0 {
        return Err(BookingError::InvalidInput {
            message: "ticket_count must be positive".to_string(),
        });
    }
    if request.ticket_count > MAX_TICKETS_PER_BOOKING {
        return Err(BookingError::InvalidInput {
            message: format!("cannot book more than {MAX_TICKETS_PER_BOOKING} tickets at once"),
        });
    }
    Ok(())
}

pub fn validate_cancel_request(request: &CancelRequest) -> Result<(), BookingError> {
    if request.user_id.trim().is_empty() {
        return Err(BookingError::InvalidInput {
            message: "user_id is required".to_string(),
        });
    }
    Ok(())
}

/// Window and availability check shared by the advisory pre-check and the
/// locked re-check.
pub fn check_bookable(
    inventory: &Inventory,
    now: DateTime<Utc>,
    ticket_count: u32,
) -> Result<(), BookingError> {
    if !inventory.is_booking_open(now) {
        return Err(BookingError::BookingClosed);
    }
    if !inventory.has_available(ticket_count) {
        return Err(BookingError::InsufficientTickets {
            requested: ticket_count,
            available: inventory.available,
        });
    }
    Ok(())
}

pub fn validate_inventory_input(input: &CreateInventoryInput) -> Result<(), CatalogError> {
    require_text("name", &input.name)?;
    require_text("artist", &input.artist)?;
    require_text("venue", &input.venue)?;
    if input.total_capacity == 0 {
        return Err(CatalogError::InvalidInput {
            message: "total_capacity must be positive".to_string(),
        });
    }
    validate_window(&input.booking_window)
}

pub fn validate_inventory_details(details: &InventoryDetails) -> Result<(), CatalogError> {
    if let Some(name) = &details.name {
        require_text("name", name)?;
    }
    if let Some(artist) = &details.artist {
        require_text("artist", artist)?;
    }
    if let Some(venue) = &details.venue {
        require_text("venue", venue)?;
    }
    if let Some(window) = &details.booking_window {
        validate_window(window)?;
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::InvalidInput {
            message: format!("{field} is required"),
        });
    }
    Ok(())
}

fn validate_window(window: &BookingWindow) -> Result<(), CatalogError> {
    if window.end <= window.start {
        return Err(CatalogError::InvalidInput {
            message: "booking window must end after it starts".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InventoryId;
    use chrono::Duration;

    fn request(user_id: &str, ticket_count: u32) -> BookingRequest {
        BookingRequest {
            inventory_id: InventoryId::generate(),
            user_id: user_id.to_string(),
            ticket_count,
        }
    }

    fn inventory(available: u32, window: BookingWindow) -> Inventory {
        let now = Utc::now();
        Inventory {
            id: InventoryId::generate(),
            name: "Night Show".to_string(),
            artist: "The Band".to_string(),
            venue: "Hall".to_string(),
            event_date: now + Duration::days(7),
            price_cents: 5000,
            total_capacity: 20,
            available,
            booking_window: window,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ticket_count_must_be_between_one_and_ten() {
        assert!(validate_booking_request(&request("alice", 1)).is_ok());
        assert!(validate_booking_request(&request("alice", 10)).is_ok());
        for count in [0, 11] {
            let err = validate_booking_request(&request("alice", count)).unwrap_err();
            assert_eq!(err.code(), "invalid_input");
        }
    }

    #[test]
    fn blank_user_is_rejected() {
        let err = validate_booking_request(&request("   ", 1)).unwrap_err();
        assert_eq!(
            err,
            BookingError::InvalidInput {
                message: "user_id is required".to_string()
            }
        );
    }

    #[test]
    fn closed_window_wins_over_shortage() {
        let now = Utc::now();
        let future = BookingWindow::new(now + Duration::hours(1), now + Duration::hours(2));
        let err = check_bookable(&inventory(0, future), now, 1).unwrap_err();
        assert_eq!(err, BookingError::BookingClosed);
    }

    #[test]
    fn shortage_reports_requested_and_available() {
        let now = Utc::now();
        let open = BookingWindow::new(now - Duration::hours(1), now + Duration::hours(1));
        let err = check_bookable(&inventory(5, open), now, 10).unwrap_err();
        assert_eq!(
            err,
            BookingError::InsufficientTickets {
                requested: 10,
                available: 5
            }
        );
    }

    #[test]
    fn inventory_window_must_be_ordered() {
        let now = Utc::now();
        let input = CreateInventoryInput {
            name: "Night Show".to_string(),
            artist: "The Band".to_string(),
            venue: "Hall".to_string(),
            event_date: now,
            price_cents: 0,
            total_capacity: 10,
            booking_window: BookingWindow::new(now, now),
        };
        assert_eq!(validate_inventory_input(&input).unwrap_err().code(), "invalid_input");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let now = Utc::now();
        let input = CreateInventoryInput {
            name: "Night Show".to_string(),
            artist: "The Band".to_string(),
            venue: "Hall".to_string(),
            event_date: now,
            price_cents: 0,
            total_capacity: 0,
            booking_window: BookingWindow::new(now, now + Duration::hours(1)),
        };
        assert!(matches!(
            validate_inventory_input(&input),
            Err(CatalogError::InvalidInput { .. })
        ));
    }
}
