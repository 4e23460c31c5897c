use crate::box_office::{BoxOffice, RequestContext};
use crate::bookings::BookingRepository;
use crate::clock::Clock;
use crate::error::BookingError;
use crate::inventories::InventoryRepository;
use crate::store::Store;
use crate::types::{CancelAck, CancelRequest};
use crate::validation::validate_cancel_request;
use tracing::{debug, info};

/// Reverses a confirmed booking and re-credits its inventory exactly once.
pub struct CancellationCoordinator<'a, S: Store, C: Clock> {
    pub(crate) core: &'a BoxOffice<S, C>,
}

impl<S: Store, C: Clock> CancellationCoordinator<'_, S, C> {
    pub fn cancel(
        &self,
        ctx: &RequestContext,
        request: CancelRequest,
    ) -> Result<CancelAck, BookingError> {
        validate_cancel_request(&request)?;

        let store = self.core.store();
        let booking = store
            .bookings()
            .get(&request.booking_id)?
            .ok_or(BookingError::NotFound)?;
        if booking.user_id != request.user_id {
            debug!(booking_id = %booking.id, "cancellation by non-owner rejected");
            return Err(BookingError::Unauthorized);
        }
        if booking.is_cancelled() {
            return Err(BookingError::AlreadyCancelled);
        }

        self.core.bound_lock_wait(ctx)?;
        let (booking, inventory) =
            store.with_tx(|tx| -> Result<_, BookingError> {
                let current = tx
                    .bookings()
                    .get(&request.booking_id)?
                    .ok_or(BookingError::NotFound)?;
                if current.is_cancelled() {
                    return Err(BookingError::AlreadyCancelled);
                }
                let inventory = tx.inventories().get_for_update(&current.inventory_id)?;
                Ok(tx
                    .bookings()
                    .cancel_and_increment(&current.id, inventory.version)?)
            })?;

        info!(
            inventory_id = %inventory.id,
            booking_id = %booking.id,
            version = inventory.version,
            available = inventory.available,
            "booking cancelled"
        );
        Ok(CancelAck {
            booking_id: booking.id,
            inventory_id: inventory.id,
            tickets_returned: booking.ticket_count,
            available: inventory.available,
        })
    }
}
