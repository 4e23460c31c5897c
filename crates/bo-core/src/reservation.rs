use crate::box_office::{BoxOffice, RequestContext};
use crate::bookings::BookingRepository;
use crate::clock::Clock;
use crate::error::BookingError;
use crate::inventories::InventoryRepository;
use crate::store::Store;
use crate::types::{Booking, BookingRequest, Inventory, NewBooking};
use crate::validation::{check_bookable, validate_booking_request};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Books tickets against one inventory record without ever overselling it.
pub struct ReservationCoordinator<'a, S: Store, C: Clock> {
    pub(crate) core: &'a BoxOffice<S, C>,
}

impl<S: Store, C: Clock> ReservationCoordinator<'_, S, C> {
    /// Validates the request, runs an unlocked pre-check, then retries the
    /// locked read-modify-write on optimistic conflicts up to the policy's
    /// attempt budget.
    pub fn book(
        &self,
        ctx: &RequestContext,
        request: BookingRequest,
    ) -> Result<Booking, BookingError> {
        validate_booking_request(&request)?;

        let store = self.core.store();
        let snapshot = store
            .inventories()
            .get(&request.inventory_id)?
            .ok_or(BookingError::NotFound)?;
        if let Err(err) = check_bookable(&snapshot, self.core.clock().now(), request.ticket_count)
        {
            debug!(
                inventory_id = %request.inventory_id,
                code = err.code(),
                "booking rejected by pre-check"
            );
            return Err(err);
        }

        let policy = *self.core.policy();
        let mut attempt = 0;
        loop {
            self.core.bound_lock_wait(ctx)?;
            match self.attempt(&request) {
                Ok((booking, inventory)) => {
                    info!(
                        inventory_id = %inventory.id,
                        booking_id = %booking.id,
                        version = inventory.version,
                        available = inventory.available,
                        attempt,
                        "booking committed"
                    );
                    return Ok(booking);
                }
                Err(err) if err.is_transient() => {
                    if !policy.has_next(attempt) {
                        warn!(
                            inventory_id = %request.inventory_id,
                            attempts = policy.max_attempts(),
                            "booking retries exhausted"
                        );
                        return Err(BookingError::Exhausted {
                            attempts: policy.max_attempts(),
                            last: Box::new(err),
                        });
                    }
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        inventory_id = %request.inventory_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "version conflict, retrying"
                    );
                    self.backoff(ctx, delay)?;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn attempt(&self, request: &BookingRequest) -> Result<(Booking, Inventory), BookingError> {
        let clock = self.core.clock();
        self.core
            .store()
            .with_tx(|tx| -> Result<(Booking, Inventory), BookingError> {
                let current = tx.inventories().get_for_update(&request.inventory_id)?;
                let now = clock.now();
                check_bookable(&current, now, request.ticket_count)?;
                let booking = NewBooking {
                    inventory_id: current.id.clone(),
                    user_id: request.user_id.clone(),
                    ticket_count: request.ticket_count,
                    booked_at: now,
                };
                Ok(tx
                    .bookings()
                    .create_and_decrement(booking, current.version)?)
            })
    }

    fn backoff(&self, ctx: &RequestContext, delay: Duration) -> Result<(), BookingError> {
        let clock = self.core.clock();
        if let Some(remaining) = ctx.remaining(clock.now()) {
            if delay >= remaining {
                warn!(
                    correlation_id = ctx.correlation_id.as_deref(),
                    "deadline reached during booking backoff"
                );
                return Err(BookingError::Timeout);
            }
        }
        clock.sleep(delay);
        Ok(())
    }
}
