use crate::cancellation::CancellationCoordinator;
use crate::catalog::CatalogApi;
use crate::clock::{Clock, SystemClock};
use crate::error::BookingError;
use crate::reservation::ReservationCoordinator;
use crate::retry::RetryPolicy;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub correlation_id: Option<String>,
    /// Overall deadline for one call, covering lock waits and backoff.
    pub deadline: Option<DateTime<Utc>>,
}

impl RequestContext {
    pub fn new(correlation_id: Option<String>) -> Self {
        Self {
            correlation_id,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, now: DateTime<Utc>, timeout: Duration) -> Self {
        match chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
        {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Entry point wiring one store handle to the coordinators.
pub struct BoxOffice<S: Store, C: Clock = SystemClock> {
    store: S,
    clock: C,
    policy: RetryPolicy,
    lock_timeout: Duration,
}

impl<S: Store> BoxOffice<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: Store, C: Clock> BoxOffice<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            policy: RetryPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn reservations(&self) -> ReservationCoordinator<'_, S, C> {
        ReservationCoordinator { core: self }
    }

    pub fn cancellations(&self) -> CancellationCoordinator<'_, S, C> {
        CancellationCoordinator { core: self }
    }

    pub fn catalog(&self) -> CatalogApi<'_, S, C> {
        CatalogApi { core: self }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Caps the next lock wait at whichever is shorter, the configured lock
    /// timeout or the time left before the caller's deadline.
    pub(crate) fn bound_lock_wait(&self, ctx: &RequestContext) -> Result<(), BookingError> {
        let wait = match ctx.remaining(self.clock.now()) {
            Some(remaining) if remaining.is_zero() => {
                warn!(
                    correlation_id = ctx.correlation_id.as_deref(),
                    "deadline passed before acquiring the lock"
                );
                return Err(BookingError::Timeout);
            }
            Some(remaining) => remaining.min(self.lock_timeout),
            None => self.lock_timeout,
        };
        Ok(self.store.set_lock_timeout(wait)?)
    }
}
