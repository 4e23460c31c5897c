//! In-process store. Every handle cloned from one `MemoryStore` shares the
//! same records. Transactions lock inventory records one id at a time, so
//! writers on different records never wait on each other, and roll back by
//! replaying an undo log of the records they touched.

use crate::bookings::BookingRepository;
use crate::error::StoreError;
use crate::inventories::InventoryRepository;
use crate::store::Store;
use crate::types::{
    Booking, BookingId, BookingStatus, CreateInventoryInput, Inventory, InventoryDetails,
    InventoryFilter, InventoryId, InventoryMutation, NewBooking, PageRequest,
};
use chrono::Utc;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    inventories: BTreeMap<InventoryId, Inventory>,
    bookings: BTreeMap<BookingId, Booking>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MemoryState>,
    locked: Mutex<BTreeSet<InventoryId>>,
    released: Condvar,
}

/// Before-image of one record, restored when a transaction fails.
#[derive(Debug)]
enum Undo {
    Inventory(InventoryId, Option<Inventory>),
    Booking(BookingId, Option<Booking>),
}

pub struct MemoryStore {
    shared: Arc<Shared>,
    in_tx: Cell<bool>,
    lock_timeout: Cell<Duration>,
    held: RefCell<BTreeSet<InventoryId>>,
    undo: RefCell<Vec<Undo>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::attach(Arc::new(Shared::default()), crate::box_office::DEFAULT_LOCK_TIMEOUT)
    }

    /// Another handle onto the same records, for use on another thread.
    pub fn handle(&self) -> Self {
        Self::attach(Arc::clone(&self.shared), self.lock_timeout.get())
    }

    fn attach(shared: Arc<Shared>, lock_timeout: Duration) -> Self {
        Self {
            shared,
            in_tx: Cell::new(false),
            lock_timeout: Cell::new(lock_timeout),
            held: RefCell::new(BTreeSet::new()),
            undo: RefCell::new(Vec::new()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.shared.state.lock().map_err(|_| poisoned())
    }

    /// Takes the exclusive lock on one inventory record, waiting at most the
    /// configured lock timeout. Re-entrant for the holding handle.
    fn lock(&self, id: &InventoryId) -> Result<(), StoreError> {
        if self.held.borrow().contains(id) {
            return Ok(());
        }
        let locked = self.shared.locked.lock().map_err(|_| poisoned())?;
        let (mut locked, _) = self
            .shared
            .released
            .wait_timeout_while(locked, self.lock_timeout.get(), |locked| locked.contains(id))
            .map_err(|_| poisoned())?;
        if locked.contains(id) {
            return Err(StoreError::LockTimeout);
        }
        locked.insert(id.clone());
        self.held.borrow_mut().insert(id.clone());
        Ok(())
    }

    fn release_all(&self) {
        let held = self.held.take();
        if held.is_empty() {
            return;
        }
        let mut locked = self
            .shared
            .locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for id in &held {
            locked.remove(id);
        }
        drop(locked);
        self.shared.released.notify_all();
    }

    /// Runs a write against `id` under its lock. Outside a transaction the
    /// lock is released on return; inside one it is kept until the end and
    /// the before-images of the touched records are logged.
    fn write<T>(
        &self,
        id: &InventoryId,
        booking_id: Option<&BookingId>,
        f: impl FnOnce(&mut MemoryState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let in_tx = self.in_tx.get();
        self.lock(id)?;
        let _held = (!in_tx).then(|| HeldLocks { store: self });
        let mut state = self.state()?;
        if in_tx {
            let mut undo = self.undo.borrow_mut();
            undo.push(Undo::Inventory(id.clone(), state.inventories.get(id).cloned()));
            if let Some(booking_id) = booking_id {
                undo.push(Undo::Booking(
                    booking_id.clone(),
                    state.bookings.get(booking_id).cloned(),
                ));
            }
        }
        f(&mut state)
    }

    fn restore(&self, undo: Vec<Undo>) -> Result<(), StoreError> {
        let mut state = self.state()?;
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Inventory(id, Some(before)) => {
                    state.inventories.insert(id, before);
                }
                Undo::Inventory(id, None) => {
                    state.inventories.remove(&id);
                }
                Undo::Booking(id, Some(before)) => {
                    state.bookings.insert(id, before);
                }
                Undo::Booking(id, None) => {
                    state.bookings.remove(&id);
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends a transaction or a standalone write: drops every record lock the
/// handle holds, also when unwinding.
struct HeldLocks<'a> {
    store: &'a MemoryStore,
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        self.store.in_tx.set(false);
        self.store.release_all();
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend {
        message: "memory store lock poisoned".to_string(),
    }
}

impl Store for MemoryStore {
    type Inventories<'a>
        = MemoryInventories<'a>
    where
        Self: 'a;
    type Bookings<'a>
        = MemoryBookings<'a>
    where
        Self: 'a;

    fn inventories(&self) -> Self::Inventories<'_> {
        MemoryInventories { store: self }
    }

    fn bookings(&self) -> Self::Bookings<'_> {
        MemoryBookings { store: self }
    }

    fn set_lock_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        self.lock_timeout.set(timeout);
        Ok(())
    }

    fn with_tx<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        let _held = HeldLocks { store: self };
        self.in_tx.set(true);
        let result = f(self);
        self.in_tx.set(false);
        let undo = self.undo.take();
        if result.is_err() {
            self.restore(undo)?;
        }
        result
    }
}

pub struct MemoryInventories<'a> {
    store: &'a MemoryStore,
}

impl InventoryRepository for MemoryInventories<'_> {
    fn create(&self, input: CreateInventoryInput) -> Result<Inventory, StoreError> {
        let now = Utc::now();
        let inventory = Inventory {
            id: InventoryId::generate(),
            name: input.name,
            artist: input.artist,
            venue: input.venue,
            event_date: input.event_date,
            price_cents: input.price_cents,
            total_capacity: input.total_capacity,
            available: input.total_capacity,
            booking_window: input.booking_window,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let id = inventory.id.clone();
        self.store.write(&id, None, |state| {
            state
                .inventories
                .insert(inventory.id.clone(), inventory.clone());
            Ok(inventory)
        })
    }

    fn get(&self, id: &InventoryId) -> Result<Option<Inventory>, StoreError> {
        Ok(self.store.state()?.inventories.get(id).cloned())
    }

    fn get_for_update(&self, id: &InventoryId) -> Result<Inventory, StoreError> {
        if self.store.in_tx.get() {
            self.store.lock(id)?;
        }
        self.get(id)?.ok_or(StoreError::NotFound)
    }

    fn conditional_update(
        &self,
        id: &InventoryId,
        expected_version: u64,
        details: InventoryDetails,
    ) -> Result<Inventory, StoreError> {
        self.store.write(id, None, |state| {
            apply_mutation(state, id, expected_version, InventoryMutation::Details(details))
        })
    }

    fn list(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> Result<Vec<Inventory>, StoreError> {
        let state = self.store.state()?;
        let mut matching: Vec<Inventory> = state
            .inventories
            .values()
            .filter(|inventory| filter.matches(inventory))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.event_date.cmp(&b.event_date).then(a.id.cmp(&b.id)));
        Ok(paginate(matching, page))
    }

    fn count(&self, filter: &InventoryFilter) -> Result<u64, StoreError> {
        let state = self.store.state()?;
        Ok(state
            .inventories
            .values()
            .filter(|inventory| filter.matches(inventory))
            .count() as u64)
    }
}

pub struct MemoryBookings<'a> {
    store: &'a MemoryStore,
}

impl BookingRepository for MemoryBookings<'_> {
    fn get(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.store.state()?.bookings.get(id).cloned())
    }

    fn list_by_user(&self, user_id: &str, page: PageRequest) -> Result<Vec<Booking>, StoreError> {
        let state = self.store.state()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.booked_at.cmp(&a.booked_at).then(b.id.cmp(&a.id)));
        Ok(paginate(bookings, page))
    }

    fn count_by_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let state = self.store.state()?;
        Ok(state
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .count() as u64)
    }

    fn confirmed_tickets(&self, inventory_id: &InventoryId) -> Result<u64, StoreError> {
        let state = self.store.state()?;
        Ok(state
            .bookings
            .values()
            .filter(|booking| {
                &booking.inventory_id == inventory_id && booking.status == BookingStatus::Confirmed
            })
            .map(|booking| u64::from(booking.ticket_count))
            .sum())
    }

    fn create_and_decrement(
        &self,
        booking: NewBooking,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError> {
        let id = BookingId::generate();
        let inventory_id = booking.inventory_id.clone();
        self.store.write(&inventory_id, Some(&id), |state| {
            let inventory = apply_mutation(
                state,
                &booking.inventory_id,
                expected_version,
                InventoryMutation::Reserve(booking.ticket_count),
            )?;
            let created = Booking {
                id: id.clone(),
                inventory_id: booking.inventory_id,
                user_id: booking.user_id,
                ticket_count: booking.ticket_count,
                status: BookingStatus::Confirmed,
                inventory_version: expected_version,
                booked_at: booking.booked_at,
                updated_at: booking.booked_at,
            };
            state.bookings.insert(created.id.clone(), created.clone());
            Ok((created, inventory))
        })
    }

    fn cancel_and_increment(
        &self,
        id: &BookingId,
        expected_version: u64,
    ) -> Result<(Booking, Inventory), StoreError> {
        let inventory_id = self
            .store
            .state()?
            .bookings
            .get(id)
            .map(|booking| booking.inventory_id.clone())
            .ok_or(StoreError::NotFound)?;
        self.store.write(&inventory_id, Some(id), |state| {
            let booking = state.bookings.get(id).cloned().ok_or(StoreError::NotFound)?;
            if booking.status != BookingStatus::Confirmed {
                return Err(StoreError::StatusConflict {
                    expected: BookingStatus::Confirmed,
                    actual: booking.status,
                });
            }
            let inventory = apply_mutation(
                state,
                &booking.inventory_id,
                expected_version,
                InventoryMutation::Release(booking.ticket_count),
            )?;
            let cancelled = Booking {
                status: BookingStatus::Cancelled,
                updated_at: Utc::now(),
                ..booking
            };
            state.bookings.insert(cancelled.id.clone(), cancelled.clone());
            Ok((cancelled, inventory))
        })
    }
}

fn apply_mutation(
    state: &mut MemoryState,
    id: &InventoryId,
    expected_version: u64,
    mutation: InventoryMutation,
) -> Result<Inventory, StoreError> {
    let inventory = state.inventories.get_mut(id).ok_or(StoreError::NotFound)?;
    if inventory.version != expected_version {
        return Err(StoreError::VersionConflict {
            expected: expected_version,
            actual: inventory.version,
        });
    }
    match mutation {
        InventoryMutation::Reserve(count) => {
            if inventory.available < count {
                return Err(StoreError::InsufficientTickets {
                    requested: count,
                    available: inventory.available,
                });
            }
            inventory.available -= count;
        }
        InventoryMutation::Release(count) => {
            let restored = inventory.available.saturating_add(count);
            if restored > inventory.total_capacity {
                return Err(StoreError::CapacityExceeded {
                    released: count,
                    available: inventory.available,
                    total_capacity: inventory.total_capacity,
                });
            }
            inventory.available = restored;
        }
        InventoryMutation::Details(details) => {
            if let Some(name) = details.name {
                inventory.name = name;
            }
            if let Some(artist) = details.artist {
                inventory.artist = artist;
            }
            if let Some(venue) = details.venue {
                inventory.venue = venue;
            }
            if let Some(event_date) = details.event_date {
                inventory.event_date = event_date;
            }
            if let Some(price_cents) = details.price_cents {
                inventory.price_cents = price_cents;
            }
            if let Some(window) = details.booking_window {
                inventory.booking_window = window;
            }
        }
    }
    inventory.version += 1;
    inventory.updated_at = Utc::now();
    Ok(inventory.clone())
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    items
        .into_iter()
        .skip(offset)
        .take(page.limit() as usize)
        .collect()
}
