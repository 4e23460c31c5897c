use crate::box_office::BoxOffice;
use crate::bookings::BookingRepository;
use crate::clock::Clock;
use crate::error::CatalogError;
use crate::inventories::InventoryRepository;
use crate::store::Store;
use crate::types::{
    Booking, BookingId, CreateInventoryInput, Inventory, InventoryDetails, InventoryFilter,
    InventoryId, InventoryLedger, Page, PageRequest,
};
use crate::validation::{validate_inventory_details, validate_inventory_input};

/// Reads and operator edits that sit outside the booking hot path.
pub struct CatalogApi<'a, S: Store, C: Clock> {
    pub(crate) core: &'a BoxOffice<S, C>,
}

impl<S: Store, C: Clock> CatalogApi<'_, S, C> {
    pub fn create_inventory(&self, input: CreateInventoryInput) -> Result<Inventory, CatalogError> {
        validate_inventory_input(&input)?;
        Ok(self.core.store().inventories().create(input)?)
    }

    /// Edits descriptive fields under the caller's expected version. A stale
    /// version surfaces as `VersionConflict`; the caller re-reads and retries.
    pub fn update_inventory_details(
        &self,
        id: &InventoryId,
        expected_version: u64,
        details: InventoryDetails,
    ) -> Result<Inventory, CatalogError> {
        validate_inventory_details(&details)?;
        Ok(self
            .core
            .store()
            .inventories()
            .conditional_update(id, expected_version, details)?)
    }

    pub fn get_inventory(&self, id: &InventoryId) -> Result<Inventory, CatalogError> {
        self.core
            .store()
            .inventories()
            .get(id)?
            .ok_or(CatalogError::NotFound)
    }

    pub fn list_inventories(
        &self,
        filter: &InventoryFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Inventory>, CatalogError> {
        let request = PageRequest::normalized(page, page_size);
        let inventories = self.core.store().inventories();
        let total = inventories.count(filter)?;
        let items = inventories.list(filter, request)?;
        Ok(Page {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        })
    }

    pub fn get_booking(&self, id: &BookingId) -> Result<Booking, CatalogError> {
        self.core
            .store()
            .bookings()
            .get(id)?
            .ok_or(CatalogError::NotFound)
    }

    pub fn list_user_bookings(
        &self,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Booking>, CatalogError> {
        let request = PageRequest::normalized(page, page_size);
        let bookings = self.core.store().bookings();
        let total = bookings.count_by_user(user_id)?;
        let items = bookings.list_by_user(user_id, request)?;
        Ok(Page {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        })
    }

    /// Consistent read of capacity, availability and confirmed tickets.
    pub fn ledger(&self, id: &InventoryId) -> Result<InventoryLedger, CatalogError> {
        self.core
            .store()
            .with_read_tx(|tx| -> Result<InventoryLedger, CatalogError> {
                let inventory = tx.inventories().get_for_update(id)?;
                let confirmed_tickets = tx.bookings().confirmed_tickets(id)?;
                Ok(InventoryLedger {
                    total_capacity: inventory.total_capacity,
                    available: inventory.available,
                    confirmed_tickets,
                })
            })
    }
}
