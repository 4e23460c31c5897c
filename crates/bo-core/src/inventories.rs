use crate::error::StoreError;
use crate::types::{
    CreateInventoryInput, Inventory, InventoryDetails, InventoryFilter, InventoryId, PageRequest,
};

pub trait InventoryRepository {
    /// Inserts a record with `available = total_capacity` and `version = 1`.
    fn create(&self, input: CreateInventoryInput) -> Result<Inventory, StoreError>;
    fn get(&self, id: &InventoryId) -> Result<Option<Inventory>, StoreError>;
    /// Locked read: only valid inside `Store::with_tx`, where the caller holds
    /// the exclusive lock until commit or rollback.
    fn get_for_update(&self, id: &InventoryId) -> Result<Inventory, StoreError>;
    /// Applies `details` only if the stored version still equals
    /// `expected_version`, bumping the version on success. Ticket counts are
    /// never touched here; they move only together with a booking row.
    fn conditional_update(
        &self,
        id: &InventoryId,
        expected_version: u64,
        details: InventoryDetails,
    ) -> Result<Inventory, StoreError>;
    fn list(&self, filter: &InventoryFilter, page: PageRequest)
    -> Result<Vec<Inventory>, StoreError>;
    fn count(&self, filter: &InventoryFilter) -> Result<u64, StoreError>;
}
