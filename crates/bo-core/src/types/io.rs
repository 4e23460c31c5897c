use crate::types::ids::{BookingId, InventoryId};
use crate::types::inventory::BookingWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Case folding used by every text filter. SQL-backed stores register this
/// same function so their matching agrees with `InventoryFilter::matches`.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub inventory_id: InventoryId,
    pub user_id: String,
    pub ticket_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub booking_id: BookingId,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInventoryInput {
    pub name: String,
    pub artist: String,
    pub venue: String,
    pub event_date: DateTime<Utc>,
    pub price_cents: u64,
    pub total_capacity: u32,
    pub booking_window: BookingWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFilter {
    pub name: Option<String>,
    pub artist: Option<String>,
    pub venue: Option<String>,
    pub event_from: Option<DateTime<Utc>>,
    pub event_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_only: bool,
}

impl InventoryFilter {
    /// Case-insensitive substring match for the text filters, inclusive range
    /// for the event date.
    pub fn matches(&self, inventory: &crate::types::Inventory) -> bool {
        fn contains(haystack: &str, needle: Option<&String>) -> bool {
            needle.is_none_or(|needle| fold_case(haystack).contains(&fold_case(needle)))
        }

        contains(&inventory.name, self.name.as_ref())
            && contains(&inventory.artist, self.artist.as_ref())
            && contains(&inventory.venue, self.venue.as_ref())
            && self.event_from.is_none_or(|from| inventory.event_date >= from)
            && self.event_to.is_none_or(|to| inventory.event_date <= to)
            && (!self.available_only || inventory.available > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Clamps out-of-range values: page 0 becomes 1, a page size outside
    /// `1..=100` becomes the default of 20.
    pub fn normalized(page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        Self { page, page_size }
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::normalized(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_out_of_range_values() {
        assert_eq!(
            PageRequest::normalized(0, 0),
            PageRequest {
                page: 1,
                page_size: 20
            }
        );
        assert_eq!(PageRequest::normalized(3, 101).page_size, 20);
        assert_eq!(PageRequest::normalized(3, 100).page_size, 100);
    }

    #[test]
    fn text_filters_fold_non_ascii_case() {
        use crate::types::Inventory;

        let now = Utc::now();
        let inventory = Inventory {
            id: InventoryId::generate(),
            name: "Récital".to_string(),
            artist: "Édith Piaf".to_string(),
            venue: "Olympia".to_string(),
            event_date: now,
            price_cents: 5000,
            total_capacity: 10,
            available: 10,
            booking_window: BookingWindow::new(now, now),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let by_artist = InventoryFilter {
            artist: Some("édith".to_string()),
            ..InventoryFilter::default()
        };
        assert!(by_artist.matches(&inventory));
        let by_name = InventoryFilter {
            name: Some("RÉCI".to_string()),
            ..InventoryFilter::default()
        };
        assert!(by_name.matches(&inventory));
        let miss = InventoryFilter {
            artist: Some("edith".to_string()),
            ..InventoryFilter::default()
        };
        assert!(!miss.matches(&inventory));
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(PageRequest::normalized(1, 25).offset(), 0);
        assert_eq!(PageRequest::normalized(3, 25).offset(), 50);
    }
}
