//! Remote item store trait.

use async_trait::async_trait;

use super::model::{Item, ItemUpdate, ListQuery, NewItem};
use crate::sync::OwnerType;

/// Error from a remote item operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request itself failed (network, TLS, timeout).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body text, if any.
        message: String,
    },
}

/// Remote CRUD operations over the item tree.
///
/// The store is the authoritative state. Sync messages never flow through
/// it; the list controller mutates here first and then asks the coordinator
/// to notify peers.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// List the items in one folder scope.
    async fn list_items(&self, query: &ListQuery) -> Result<Vec<Item>, StoreError>;

    /// Create an item and return it as stored.
    async fn create_item(&self, item: &NewItem) -> Result<Item, StoreError>;

    /// Update an item's fields and return the new version.
    async fn update_item(&self, id: &str, changes: &ItemUpdate) -> Result<Item, StoreError>;

    /// Delete an item.
    async fn delete_item(&self, id: &str) -> Result<(), StoreError>;

    /// Move an item to a new parent folder (empty string = root).
    async fn move_item(&self, id: &str, new_parent_id: &str) -> Result<(), StoreError>;

    /// Switch an item between org and personal ownership.
    async fn change_ownership(&self, id: &str, new_owner_type: OwnerType)
    -> Result<(), StoreError>;

    /// Fetch one item; `None` if it does not exist.
    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError>;

    /// Find items by barcode across all folders the caller can see.
    async fn search_by_barcode(&self, barcode: &str) -> Result<Vec<Item>, StoreError>;
}
