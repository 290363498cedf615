//! Item data model shared by the store and the list controller.

use serde::{Deserialize, Serialize};

use crate::sync::OwnerType;

fn default_quantity() -> u32 {
    1
}

/// One inventory item. Folders are items too; their children carry the
/// folder's id as `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique item id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent folder id; empty string = root.
    #[serde(default)]
    pub parent_id: String,
    /// Ownership scope.
    pub owner_type: OwnerType,
    /// Product barcode, if one was scanned.
    #[serde(default)]
    pub barcode: String,
    /// Free-form category label.
    #[serde(default)]
    pub category: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// URL of an attached photo.
    #[serde(default)]
    pub image_url: String,
    /// External product URL.
    #[serde(default)]
    pub url: String,
    /// Quantity on hand.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// Payload for creating an item.
///
/// `parent_id` and `owner_type` are optional: the list controller fills them
/// from the displayed scope when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    /// Display name.
    pub name: String,
    /// Target folder; `None` = the currently displayed folder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Ownership scope; `None` = the currently displayed scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_type: Option<OwnerType>,
    /// Product barcode.
    #[serde(default)]
    pub barcode: String,
    /// Free-form category label.
    #[serde(default)]
    pub category: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// URL of an attached photo.
    #[serde(default)]
    pub image_url: String,
    /// External product URL.
    #[serde(default)]
    pub url: String,
    /// Quantity on hand.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl NewItem {
    /// A named item with every other field at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for NewItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent_id: None,
            owner_type: None,
            barcode: String::new(),
            category: String::new(),
            description: String::new(),
            image_url: String::new(),
            url: String::new(),
            quantity: 1,
        }
    }
}

/// Payload for updating an item's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    /// Display name.
    pub name: String,
    /// Product barcode.
    #[serde(default)]
    pub barcode: String,
    /// Free-form category label.
    #[serde(default)]
    pub category: String,
    /// Longer description.
    #[serde(default)]
    pub description: String,
    /// URL of an attached photo.
    #[serde(default)]
    pub image_url: String,
    /// External product URL.
    #[serde(default)]
    pub url: String,
    /// Quantity on hand.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl Default for ItemUpdate {
    fn default() -> Self {
        Self {
            name: String::new(),
            barcode: String::new(),
            category: String::new(),
            description: String::new(),
            image_url: String::new(),
            url: String::new(),
            quantity: 1,
        }
    }
}

/// Query for listing one folder scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Folder to list; empty string = root.
    pub parent_id: String,
    /// Ownership scope to list.
    pub owner_type: OwnerType,
    /// Category filter; empty = all categories.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
}

/// One entry in the navigation trail from the root to the displayed folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Folder item id.
    pub id: String,
    /// Folder display name at the time it was entered.
    pub name: String,
}
