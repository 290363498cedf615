//! Item model, remote store and list controller.

mod http;
mod list;
mod model;
mod store;

pub use http::HttpItemStore;
pub use list::{ItemListController, ListStatus, ViewScope};
pub use model::{Breadcrumb, Item, ItemUpdate, ListQuery, NewItem};
pub use store::{ItemStore, StoreError};
