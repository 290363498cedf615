//! Item list controller: fetch state machine, navigation and the
//! refetch-or-ignore decision for inbound sync messages.
//!
//! The controller displays exactly one folder scope at a time. Sync messages
//! describe a scope, not a delta, so reacting to one is always a full
//! refetch of the displayed scope; messages for any other scope are ignored
//! because navigating there refetches anyway.

use std::sync::{Arc, Mutex};

use super::model::{Breadcrumb, Item, ItemUpdate, ListQuery, NewItem};
use super::store::{ItemStore, StoreError};
use crate::sync::{ItemAction, OwnerType, SyncCoordinator, SyncMessage};

/// Fetch status of the displayed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStatus {
    /// No fetch has run yet.
    Idle,
    /// A fetch is in flight.
    Pending,
    /// The last fetch succeeded.
    Success,
    /// The last fetch failed; see [`error`](ItemListController::error).
    Error,
}

/// The folder and ownership scope currently displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewScope {
    /// Displayed folder id; empty string = root.
    pub parent_id: String,
    /// Displayed ownership scope.
    pub owner_type: OwnerType,
}

impl ViewScope {
    /// Root of the org-wide tree.
    pub fn root() -> Self {
        Self {
            parent_id: String::new(),
            owner_type: OwnerType::Org,
        }
    }

    /// Whether an inbound change signal warrants refetching this scope.
    ///
    /// Personal-scope messages attributed to a different user are dropped
    /// first: that change is invisible to this viewer. An unknown local
    /// identity counts as a different user. After that, only an exact
    /// folder-and-ownership match refreshes.
    pub fn wants_refresh(&self, message: &SyncMessage, local_user: Option<&str>) -> bool {
        let SyncMessage::ItemsChanged {
            parent_id,
            owner_type,
            user_id,
            ..
        } = message
        else {
            return false;
        };
        if *owner_type == OwnerType::Personal {
            if let Some(user_id) = user_id {
                if local_user != Some(user_id.as_str()) {
                    return false;
                }
            }
        }
        parent_id == &self.parent_id && *owner_type == self.owner_type
    }
}

struct ViewState {
    items: Vec<Item>,
    status: ListStatus,
    error: Option<String>,
    scope: ViewScope,
    breadcrumbs: Vec<Breadcrumb>,
}

/// Controller for one displayed item list.
///
/// Owns the view scope and fetch lifecycle, mutates through the remote
/// store, and answers inbound sync messages with refetch-or-ignore. Mutation
/// methods notify peers through the coordinator after the store accepts the
/// change.
pub struct ItemListController {
    store: Arc<dyn ItemStore>,
    sync: Arc<SyncCoordinator>,
    state: Mutex<ViewState>,
    local_user: Mutex<Option<String>>,
}

impl ItemListController {
    /// Create a controller displaying the org root.
    pub fn new(store: Arc<dyn ItemStore>, sync: Arc<SyncCoordinator>) -> Self {
        Self {
            store,
            sync,
            state: Mutex::new(ViewState {
                items: Vec::new(),
                status: ListStatus::Idle,
                error: None,
                scope: ViewScope::root(),
                breadcrumbs: Vec::new(),
            }),
            local_user: Mutex::new(None),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ViewState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Currently loaded items.
    pub fn items(&self) -> Vec<Item> {
        self.with_state(|s| s.items.clone())
    }

    /// Current fetch status.
    pub fn status(&self) -> ListStatus {
        self.with_state(|s| s.status)
    }

    /// Last fetch error, when the status is [`ListStatus::Error`].
    pub fn error(&self) -> Option<String> {
        self.with_state(|s| s.error.clone())
    }

    /// The displayed scope.
    pub fn scope(&self) -> ViewScope {
        self.with_state(|s| s.scope.clone())
    }

    /// Navigation trail from the root to the displayed folder.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.with_state(|s| s.breadcrumbs.clone())
    }

    /// Fetch the displayed scope from the store.
    ///
    /// Concurrent calls race benignly: each one replaces the list with what
    /// the store returned, so the last response wins.
    pub async fn fetch_items(&self) {
        let scope = self.with_state(|s| {
            s.status = ListStatus::Pending;
            s.error = None;
            s.scope.clone()
        });
        let query = ListQuery {
            parent_id: scope.parent_id,
            owner_type: scope.owner_type,
            category: String::new(),
        };
        match self.store.list_items(&query).await {
            Ok(items) => self.with_state(|s| {
                s.items = items;
                s.status = ListStatus::Success;
            }),
            Err(e) => {
                log::warn!("[ItemList] Fetch failed: {}", e);
                self.with_state(|s| {
                    s.status = ListStatus::Error;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    /// Create an item, refresh the list, notify peers.
    ///
    /// A missing `parent_id` or `owner_type` defaults to the displayed
    /// scope, and the notification always describes the scope the item
    /// actually landed in.
    pub async fn create_item(&self, mut item: NewItem) -> Result<(), StoreError> {
        let scope = self.scope();
        let parent_id = item.parent_id.clone().unwrap_or_else(|| scope.parent_id.clone());
        let owner_type = item.owner_type.unwrap_or(scope.owner_type);
        item.parent_id = Some(parent_id.clone());
        item.owner_type = Some(owner_type);

        self.store.create_item(&item).await?;
        self.fetch_items().await;
        self.sync.notify_change(ItemAction::Create, parent_id, owner_type);
        Ok(())
    }

    /// Update an item's fields, refresh the list, notify peers.
    pub async fn update_item(&self, id: &str, changes: &ItemUpdate) -> Result<(), StoreError> {
        self.store.update_item(id, changes).await?;
        self.fetch_items().await;
        let scope = self.scope();
        self.sync.notify_change(ItemAction::Update, scope.parent_id, scope.owner_type);
        Ok(())
    }

    /// Delete an item and notify peers. The local list is pruned in place
    /// instead of refetched.
    pub async fn delete_item(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete_item(id).await?;
        self.with_state(|s| s.items.retain(|item| item.id != id));
        let scope = self.scope();
        self.sync.notify_change(ItemAction::Delete, scope.parent_id, scope.owner_type);
        Ok(())
    }

    /// Move an item to another folder, refresh the list, notify peers.
    pub async fn move_item(&self, id: &str, new_parent_id: &str) -> Result<(), StoreError> {
        self.store.move_item(id, new_parent_id).await?;
        self.fetch_items().await;
        let scope = self.scope();
        self.sync.notify_change(ItemAction::Move, scope.parent_id, scope.owner_type);
        Ok(())
    }

    /// Switch an item between org and personal ownership, refresh, notify.
    pub async fn change_ownership(
        &self,
        id: &str,
        new_owner_type: OwnerType,
    ) -> Result<(), StoreError> {
        self.store.change_ownership(id, new_owner_type).await?;
        self.fetch_items().await;
        let scope = self.scope();
        self.sync
            .notify_change(ItemAction::OwnershipChange, scope.parent_id, scope.owner_type);
        Ok(())
    }

    /// Find items by barcode across all folders.
    pub async fn search_by_barcode(&self, barcode: &str) -> Result<Vec<Item>, StoreError> {
        self.store.search_by_barcode(barcode).await
    }

    /// Fetch one item by id.
    pub async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
        self.store.get_item(id).await
    }

    /// Descend into a folder item and fetch its contents.
    pub async fn navigate_to_child(&self, item: &Item) {
        self.with_state(|s| {
            s.breadcrumbs.push(Breadcrumb {
                id: item.id.clone(),
                name: item.name.clone(),
            });
            s.scope.parent_id = item.id.clone();
        });
        self.fetch_items().await;
    }

    /// Jump back to the root folder.
    pub async fn navigate_to_root(&self) {
        self.with_state(|s| {
            s.breadcrumbs.clear();
            s.scope.parent_id.clear();
        });
        self.fetch_items().await;
    }

    /// Jump to a breadcrumb by index, truncating the trail below it.
    pub async fn navigate_to_breadcrumb(&self, index: usize) {
        self.with_state(|s| {
            s.breadcrumbs.truncate(index + 1);
            s.scope.parent_id = s
                .breadcrumbs
                .get(index)
                .map(|crumb| crumb.id.clone())
                .unwrap_or_default();
        });
        self.fetch_items().await;
    }

    /// Switch the displayed ownership scope and refetch.
    pub async fn set_owner_type(&self, owner_type: OwnerType) {
        self.with_state(|s| s.scope.owner_type = owner_type);
        self.fetch_items().await;
    }

    /// Apply one inbound sync message: refetch if it targets the displayed
    /// scope, ignore otherwise.
    pub async fn handle_sync_message(&self, message: &SyncMessage) {
        let scope = self.scope();
        let local_user = match self.local_user.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        if scope.wants_refresh(message, local_user.as_deref()) {
            log::debug!("[ItemList] Change in displayed scope, refetching");
            self.fetch_items().await;
        }
    }

    /// Subscribe to the coordinator and start live sync.
    ///
    /// The local identity is captured once here; a later token change takes
    /// effect the next time sync starts.
    pub fn start_sync(self: &Arc<Self>) {
        if let Ok(mut local_user) = self.local_user.lock() {
            *local_user = self.sync.user_id();
        }
        let mut subscription = self.sync.subscribe();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                controller.handle_sync_message(&message).await;
            }
        });
        self.sync.start();
    }

    /// Stop live sync for this controller's coordinator.
    pub async fn stop_sync(&self) {
        self.sync.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionContext;
    use crate::sync::{
        ConnectionConfig, SyncTransport, TransportConnector, TransportError, Visibility,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    fn changed(parent_id: &str, owner_type: OwnerType) -> SyncMessage {
        SyncMessage::items_changed(ItemAction::Update, parent_id, owner_type)
    }

    fn personal_change(parent_id: &str, user_id: &str) -> SyncMessage {
        SyncMessage::ItemsChanged {
            action: ItemAction::Update,
            parent_id: parent_id.to_string(),
            owner_type: OwnerType::Personal,
            user_id: Some(user_id.to_string()),
        }
    }

    #[test]
    fn test_wants_refresh_on_exact_scope_match() {
        let scope = ViewScope::root();
        assert!(scope.wants_refresh(&changed("", OwnerType::Org), None));
        assert!(!scope.wants_refresh(&changed("f1", OwnerType::Org), None));
        assert!(!scope.wants_refresh(&changed("", OwnerType::Personal), None));
    }

    #[test]
    fn test_wants_refresh_suppresses_other_users_personal_changes() {
        let scope = ViewScope {
            parent_id: String::new(),
            owner_type: OwnerType::Personal,
        };
        // Someone else's personal change: never relevant.
        assert!(!scope.wants_refresh(&personal_change("", "them"), Some("me")));
        // Own personal change from another tab or device: refetch.
        assert!(scope.wants_refresh(&personal_change("", "me"), Some("me")));
        // Unknown local identity counts as a different user.
        assert!(!scope.wants_refresh(&personal_change("", "them"), None));
        // Personal change without attribution falls through to scope match.
        assert!(scope.wants_refresh(&changed("", OwnerType::Personal), None));
    }

    #[test]
    fn test_wants_refresh_ignores_unknown_messages() {
        let scope = ViewScope::root();
        assert!(!scope.wants_refresh(&SyncMessage::Other, Some("me")));
    }

    #[derive(Default)]
    struct FakeStore {
        list_calls: AtomicUsize,
        fail_listing: bool,
        items: Mutex<Vec<Item>>,
        last_created: Mutex<Option<NewItem>>,
    }

    fn sample_item(id: &str, parent_id: &str) -> Item {
        Item {
            id: id.to_string(),
            name: format!("Item {}", id),
            parent_id: parent_id.to_string(),
            owner_type: OwnerType::Org,
            barcode: String::new(),
            category: String::new(),
            description: String::new(),
            image_url: String::new(),
            url: String::new(),
            quantity: 1,
        }
    }

    #[async_trait]
    impl ItemStore for FakeStore {
        async fn list_items(&self, _query: &ListQuery) -> Result<Vec<Item>, StoreError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing {
                return Err(StoreError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(self.items.lock().unwrap().clone())
        }

        async fn create_item(&self, item: &NewItem) -> Result<Item, StoreError> {
            *self.last_created.lock().unwrap() = Some(item.clone());
            Ok(sample_item("new", item.parent_id.as_deref().unwrap_or("")))
        }

        async fn update_item(&self, id: &str, _changes: &ItemUpdate) -> Result<Item, StoreError> {
            Ok(sample_item(id, ""))
        }

        async fn delete_item(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn move_item(&self, _id: &str, _new_parent_id: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn change_ownership(
            &self,
            _id: &str,
            _new_owner_type: OwnerType,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
            Ok(Some(sample_item(id, "")))
        }

        async fn search_by_barcode(&self, _barcode: &str) -> Result<Vec<Item>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct OfflineConnector;

    #[async_trait]
    impl TransportConnector for OfflineConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn SyncTransport>, TransportError> {
            Err(TransportError::ConnectionFailed("offline".to_string()))
        }
    }

    fn controller_with(store: Arc<FakeStore>) -> Arc<ItemListController> {
        let session = Arc::new(SessionContext::new());
        // The connection is disabled, so the visibility sender can drop.
        let (_visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
        let sync = Arc::new(SyncCoordinator::new(
            ConnectionConfig::disabled(),
            Arc::new(OfflineConnector),
            session,
            visibility_rx,
            None,
        ));
        Arc::new(ItemListController::new(store, sync))
    }

    #[tokio::test]
    async fn test_fetch_transitions_idle_pending_success() {
        let store = Arc::new(FakeStore::default());
        store.items.lock().unwrap().push(sample_item("i1", ""));
        let controller = controller_with(Arc::clone(&store));

        assert_eq!(controller.status(), ListStatus::Idle);
        controller.fetch_items().await;
        assert_eq!(controller.status(), ListStatus::Success);
        assert_eq!(controller.items().len(), 1);
        assert!(controller.error().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_error_state() {
        let store = Arc::new(FakeStore {
            fail_listing: true,
            ..FakeStore::default()
        });
        let controller = controller_with(store);

        controller.fetch_items().await;
        assert_eq!(controller.status(), ListStatus::Error);
        assert!(controller.error().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_matching_sync_message_triggers_exactly_one_refetch() {
        let store = Arc::new(FakeStore::default());
        let controller = controller_with(Arc::clone(&store));

        controller
            .handle_sync_message(&changed("", OwnerType::Org))
            .await;
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_message_for_other_scope_is_ignored() {
        let store = Arc::new(FakeStore::default());
        let controller = controller_with(Arc::clone(&store));

        controller
            .handle_sync_message(&changed("elsewhere", OwnerType::Org))
            .await;
        controller
            .handle_sync_message(&personal_change("", "someone-else"))
            .await;
        assert_eq!(store.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_prunes_locally_without_refetch() {
        let store = Arc::new(FakeStore::default());
        {
            let mut items = store.items.lock().unwrap();
            items.push(sample_item("i1", ""));
            items.push(sample_item("i2", ""));
        }
        let controller = controller_with(Arc::clone(&store));

        controller.fetch_items().await;
        assert_eq!(controller.items().len(), 2);
        let fetches_before = store.list_calls.load(Ordering::SeqCst);

        controller.delete_item("i1").await.unwrap();
        let ids: Vec<String> = controller.items().iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["i2".to_string()]);
        assert_eq!(store.list_calls.load(Ordering::SeqCst), fetches_before);
    }

    #[tokio::test]
    async fn test_create_defaults_to_displayed_scope() {
        let store = Arc::new(FakeStore::default());
        let controller = controller_with(Arc::clone(&store));

        controller.navigate_to_child(&sample_item("f1", "")).await;
        controller.create_item(NewItem::named("Cable")).await.unwrap();

        let created = store.last_created.lock().unwrap().clone().unwrap();
        assert_eq!(created.parent_id.as_deref(), Some("f1"));
        assert_eq!(created.owner_type, Some(OwnerType::Org));
    }

    #[tokio::test]
    async fn test_navigation_maintains_breadcrumbs() {
        let store = Arc::new(FakeStore::default());
        let controller = controller_with(Arc::clone(&store));

        controller.navigate_to_child(&sample_item("f1", "")).await;
        controller.navigate_to_child(&sample_item("f2", "f1")).await;
        assert_eq!(controller.scope().parent_id, "f2");
        assert_eq!(controller.breadcrumbs().len(), 2);

        controller.navigate_to_breadcrumb(0).await;
        assert_eq!(controller.scope().parent_id, "f1");
        assert_eq!(controller.breadcrumbs().len(), 1);

        controller.navigate_to_root().await;
        assert_eq!(controller.scope().parent_id, "");
        assert!(controller.breadcrumbs().is_empty());
    }
}
