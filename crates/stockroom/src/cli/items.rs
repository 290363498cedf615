//! Items command family: CRUD over the HTTP store, with peer notification
//! after successful mutations.

use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use stockroom_core::config::Config;
use stockroom_core::items::{HttpItemStore, Item, ItemStore, ItemUpdate, ListQuery, NewItem};
use stockroom_core::session::SessionContext;
use stockroom_core::sync::{
    ConnectionConfig, ItemAction, OwnerType, SyncCoordinator, TokioConnector, Visibility,
};

/// Item subcommands.
#[derive(Subcommand)]
pub enum ItemCommands {
    /// List items in a folder scope
    List {
        /// Folder id; omit for the root
        #[arg(long, default_value = "")]
        parent: String,
        /// Ownership scope: org or personal
        #[arg(long, default_value = "org")]
        owner: String,
    },
    /// Create an item
    Create {
        /// Display name
        name: String,
        /// Parent folder id; omit for the root
        #[arg(long, default_value = "")]
        parent: String,
        /// Ownership scope: org or personal
        #[arg(long, default_value = "org")]
        owner: String,
        /// Product barcode
        #[arg(long, default_value = "")]
        barcode: String,
        /// Category label
        #[arg(long, default_value = "")]
        category: String,
        /// Quantity on hand
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
    /// Update an item's fields
    Update {
        /// Item id
        id: String,
        /// New display name
        #[arg(long)]
        name: String,
        /// Product barcode
        #[arg(long, default_value = "")]
        barcode: String,
        /// Category label
        #[arg(long, default_value = "")]
        category: String,
        /// Quantity on hand
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
    /// Delete an item
    Delete {
        /// Item id
        id: String,
    },
    /// Move an item to another folder
    Move {
        /// Item id
        id: String,
        /// Destination folder id; omit for the root
        #[arg(long, default_value = "")]
        to: String,
    },
    /// Switch an item between org and personal ownership
    Ownership {
        /// Item id
        id: String,
        /// New scope: org or personal
        owner: String,
    },
    /// Search items by barcode
    Search {
        /// Barcode to look for
        barcode: String,
    },
    /// Show one item
    Get {
        /// Item id
        id: String,
    },
}

fn parse_owner(raw: &str) -> Option<OwnerType> {
    match raw {
        "org" => Some(OwnerType::Org),
        "personal" => Some(OwnerType::Personal),
        _ => {
            eprintln!("Unknown owner type '{}'. Use org or personal.", raw);
            None
        }
    }
}

/// Execute an items subcommand.
pub async fn handle_items(config: &Config, command: ItemCommands) {
    let session = Arc::new(match (config.token.clone(), config.org_id.clone()) {
        (Some(token), Some(org_id)) => SessionContext::with_credentials(token, org_id),
        _ => SessionContext::new(),
    });
    let store = HttpItemStore::new(config.api_url.clone(), Arc::clone(&session));

    match command {
        ItemCommands::List { parent, owner } => {
            let Some(owner_type) = parse_owner(&owner) else { return };
            let query = ListQuery {
                parent_id: parent,
                owner_type,
                category: String::new(),
            };
            match store.list_items(&query).await {
                Ok(items) => print_items(&items),
                Err(e) => eprintln!("Error listing items: {}", e),
            }
        }
        ItemCommands::Create {
            name,
            parent,
            owner,
            barcode,
            category,
            quantity,
        } => {
            let Some(owner_type) = parse_owner(&owner) else { return };
            let item = NewItem {
                name,
                parent_id: Some(parent.clone()),
                owner_type: Some(owner_type),
                barcode,
                category,
                quantity,
                ..NewItem::default()
            };
            match store.create_item(&item).await {
                Ok(created) => {
                    println!("Created {} ({})", created.name, created.id);
                    notify(config, &session, ItemAction::Create, &parent, owner_type).await;
                }
                Err(e) => eprintln!("Error creating item: {}", e),
            }
        }
        ItemCommands::Update {
            id,
            name,
            barcode,
            category,
            quantity,
        } => {
            let changes = ItemUpdate {
                name,
                barcode,
                category,
                quantity,
                ..ItemUpdate::default()
            };
            match store.update_item(&id, &changes).await {
                Ok(updated) => {
                    println!("Updated {} ({})", updated.name, updated.id);
                    notify(
                        config,
                        &session,
                        ItemAction::Update,
                        &updated.parent_id,
                        updated.owner_type,
                    )
                    .await;
                }
                Err(e) => eprintln!("Error updating item: {}", e),
            }
        }
        ItemCommands::Delete { id } => {
            // Look the scope up first; after the delete it is gone.
            let scope = match store.get_item(&id).await {
                Ok(Some(item)) => Some((item.parent_id, item.owner_type)),
                _ => None,
            };
            match store.delete_item(&id).await {
                Ok(()) => {
                    println!("Deleted {}", id);
                    if let Some((parent_id, owner_type)) = scope {
                        notify(config, &session, ItemAction::Delete, &parent_id, owner_type).await;
                    }
                }
                Err(e) => eprintln!("Error deleting item: {}", e),
            }
        }
        ItemCommands::Move { id, to } => {
            match store.move_item(&id, &to).await {
                Ok(()) => {
                    let destination = if to.is_empty() { "root" } else { to.as_str() };
                    println!("Moved {} to {}", id, destination);
                    if let Ok(Some(item)) = store.get_item(&id).await {
                        notify(config, &session, ItemAction::Move, &item.parent_id, item.owner_type)
                            .await;
                    }
                }
                Err(e) => eprintln!("Error moving item: {}", e),
            }
        }
        ItemCommands::Ownership { id, owner } => {
            let Some(owner_type) = parse_owner(&owner) else { return };
            match store.change_ownership(&id, owner_type).await {
                Ok(()) => {
                    println!("Changed ownership of {} to {}", id, owner_type.as_str());
                    if let Ok(Some(item)) = store.get_item(&id).await {
                        notify(
                            config,
                            &session,
                            ItemAction::OwnershipChange,
                            &item.parent_id,
                            item.owner_type,
                        )
                        .await;
                    }
                }
                Err(e) => eprintln!("Error changing ownership: {}", e),
            }
        }
        ItemCommands::Search { barcode } => match store.search_by_barcode(&barcode).await {
            Ok(items) => print_items(&items),
            Err(e) => eprintln!("Error searching: {}", e),
        },
        ItemCommands::Get { id } => match store.get_item(&id).await {
            Ok(Some(item)) => print_item_detail(&item),
            Ok(None) => println!("Item {} not found", id),
            Err(e) => eprintln!("Error fetching item: {}", e),
        },
    }
}

/// Announce a mutation the way the app does: best effort, fire-and-forget.
///
/// Opens the sync connection briefly; if it cannot open in time the message
/// is dropped, which peers absorb on their next refetch.
async fn notify(
    config: &Config,
    session: &Arc<SessionContext>,
    action: ItemAction,
    parent_id: &str,
    owner_type: OwnerType,
) {
    let Some(sync_url) = config.sync_url.clone() else {
        return;
    };
    let (_visibility_tx, visibility_rx) = tokio::sync::watch::channel(Visibility::Visible);
    let coordinator = SyncCoordinator::new(
        ConnectionConfig::new(sync_url),
        Arc::new(TokioConnector),
        Arc::clone(session),
        visibility_rx,
        None,
    );
    coordinator.start();

    let mut connected = coordinator.connected();
    let _ = tokio::time::timeout(Duration::from_secs(3), async {
        while !*connected.borrow_and_update() {
            if connected.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    coordinator.notify_change(action, parent_id, owner_type);
    // Give the frame a moment to flush before closing the socket.
    tokio::time::sleep(Duration::from_millis(100)).await;
    coordinator.stop().await;
}

fn print_items(items: &[Item]) {
    if items.is_empty() {
        println!("No items.");
        return;
    }
    for item in items {
        let quantity = if item.quantity != 1 {
            format!("  x{}", item.quantity)
        } else {
            String::new()
        };
        println!("{}  {}{}", item.id, item.name, quantity);
    }
}

fn print_item_detail(item: &Item) {
    println!("{} ({})", item.name, item.id);
    println!("  owner: {}", item.owner_type.as_str());
    let parent = if item.parent_id.is_empty() {
        "root"
    } else {
        item.parent_id.as_str()
    };
    println!("  folder: {}", parent);
    println!("  quantity: {}", item.quantity);
    if !item.barcode.is_empty() {
        println!("  barcode: {}", item.barcode);
    }
    if !item.category.is_empty() {
        println!("  category: {}", item.category);
    }
    if !item.description.is_empty() {
        println!("  description: {}", item.description);
    }
    if !item.url.is_empty() {
        println!("  url: {}", item.url);
    }
    if !item.image_url.is_empty() {
        println!("  image: {}", item.image_url);
    }
}
