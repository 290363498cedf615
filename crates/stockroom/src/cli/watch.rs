//! Watch command: stream live item-change events to stdout.

use std::sync::Arc;

use stockroom_core::config::Config;
use stockroom_core::session::SessionContext;
use stockroom_core::sync::{ConnectionConfig, SyncCoordinator, TokioConnector, Visibility};
use tokio::sync::watch;

/// Connect to the sync server and print every item change until Ctrl-C.
///
/// Events are printed one JSON object per line, so the output can be piped
/// into `jq` or a log file.
pub async fn handle_watch(config: &Config) {
    let Some(sync_url) = config.sync_url.clone() else {
        eprintln!("No sync server configured. Set --sync-url or STOCKROOM_SYNC_URL.");
        return;
    };
    let (Some(token), Some(org_id)) = (config.token.clone(), config.org_id.clone()) else {
        eprintln!("Missing credentials. Set --token and --org-id.");
        return;
    };

    let session = Arc::new(SessionContext::with_credentials(token, org_id.clone()));
    // A headless process is always "visible": reconnects never pause.
    let (_visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let coordinator = SyncCoordinator::new(
        ConnectionConfig::new(sync_url),
        Arc::new(TokioConnector),
        session,
        visibility_rx,
        None,
    );

    let mut subscription = coordinator.subscribe();
    let mut connected = coordinator.connected();
    coordinator.start();

    println!("Watching item changes for organization {} (Ctrl-C to quit)", org_id);

    loop {
        tokio::select! {
            message = subscription.recv() => {
                match message {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(line) => println!("{}", line),
                        Err(e) => eprintln!("Failed to encode message: {}", e),
                    },
                    None => break,
                }
            }
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                if *connected.borrow() {
                    println!("Connected");
                } else {
                    println!("Disconnected, retrying...");
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    eprintln!("Signal error: {}", e);
                }
                println!();
                println!("Shutting down...");
                break;
            }
        }
    }

    coordinator.stop().await;
}
