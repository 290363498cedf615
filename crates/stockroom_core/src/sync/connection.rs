//! Persistent WebSocket connection to the items sync endpoint.
//!
//! One supervisor task owns the connection lifecycle: it builds the URL from
//! the session credentials, connects, runs the frame loop, and on any close
//! schedules a reconnect with exponential backoff plus jitter. Retries never
//! give up while the client runs. A hidden page schedules no reconnect
//! timers (an already-open connection is left alone), and regaining
//! visibility reconnects immediately with the backoff reset.
//!
//! Outbound sends are best-effort: while no socket is open, `send()` drops
//! the message. Peers on the same machine still hear about changes through
//! the relay, and remote peers converge on their next refetch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::message::SyncMessage;
use super::transport::{SyncEndpoint, SyncTransport, TransportConnector, WsMessage};
use crate::session::SessionContext;

/// Page or application visibility, injected by the embedding platform.
///
/// Headless embedders (CLI, tests) hold a
/// `watch::channel(Visibility::Visible)` and never flip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The client is foregrounded; reconnects run normally.
    Visible,
    /// The client is backgrounded; no reconnect timers are scheduled.
    Hidden,
}

/// Exponential backoff policy for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Base delay in milliseconds; attempt `n` waits `base * 2^n`.
    pub base_delay_ms: u64,
    /// Cap on the deterministic part of the delay.
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 1000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempts` (0-indexed count of
    /// consecutive failures so far).
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempts));
        let base = std::cmp::min(exp, self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

/// Configuration for the sync connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Sync endpoint; `None` leaves the connection permanently offline.
    pub endpoint: Option<SyncEndpoint>,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectPolicy,
    /// Interval between keepalive pings on an open connection.
    pub ping_interval: Duration,
}

impl ConnectionConfig {
    /// Config for a sync server URL with default backoff and keepalive.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            endpoint: Some(SyncEndpoint::new(server_url)),
            reconnect: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(30),
        }
    }

    /// Config without an endpoint: `connect()` becomes a silent no-op.
    pub fn disabled() -> Self {
        Self {
            endpoint: None,
            reconnect: ReconnectPolicy::default(),
            ping_interval: Duration::from_secs(30),
        }
    }
}

struct ConnectionTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Persistent connection to the items sync endpoint.
///
/// Inbound `SyncMessage`s are pushed into the channel given to [`new`];
/// outbound messages go through [`send`]. The connection itself never
/// interprets message contents.
///
/// [`new`]: SyncConnection::new
/// [`send`]: SyncConnection::send
pub struct SyncConnection {
    config: ConnectionConfig,
    connector: Arc<dyn TransportConnector>,
    session: Arc<SessionContext>,
    visibility: watch::Receiver<Visibility>,
    inbound_tx: mpsc::UnboundedSender<SyncMessage>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<SyncMessage>>>>,
    connected: Arc<watch::Sender<bool>>,
    task: Mutex<Option<ConnectionTask>>,
}

impl SyncConnection {
    /// Create a connection. Nothing happens until [`connect`] is called.
    ///
    /// [`connect`]: SyncConnection::connect
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn TransportConnector>,
        session: Arc<SessionContext>,
        visibility: watch::Receiver<Visibility>,
        inbound_tx: mpsc::UnboundedSender<SyncMessage>,
    ) -> Self {
        Self {
            config,
            connector,
            session,
            visibility,
            inbound_tx,
            outbound: Arc::new(Mutex::new(None)),
            connected: Arc::new(watch::channel(false).0),
            task: Mutex::new(None),
        }
    }

    /// Start the connection supervisor.
    ///
    /// No-op while a supervisor is already running or when no endpoint is
    /// configured. Missing credentials do not fail: the supervisor parks
    /// until the session provides them. Must be called from a Tokio runtime.
    pub fn connect(&self) {
        let Some(endpoint) = self.config.endpoint.clone() else {
            log::debug!("[SyncConnection] No sync endpoint configured, staying offline");
            return;
        };
        let Ok(mut slot) = self.task.lock() else {
            return;
        };
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return;
            }
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = SupervisorCtx {
            endpoint,
            policy: self.config.reconnect.clone(),
            ping_interval: self.config.ping_interval,
            connector: Arc::clone(&self.connector),
            session: Arc::clone(&self.session),
            visibility: self.visibility.clone(),
            inbound_tx: self.inbound_tx.clone(),
            outbound: Arc::clone(&self.outbound),
            connected: Arc::clone(&self.connected),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(run_supervisor(ctx));
        *slot = Some(ConnectionTask {
            shutdown: shutdown_tx,
            handle,
        });
    }

    /// Stop the connection: cancel any pending reconnect, close the socket
    /// with a normal-closure code, and join the supervisor. Safe to call
    /// repeatedly and when never started.
    pub async fn stop(&self) {
        let task = {
            match self.task.lock() {
                Ok(mut slot) => slot.take(),
                Err(_) => None,
            }
        };
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            let _ = task.handle.await;
        }
        self.connected.send_replace(false);
    }

    /// Send a message if the connection is open; drop it otherwise.
    pub fn send(&self, message: SyncMessage) {
        if let Ok(gate) = self.outbound.lock() {
            if let Some(tx) = gate.as_ref() {
                let _ = tx.send(message);
            } else {
                log::debug!("[SyncConnection] Not connected, dropping outbound message");
            }
        }
    }

    /// Observable connection state; `true` while the socket is open.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Whether the socket is currently open.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

struct SupervisorCtx {
    endpoint: SyncEndpoint,
    policy: ReconnectPolicy,
    ping_interval: Duration,
    connector: Arc<dyn TransportConnector>,
    session: Arc<SessionContext>,
    visibility: watch::Receiver<Visibility>,
    inbound_tx: mpsc::UnboundedSender<SyncMessage>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<SyncMessage>>>>,
    connected: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Closed,
    Shutdown,
}

async fn run_supervisor(mut ctx: SupervisorCtx) {
    let mut attempts: u32 = 0;
    loop {
        if *ctx.shutdown.borrow() {
            break;
        }

        // Sync is optional: park until the session has a token and an org.
        let (token, org_id) = match (ctx.session.token(), ctx.session.org_id()) {
            (Some(token), Some(org_id)) => (token, org_id),
            _ => {
                log::debug!("[SyncConnection] Missing credentials, sync idle");
                if wait_for_credentials(&mut ctx).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let url = match ctx.endpoint.items_url(&org_id, &token) {
            Ok(url) => url,
            Err(e) => {
                log::error!("[SyncConnection] Invalid sync URL: {}", e);
                break;
            }
        };

        let transport = tokio::select! {
            result = ctx.connector.connect(&url) => result,
            _ = shutdown_signal(&mut ctx.shutdown) => break,
        };

        match transport {
            Ok(transport) => {
                log::info!("[SyncConnection] Connected");
                attempts = 0; // Reset backoff on success
                let end = run_session(&mut ctx, transport).await;
                if end == SessionEnd::Shutdown {
                    break;
                }
                log::info!("[SyncConnection] Disconnected");
            }
            Err(e) => {
                log::warn!("[SyncConnection] Connection failed: {}", e);
            }
        }

        // Backoff before the next attempt. A hidden page schedules nothing;
        // regaining visibility reconnects immediately from attempt 0.
        let delay = ctx.policy.delay_for(attempts);
        attempts = attempts.saturating_add(1);
        log::debug!(
            "[SyncConnection] Reconnecting in {:?} (attempt {})",
            delay,
            attempts
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_signal(&mut ctx.shutdown) => break,
            _ = visibility_hidden(&mut ctx.visibility) => {
                log::debug!("[SyncConnection] Page hidden, reconnect paused");
                if wait_for_visible(&mut ctx).await.is_err() {
                    break;
                }
                attempts = 0;
            }
        }
    }

    // Final cleanup
    if let Ok(mut gate) = ctx.outbound.lock() {
        *gate = None;
    }
    ctx.connected.send_replace(false);
    log::info!("[SyncConnection] Sync loop exited");
}

/// Run a single connection session until it closes or shutdown is requested.
async fn run_session(ctx: &mut SupervisorCtx, mut transport: Box<dyn SyncTransport>) -> SessionEnd {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SyncMessage>();
    if let Ok(mut gate) = ctx.outbound.lock() {
        *gate = Some(outbound_tx);
    }
    ctx.connected.send_replace(true);

    let mut ping_interval = tokio::time::interval(ctx.ping_interval);
    ping_interval.tick().await; // Consume first immediate tick

    let end = loop {
        tokio::select! {
            msg = transport.recv() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => handle_text_frame(&text, &ctx.inbound_tx),
                    Some(Ok(WsMessage::Binary(_))) => {
                        log::debug!("[SyncConnection] Ignoring unexpected binary frame");
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close)) => {
                        log::info!("[SyncConnection] Connection closed by server");
                        break SessionEnd::Closed;
                    }
                    Some(Err(e)) => {
                        log::warn!("[SyncConnection] WebSocket error: {}", e);
                        break SessionEnd::Closed;
                    }
                    None => break SessionEnd::Closed,
                }
            }
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(text) => {
                            if let Err(e) = transport.send_text(&text).await {
                                log::warn!("[SyncConnection] Send failed: {}", e);
                                break SessionEnd::Closed;
                            }
                        }
                        Err(e) => log::error!("[SyncConnection] Failed to encode message: {}", e),
                    },
                    None => break SessionEnd::Closed,
                }
            }
            _ = ping_interval.tick() => {
                if let Err(e) = transport.send_text("ping").await {
                    log::warn!("[SyncConnection] Keepalive failed: {}", e);
                    break SessionEnd::Closed;
                }
            }
            _ = shutdown_signal(&mut ctx.shutdown) => {
                let _ = transport.close().await;
                break SessionEnd::Shutdown;
            }
        }
    };

    if let Ok(mut gate) = ctx.outbound.lock() {
        *gate = None;
    }
    ctx.connected.send_replace(false);
    if end == SessionEnd::Closed {
        let _ = transport.close().await;
    }
    end
}

/// Route one inbound text frame: heartbeat acks are discarded, sync messages
/// are forwarded, anything else is logged and dropped.
fn handle_text_frame(text: &str, inbound_tx: &mpsc::UnboundedSender<SyncMessage>) {
    if text == "pong" {
        return;
    }
    match serde_json::from_str::<SyncMessage>(text) {
        Ok(message) => {
            let _ = inbound_tx.send(message);
        }
        Err(e) => {
            // One bad frame must never take the connection down.
            log::warn!("[SyncConnection] Ignoring malformed frame: {}", e);
        }
    }
}

/// Resolves when shutdown is requested (or the connection handle is gone).
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow_and_update() {
        return;
    }
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow_and_update() {
            return;
        }
    }
}

/// Resolves when the page is (or becomes) hidden; pends forever if the
/// visibility source is gone.
async fn visibility_hidden(visibility: &mut watch::Receiver<Visibility>) {
    if *visibility.borrow_and_update() == Visibility::Hidden {
        return;
    }
    while visibility.changed().await.is_ok() {
        if *visibility.borrow_and_update() == Visibility::Hidden {
            return;
        }
    }
    std::future::pending::<()>().await;
}

/// Wait until the page is visible again. `Err` means shutdown.
async fn wait_for_visible(ctx: &mut SupervisorCtx) -> Result<(), ()> {
    loop {
        if *ctx.visibility.borrow_and_update() == Visibility::Visible {
            return Ok(());
        }
        tokio::select! {
            changed = ctx.visibility.changed() => {
                if changed.is_err() {
                    return Err(());
                }
            }
            _ = shutdown_signal(&mut ctx.shutdown) => return Err(()),
        }
    }
}

/// Wait until the session holds both a token and an org id. `Err` means
/// shutdown.
async fn wait_for_credentials(ctx: &mut SupervisorCtx) -> Result<(), ()> {
    let mut token_rx = ctx.session.watch_token();
    let mut org_rx = ctx.session.watch_org_id();
    // Re-check after subscribing: a login may have landed in between.
    loop {
        if ctx.session.token().is_some() && ctx.session.org_id().is_some() {
            return Ok(());
        }
        tokio::select! {
            changed = token_rx.changed() => {
                if changed.is_err() {
                    return Err(());
                }
            }
            changed = org_rx.changed() => {
                if changed.is_err() {
                    return Err(());
                }
            }
            _ = shutdown_signal(&mut ctx.shutdown) => return Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_with_jitter() {
        let policy = ReconnectPolicy::default();
        for attempts in 0..=4 {
            let base = 1000u64 * (1 << attempts);
            let delay = policy.delay_for(attempts).as_millis() as u64;
            assert!(
                delay >= base && delay < base + 1000,
                "attempt {}: got {}ms, want [{}ms, {}ms)",
                attempts,
                delay,
                base,
                base + 1000
            );
        }
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = ReconnectPolicy::default();
        for attempts in [5, 6, 10, 31, 63, 200] {
            let delay = policy.delay_for(attempts).as_millis() as u64;
            assert!(
                (30_000..31_000).contains(&delay),
                "attempt {}: got {}ms",
                attempts,
                delay
            );
        }
    }

    #[test]
    fn test_delay_without_jitter_is_deterministic() {
        let policy = ReconnectPolicy {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
    }
}
