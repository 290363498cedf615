//! # `stockroom_core`
//!
//! This is the `stockroom_core` library!
//! It contains shared code for the Stockroom inventory clients.
//!
//! The two halves are:
//! 1. Real-time sync (`sync`): a persistent WebSocket connection with
//!    reconnection, a same-process relay for sibling contexts, and a
//!    coordinator that fans inbound change signals out to subscribers.
//! 2. Items (`items`): the item model, the remote HTTP store, and the list
//!    controller that decides when a displayed folder must be refetched.
//!
//! Sync here is a latency optimization over an authoritative remote store.
//! Messages say "this scope changed" and receivers refetch; they never carry
//! item data, and every sync failure degrades to "no live updates" rather
//! than an error.

#![warn(missing_docs)]

/// Environment-based client configuration.
pub mod config;

/// Item model, remote store and list controller.
pub mod items;

/// Session credential and organization state.
pub mod session;

/// Real-time sync: connection, relay, coordinator.
pub mod sync;
