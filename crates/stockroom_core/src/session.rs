//! Session state: the credential and organization the client acts as.
//!
//! Both values are observable through `tokio::sync::watch` so the sync
//! connection can park while they are missing and wake up the moment a login
//! provides them. Sync is optional end to end; an empty session just means
//! no live updates.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::sync::watch;

/// Observable credential and organization state for one client session.
#[derive(Debug)]
pub struct SessionContext {
    token: watch::Sender<Option<String>>,
    org_id: watch::Sender<Option<String>>,
}

impl SessionContext {
    /// Create an empty session (no credential, no organization).
    pub fn new() -> Self {
        let (token, _) = watch::channel(None);
        let (org_id, _) = watch::channel(None);
        Self { token, org_id }
    }

    /// Create a session that already holds a credential and organization.
    pub fn with_credentials(token: impl Into<String>, org_id: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_credentials(token, org_id);
        session
    }

    /// Install or replace the bearer token and organization id.
    pub fn set_credentials(&self, token: impl Into<String>, org_id: impl Into<String>) {
        self.token.send_replace(Some(token.into()));
        self.org_id.send_replace(Some(org_id.into()));
    }

    /// Drop the credential and organization (logout).
    pub fn clear_credentials(&self) {
        self.token.send_replace(None);
        self.org_id.send_replace(None);
    }

    /// Current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    /// Current organization id, if any.
    pub fn org_id(&self) -> Option<String> {
        self.org_id.borrow().clone()
    }

    /// Watch for token changes.
    pub fn watch_token(&self) -> watch::Receiver<Option<String>> {
        self.token.subscribe()
    }

    /// Watch for organization changes.
    pub fn watch_org_id(&self) -> watch::Receiver<Option<String>> {
        self.org_id.subscribe()
    }

    /// The current user's id from the held credential, if derivable.
    pub fn user_id(&self) -> Option<String> {
        self.token().as_deref().and_then(user_id_from_token)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `sub` claim from a JWT-shaped credential.
///
/// Only the payload segment is decoded, without signature verification: the
/// result is identity for message suppression, not authorization. Any
/// failure yields `None` and the caller treats the user as unknown.
pub fn user_id_from_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("sub").and_then(|sub| sub.as_str()).map(str::to_owned)
}
