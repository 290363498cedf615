//! HTTP implementation of the item store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{Item, ItemUpdate, ListQuery, NewItem};
use super::store::{ItemStore, StoreError};
use crate::session::SessionContext;
use crate::sync::OwnerType;

/// Item store backed by the Stockroom HTTP API.
///
/// The bearer token is read from the session at request time, so a login or
/// token refresh applies to the next request without rebuilding the store.
pub struct HttpItemStore {
    base_url: String,
    session: Arc<SessionContext>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ItemsResponse {
    items: Vec<Item>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest<'a> {
    new_parent_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OwnershipRequest {
    new_owner_type: OwnerType,
}

impl HttpItemStore {
    /// Create a store for an API base URL.
    pub fn new(base_url: impl Into<String>, session: Arc<SessionContext>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            session,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    log::warn!("[ItemStore] Request failed: {} {}", status, message);
    Err(StoreError::Api { status, message })
}

#[async_trait]
impl ItemStore for HttpItemStore {
    async fn list_items(&self, query: &ListQuery) -> Result<Vec<Item>, StoreError> {
        let mut params = vec![
            ("parentId", query.parent_id.as_str()),
            ("ownerType", query.owner_type.as_str()),
        ];
        if !query.category.is_empty() {
            params.push(("category", query.category.as_str()));
        }
        let response = self
            .request(reqwest::Method::GET, "/api/items")
            .query(&params)
            .send()
            .await?;
        let body: ItemsResponse = check(response).await?.json().await?;
        Ok(body.items)
    }

    async fn create_item(&self, item: &NewItem) -> Result<Item, StoreError> {
        let response = self
            .request(reqwest::Method::POST, "/api/items")
            .json(item)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn update_item(&self, id: &str, changes: &ItemUpdate) -> Result<Item, StoreError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/api/items/{}", id))
            .json(changes)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn delete_item(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/api/items/{}", id))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn move_item(&self, id: &str, new_parent_id: &str) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/api/items/{}/move", id))
            .json(&MoveRequest { new_parent_id })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn change_ownership(
        &self,
        id: &str,
        new_owner_type: OwnerType,
    ) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/api/items/{}/ownership", id))
            .json(&OwnershipRequest { new_owner_type })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/items/{}", id))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }

    async fn search_by_barcode(&self, barcode: &str) -> Result<Vec<Item>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, "/api/items/search")
            .query(&[("barcode", barcode)])
            .send()
            .await?;
        let body: ItemsResponse = check(response).await?.json().await?;
        Ok(body.items)
    }
}
