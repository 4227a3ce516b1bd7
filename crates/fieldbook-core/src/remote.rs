//! Remote record store
//!
//! The offline layer only needs four calls from the backend: insert, patch
//! by id, delete by id, and a collection listing for fetch functions.
//! `HttpRemoteStore` speaks plain JSON over HTTP:
//!
//! - `POST   {base}/{collection}`
//! - `PATCH  {base}/{collection}/{id}`
//! - `DELETE {base}/{collection}/{id}`
//! - `GET    {base}/{collection}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors returned by the remote store
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote rejected {method} {path}: HTTP {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from remote: {0}")]
    InvalidResponse(String),

    #[error("Payload for {operation} on '{collection}' has no record id")]
    MissingRecordId {
        collection: String,
        operation: &'static str,
    },

    #[error("Remote store not configured")]
    NotConfigured,
}

/// Backend reachable over network calls keyed by collection and row id
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert a record, returning the stored version
    async fn insert(&self, collection: &str, payload: &Value) -> Result<Value, RemoteError>;

    /// Patch the fields in `payload` on record `id`
    async fn patch_by_id(
        &self,
        collection: &str,
        id: &str,
        payload: &Value,
    ) -> Result<(), RemoteError>;

    /// Delete record `id`
    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// Fetch every record in a collection
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RemoteError>;
}

/// JSON-over-HTTP remote store
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    /// Create a client for the given base URL
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(
        &self,
        method: &'static str,
        path: String,
        request: RequestBuilder,
    ) -> Result<Response, RemoteError> {
        debug!("{} {}", method, path);
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            method,
            path,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn insert(&self, collection: &str, payload: &Value) -> Result<Value, RemoteError> {
        let url = self.collection_url(collection);
        let response = self
            .send("POST", url.clone(), self.client.post(&url).json(payload))
            .await?;

        // Some backends answer 201/204 with an empty body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(payload.clone());
        }
        serde_json::from_str(&text).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn patch_by_id(
        &self,
        collection: &str,
        id: &str,
        payload: &Value,
    ) -> Result<(), RemoteError> {
        let url = self.record_url(collection, id);
        self.send("PATCH", url.clone(), self.client.patch(&url).json(payload))
            .await?;
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.record_url(collection, id);
        self.send("DELETE", url.clone(), self.client.delete(&url))
            .await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, RemoteError> {
        let url = self.collection_url(collection);
        let response = self.send("GET", url.clone(), self.client.get(&url)).await?;

        match response.json::<Value>().await? {
            Value::Array(records) => Ok(records),
            other => Err(RemoteError::InvalidResponse(format!(
                "expected an array of records, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
