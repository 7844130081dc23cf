//! HTTP endpoints.
//!
//! This module provides the request layer over `reqwest`: the cursor
//! fetcher for the pull path, the connection-info resolver for the push path
//! and a small collection client for create, list and delete. Every
//! non-success status becomes [`SyncError::Http`] carrying the status code
//! and its canonical text; response bodies of failed requests are not parsed.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{CollectionSource, EndpointResolver};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tablesync_protocol::{
    ConnectionInfo, Cursor, ProtocolError, PullResponse, PullShape, RequiredFields,
};
use tracing::debug;
use url::Url;

/// JSON request helper shared by the endpoint types.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Creates a client whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a client from the session configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(config.request_timeout)
    }

    /// Sends a GET and decodes the JSON body.
    pub async fn get_json(&self, url: Url) -> SyncResult<Value> {
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        read_json(check_status(response)?).await
    }

    /// Sends a POST with a JSON body and decodes the JSON reply.
    ///
    /// An empty reply decodes as `null`.
    pub async fn post_json(&self, url: Url, body: &Value) -> SyncResult<Value> {
        debug!(%url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        read_json(check_status(response)?).await
    }

    /// Sends a DELETE.
    pub async fn delete(&self, url: Url) -> SyncResult<()> {
        debug!(%url, "DELETE");
        let response = self.client.delete(url).send().await?;
        check_status(response)?;
        Ok(())
    }
}

fn check_status(response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::http(
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown status"),
        ))
    }
}

async fn read_json(response: reqwest::Response) -> SyncResult<Value> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| SyncError::Protocol(ProtocolError::InvalidJson(e)))
}

/// Resolves push channel coordinates from the connection-info endpoint.
#[derive(Debug, Clone)]
pub struct HttpEndpointResolver {
    http: HttpClient,
    url: Url,
}

impl HttpEndpointResolver {
    /// Creates a resolver for an endpoint URL.
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self { http, url }
    }

    /// Creates a resolver from the session configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(HttpClient::from_config(config)?, config.connection_info_url()?))
    }
}

#[async_trait]
impl EndpointResolver for HttpEndpointResolver {
    async fn resolve(&self) -> SyncResult<ConnectionInfo> {
        let body = self.http.get_json(self.url.clone()).await?;
        serde_json::from_value(body).map_err(|e| SyncError::Protocol(ProtocolError::InvalidJson(e)))
    }
}

/// Reads the collection one cursor step at a time.
///
/// Each fetch is a single GET; a failed fetch is returned to the caller and
/// never retried here.
#[derive(Debug, Clone)]
pub struct CursorFetcher {
    http: HttpClient,
    url: Url,
    cursor_param: String,
    shape: PullShape,
}

impl CursorFetcher {
    /// Creates a fetcher for a collection URL.
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self {
            http,
            url,
            cursor_param: "last_version".into(),
            shape: PullShape::default(),
        }
    }

    /// Creates a fetcher from the session configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(HttpClient::from_config(config)?, config.collection_url()?)
            .with_cursor_param(config.cursor_param.clone())
            .with_shape(config.pull_shape.clone()))
    }

    /// Sets the cursor query parameter name.
    pub fn with_cursor_param(mut self, name: impl Into<String>) -> Self {
        self.cursor_param = name.into();
        self
    }

    /// Sets the response shape.
    pub fn with_shape(mut self, shape: PullShape) -> Self {
        self.shape = shape;
        self
    }

    /// URL for a fetch from `cursor`.
    pub fn fetch_url(&self, cursor: Option<&Cursor>) -> Url {
        let mut url = self.url.clone();
        if let Some(cursor) = cursor {
            url.query_pairs_mut()
                .append_pair(&self.cursor_param, &cursor.to_query_value());
        }
        url
    }
}

#[async_trait]
impl CollectionSource for CursorFetcher {
    async fn fetch(&self, cursor: Option<&Cursor>) -> SyncResult<PullResponse> {
        let body = self.http.get_json(self.fetch_url(cursor)).await?;
        Ok(self.shape.decode(body)?)
    }
}

/// Create, list and delete against the collection endpoint.
#[derive(Debug, Clone)]
pub struct CollectionClient {
    http: HttpClient,
    url: Url,
    rules: RequiredFields,
}

impl CollectionClient {
    /// Creates a client for a collection URL.
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self {
            http,
            url,
            rules: RequiredFields::new(),
        }
    }

    /// Creates a client from the session configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(HttpClient::from_config(config)?, config.collection_url()?))
    }

    /// Sets the rules checked before every create.
    pub fn with_rules(mut self, rules: RequiredFields) -> Self {
        self.rules = rules;
        self
    }

    /// Lists the full collection as returned by the server.
    pub async fn list(&self) -> SyncResult<Value> {
        self.http.get_json(self.url.clone()).await
    }

    /// Validates and submits one record; returns the server's reply.
    ///
    /// Validation failures are returned before any request is sent.
    pub async fn create(&self, record: &Value) -> SyncResult<Value> {
        self.rules.check(record)?;
        self.http.post_json(self.url.clone(), record).await
    }

    /// Deletes the collection.
    pub async fn delete_all(&self) -> SyncResult<()> {
        self.http.delete(self.url.clone()).await
    }
}
