//! HTTP client for the catalog service.
//!
//! Every operation performs exactly one request against the configured
//! boardgame endpoint and returns either the decoded payload or a
//! [`CatalogError`].

mod error;

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA},
    RequestBuilder, StatusCode, Url,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::{
    config::{CatalogConfig, StatusPolicy},
    models::{Boardgame, BoardgameSummary},
};

pub use error::{CatalogError, Operation};

/// Result alias for catalog calls.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Record addressed by [`CatalogClient::get_one`] and [`CatalogClient::delete_one`].
pub const FIXED_RECORD_ID: u64 = 1;

const MAX_ERROR_EXCERPT: usize = 200;

/// Async client for the catalog boardgame endpoint.
///
/// Cloning is cheap and clones share one connection pool, so independent
/// calls can run concurrently from separate tasks.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    status_policy: StatusPolicy,
}

impl CatalogClient {
    /// Build a client from explicit configuration.
    pub fn new(config: &CatalogConfig) -> CatalogResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(CatalogError::Client)?;

        Ok(Self {
            http,
            base_url,
            status_policy: config.status_policy,
        })
    }

    /// Boardgame endpoint every call is issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Status policy applied to reads, updates and deletes.
    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// `POST` a new record and return the stored version, including its id.
    #[instrument(skip_all, fields(name = %boardgame.name))]
    pub async fn create(&self, boardgame: &Boardgame) -> CatalogResult<Boardgame> {
        let request = self.http.post(&self.base_url).json(boardgame);
        self.execute(Operation::Create, request).await
    }

    /// `POST` a record as an expansion of `parent_id`.
    #[instrument(skip(self, boardgame), fields(name = %boardgame.name))]
    pub async fn create_expansion(
        &self,
        parent_id: u64,
        boardgame: &Boardgame,
    ) -> CatalogResult<Boardgame> {
        let url = format!("{}/expansion", self.record_url(parent_id));
        let request = self.http.post(url).json(boardgame);
        self.execute(Operation::CreateExpansion, request).await
    }

    /// Fetch the record with id [`FIXED_RECORD_ID`].
    pub async fn get_one(&self) -> CatalogResult<Boardgame> {
        self.get(FIXED_RECORD_ID).await
    }

    /// Fetch a single record by id.
    #[instrument(skip(self))]
    pub async fn get(&self, id: u64) -> CatalogResult<Boardgame> {
        let request = self.http.get(self.record_url(id));
        self.execute(Operation::Get, request).await
    }

    /// Fetch the whole catalog, in service order.
    ///
    /// The request asks every intermediary to bypass its cache, so two calls
    /// always reach the service twice.
    #[instrument(skip(self))]
    pub async fn get_all(&self) -> CatalogResult<Vec<Boardgame>> {
        let request = self
            .http
            .get(&self.base_url)
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache");
        self.execute(Operation::List, request).await
    }

    /// Fetch the catalog and keep only name, publisher and player count.
    pub async fn summaries(&self) -> CatalogResult<Vec<BoardgameSummary>> {
        let games = self.get_all().await?;
        Ok(games.iter().map(Boardgame::summary).collect())
    }

    /// `PATCH` the record with `id` and return the service's version.
    #[instrument(skip(self, boardgame), fields(name = %boardgame.name))]
    pub async fn update(&self, id: u64, boardgame: &Boardgame) -> CatalogResult<Boardgame> {
        let request = self.http.patch(self.record_url(id)).json(boardgame);
        self.execute(Operation::Update, request).await
    }

    /// Delete the record with id [`FIXED_RECORD_ID`].
    pub async fn delete_one(&self) -> CatalogResult<Option<Boardgame>> {
        self.delete(FIXED_RECORD_ID).await
    }

    /// Delete a record by id, returning the payload the service echoes back.
    ///
    /// A successful response without a body (`204 No Content`) yields `None`.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> CatalogResult<Option<Boardgame>> {
        let request = self.http.delete(self.record_url(id));
        let (status, body) = self.send(Operation::Delete, request).await?;
        if status.is_success() && body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        decode(Operation::Delete, &body).map(Some)
    }

    fn record_url(&self, id: u64) -> String {
        format!("{}/{}", self.base_url, id)
    }

    async fn execute<T>(&self, operation: Operation, request: RequestBuilder) -> CatalogResult<T>
    where
        T: DeserializeOwned,
    {
        let (_, body) = self.send(operation, request).await?;
        decode(operation, &body)
    }

    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> CatalogResult<(StatusCode, Vec<u8>)> {
        let response = request
            .send()
            .await
            .map_err(|source| CatalogError::Transport { operation, source })?;

        let status = response.status();
        debug!(%operation, status = status.as_u16(), "catalog responded");

        let body = response
            .bytes()
            .await
            .map_err(|source| CatalogError::Transport { operation, source })?;

        if !status.is_success() {
            if operation.always_checks_status() || self.status_policy == StatusPolicy::Strict {
                let message = excerpt(&body)
                    .or_else(|| status.canonical_reason().map(str::to_string))
                    .unwrap_or_default();
                return Err(CatalogError::Status {
                    operation,
                    status: status.as_u16(),
                    message,
                });
            }
            warn!(
                %operation,
                status = status.as_u16(),
                "parsing non-success response under lenient status policy"
            );
        }

        Ok((status, body.to_vec()))
    }
}

fn decode<T: DeserializeOwned>(operation: Operation, body: &[u8]) -> CatalogResult<T> {
    serde_json::from_slice(body).map_err(|source| CatalogError::Decode { operation, source })
}

fn normalize_base_url(raw: &str) -> CatalogResult<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: String| CatalogError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot carry a path".to_string()));
    }
    // Record paths are appended to the base, so nothing may follow the path.
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }

    Ok(trimmed.to_string())
}

fn excerpt(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(MAX_ERROR_EXCERPT).collect())
}
