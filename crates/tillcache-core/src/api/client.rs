//! API client for the hosted table backend.
//!
//! The backend speaks PostgREST: every table is exposed under `/rest/v1/`,
//! filters are query parameters such as `id=eq.rs-1`, and the `Prefer`
//! header controls what writes return.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{MutationSink, RemoteError, RemoteSource, RemoteWriter};
use crate::connectivity::HealthProbe;
use crate::models::{MutationOp, PendingMutation, Record};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the table API
const REST_PATH: &str = "rest/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough at the till.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for the reachability probe.
const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Filter list in PostgREST form, e.g. `("id", "eq.rs-1")`.
pub type Filters = Vec<(String, String)>;

/// API client for the table backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    probe_client: Client,
    base_url: Arc<String>,
    api_key: Arc<String>,
    access_token: Option<Arc<String>>,
}

impl ApiClient {
    /// Create a new API client for `base_url` using the project's API key
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let probe_client = Client::builder()
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            probe_client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            api_key: Arc::new(api_key.into()),
            access_token: None,
        })
    }

    /// Create a client acting as a signed-in user, sharing the connection pool.
    pub fn with_access_token(&self, token: impl Into<String>) -> Self {
        Self {
            access_token: Some(Arc::new(token.into())),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, table)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, RemoteError> {
        let invalid = |e: header::InvalidHeaderValue| RemoteError::InvalidResponse(format!("Invalid credential header: {}", e));

        let bearer = self
            .access_token
            .as_deref()
            .unwrap_or(self.api_key.as_ref());

        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(&self.api_key).map_err(invalid)?);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(invalid)?,
        );
        Ok(headers)
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    async fn send<F>(&self, what: &str, build: F) -> Result<Response, RemoteError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()
                .headers(self.auth_headers()?)
                .send()
                .await
                .map_err(RemoteError::from_transport)?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() != 429 {
                let body = response.text().await.unwrap_or_default();
                return Err(RemoteError::from_status(status, &body));
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(RemoteError::RateLimited);
            }
            let jitter_ms = rand::thread_rng().gen_range(0..=backoff_ms / 4);
            warn!(request = what, retry = retries, backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
            backoff_ms *= 2;
        }
    }

    async fn parse_rows<T: DeserializeOwned>(response: Response, what: &str) -> Result<Vec<T>, RemoteError> {
        response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse {} response: {}", what, e)))
    }

    // ===== Table operations =====

    /// Select rows from `table`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(String, String)],
        order: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<T>, RemoteError> {
        let url = self.table_url(table);
        let mut query: Vec<(String, String)> = vec![("select".into(), "*".into())];
        query.extend(filters.iter().cloned());
        if let Some(order) = order {
            query.push(("order".into(), order.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit".into(), limit.to_string()));
        }

        let response = self
            .send(table, || self.client.get(&url).query(&query))
            .await?;
        let rows: Vec<T> = Self::parse_rows(response, table).await?;
        debug!(table, count = rows.len(), "Rows fetched");
        Ok(rows)
    }

    /// Patch the rows matching `filters` and return them as stored.
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(String, String)],
        body: &B,
    ) -> Result<Vec<T>, RemoteError> {
        let url = self.table_url(table);
        let response = self
            .send(table, || {
                self.client
                    .patch(&url)
                    .query(filters)
                    .header("Prefer", "return=representation")
                    .json(body)
            })
            .await?;
        Self::parse_rows(response, table).await
    }

    /// Insert a row, merging into an existing row with the same id.
    pub async fn upsert<B: Serialize + ?Sized>(&self, table: &str, body: &B) -> Result<(), RemoteError> {
        let url = self.table_url(table);
        self.send(table, || {
            self.client
                .post(&url)
                .query(&[("on_conflict", "id")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(body)
        })
        .await?;
        Ok(())
    }

    /// Delete the rows matching `filters`. Matching nothing is not an error.
    pub async fn delete(&self, table: &str, filters: &[(String, String)]) -> Result<(), RemoteError> {
        let url = self.table_url(table);
        self.send(table, || self.client.delete(&url).query(filters))
            .await?;
        Ok(())
    }
}

fn id_filter(record_id: &str) -> (String, String) {
    ("id".to_string(), format!("eq.{}", record_id))
}

fn version_filter(version: &str) -> (String, String) {
    ("updated_at".to_string(), format!("eq.{}", version))
}

/// Patch one row by id, optionally guarded by its version.
async fn patch_one<B: Serialize + ?Sized, T: DeserializeOwned>(
    api: &ApiClient,
    table: &str,
    record_id: &str,
    body: &B,
    expected_version: Option<&str>,
) -> Result<T, RemoteError> {
    let mut filters = vec![id_filter(record_id)];
    if let Some(version) = expected_version {
        filters.push(version_filter(version));
    }

    let rows: Vec<T> = api.patch(table, &filters, body).await?;
    match rows.into_iter().next() {
        Some(row) => Ok(row),
        // Nothing matched: either the row is gone or someone saved first
        None if expected_version.is_some() => Err(RemoteError::Conflict),
        None => Err(RemoteError::NotFound(format!("{} {}", table, record_id))),
    }
}

impl HealthProbe for ApiClient {
    async fn is_reachable(&self) -> bool {
        let url = format!("{}/{}/", self.base_url, REST_PATH);
        let headers = match self.auth_headers() {
            Ok(h) => h,
            Err(_) => return false,
        };
        match self.probe_client.head(&url).headers(headers).send().await {
            // Any answer short of a server error means the backend is there
            Ok(resp) => !resp.status().is_server_error(),
            Err(e) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
        }
    }
}

impl MutationSink for ApiClient {
    async fn apply(&self, mutation: &PendingMutation) -> Result<Option<serde_json::Value>, RemoteError> {
        match &mutation.op {
            MutationOp::Upsert => {
                self.upsert(&mutation.table, &mutation.payload).await?;
                Ok(None)
            }
            MutationOp::Update { record_id } => {
                let stored = patch_one::<_, serde_json::Value>(
                    self,
                    &mutation.table,
                    record_id,
                    &mutation.payload,
                    mutation.expected_version.as_deref(),
                )
                .await?;
                Ok(Some(stored))
            }
            MutationOp::Delete { record_id } => {
                self.delete(&mutation.table, &[id_filter(record_id)]).await?;
                Ok(None)
            }
        }
    }
}

// ============================================================================
// Resource adapters
// ============================================================================

/// A single row of a table, e.g. the store's receipt settings.
pub struct TableRow<T> {
    api: ApiClient,
    filters: Filters,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TableRow<T> {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Restrict the row to `column = value`.
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), format!("eq.{}", value)));
        self
    }
}

impl<T: Record> RemoteSource<T> for TableRow<T> {
    async fn fetch(&self) -> Result<T, RemoteError> {
        let rows: Vec<T> = self.api.select(T::table(), &self.filters, None, Some(1)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("No {} row", T::label())))
    }
}

impl<T: Record> RemoteWriter<T> for TableRow<T> {
    async fn update(
        &self,
        record_id: &str,
        record: &T,
        expected_version: Option<&str>,
    ) -> Result<T, RemoteError> {
        patch_one(&self.api, T::table(), record_id, record, expected_version).await
    }
}

/// All rows of a table as one list, e.g. the product catalogue.
pub struct TableRows<T> {
    api: ApiClient,
    table: String,
    filters: Filters,
    order: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TableRows<T> {
    pub fn new(api: ApiClient, table: &str) -> Self {
        Self {
            api,
            table: table.to_string(),
            filters: Vec::new(),
            order: None,
            _marker: PhantomData,
        }
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filters.push((column.to_string(), format!("eq.{}", value)));
        self
    }

    /// PostgREST ordering, e.g. `name.asc`.
    pub fn order(mut self, order: &str) -> Self {
        self.order = Some(order.to_string());
        self
    }
}

impl<T> RemoteSource<Vec<T>> for TableRows<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn fetch(&self) -> Result<Vec<T>, RemoteError> {
        self.api
            .select(&self.table, &self.filters, self.order.as_deref(), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = ApiClient::new("https://till.example.test/", "anon").unwrap();
        assert_eq!(api.base_url(), "https://till.example.test");
        assert_eq!(
            api.table_url("receipt_settings"),
            "https://till.example.test/rest/v1/receipt_settings"
        );
    }

    #[test]
    fn test_auth_headers_prefer_access_token() {
        let api = ApiClient::new("https://till.example.test", "anon-key").unwrap();
        let headers = api.auth_headers().unwrap();
        assert_eq!(headers["apikey"], "anon-key");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer anon-key");

        let user = api.with_access_token("user-jwt");
        let headers = user.auth_headers().unwrap();
        assert_eq!(headers["apikey"], "anon-key");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer user-jwt");
    }

    #[test]
    fn test_filters() {
        let row: TableRow<crate::models::ReceiptSettings> =
            TableRow::new(ApiClient::new("https://x.test", "k").unwrap()).eq("store_id", "store-1");
        assert_eq!(row.filters, vec![("store_id".to_string(), "eq.store-1".to_string())]);
        assert_eq!(version_filter("v1"), ("updated_at".to_string(), "eq.v1".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_connectivity_error() {
        // Port 9 on loopback: nothing listens, the connect is refused
        let api = ApiClient::new("http://127.0.0.1:9", "k").unwrap();
        let err = api
            .select::<serde_json::Value>("products", &[], None, None)
            .await
            .unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {err}");
        assert!(!api.is_reachable().await);
    }
}
