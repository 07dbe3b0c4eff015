//! Remote document-store client.
//!
//! The core talks to the remote through the [`RemoteStore`] trait; the
//! concrete client speaks the store's HTTP data API with basic
//! authentication over rustls. Transport security and credential handling
//! beyond this seam belong to the deployment.

use crate::{AppError, AppResult};

use std::panic::Location;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use error_location::ErrorLocation;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the synchronizer needs from the remote document store.
#[async_trait]
pub(crate) trait RemoteStore: Send + Sync {
    /// Cheap liveness probe.
    async fn ping(&self) -> AppResult<()>;

    /// Creates a time-series collection with a TTL index when absent.
    async fn ensure_timeseries_collection(
        &self,
        db: &str,
        name: &str,
        granularity: &str,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Creates a plain collection, optionally with a TTL index, when absent.
    async fn ensure_plain_collection(
        &self,
        db: &str,
        name: &str,
        ttl: Option<Duration>,
    ) -> AppResult<()>;

    /// Inserts a batch of documents; returns the acknowledged count.
    async fn insert_many(&self, db: &str, collection: &str, docs: &[Value]) -> AppResult<u64>;

    /// Fetches a document by id, `None` when absent.
    async fn get_document(
        &self,
        db: &str,
        collection: &str,
        id: &str,
    ) -> AppResult<Option<Value>>;

    /// Creates or replaces a document by id.
    async fn put_document(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        doc: &Value,
    ) -> AppResult<()>;

    /// Sets individual fields of a document by id.
    async fn patch_document(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        fields: &Value,
    ) -> AppResult<()>;
}

/// HTTP client for the remote store's data API.
pub(crate) struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
}

impl HttpRemoteStore {
    /// Builds the client with basic authentication.
    pub(crate) fn new(base_url: &str, username: &str, password: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let credentials = BASE64.encode(format!("{username}:{password}"));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: format!("Basic {credentials}"),
        })
    }

    fn collection_url(&self, db: &str, collection: &str) -> String {
        format!(
            "{}/databases/{db}/collections/{collection}",
            self.base_url
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let response = request
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .await?;
        Ok(response)
    }

    #[track_caller]
    fn status_error(context: &str, status: StatusCode) -> AppError {
        AppError::RemoteError {
            reason: format!("{context}: unexpected status {status}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    async fn create_collection(&self, db: &str, body: Value) -> AppResult<()> {
        let url = format!("{}/databases/{db}/collections", self.base_url);
        let response = self.send(self.client.post(&url).json(&body)).await?;

        match response.status() {
            // Conflict means the collection already exists; creation is
            // idempotent from the caller's point of view.
            StatusCode::CONFLICT => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(Self::status_error("create collection", status)),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn ping(&self) -> AppResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.send(self.client.get(&url)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error("ping", response.status()))
        }
    }

    async fn ensure_timeseries_collection(
        &self,
        db: &str,
        name: &str,
        granularity: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        debug!(db, name, granularity, "Ensuring time-series collection");
        self.create_collection(
            db,
            json!({
                "name": name,
                "timeseries": {
                    "timeField": "timestamp",
                    "metaField": "metadata",
                    "granularity": granularity,
                },
                "expireAfterSeconds": ttl.as_secs(),
            }),
        )
        .await
    }

    async fn ensure_plain_collection(
        &self,
        db: &str,
        name: &str,
        ttl: Option<Duration>,
    ) -> AppResult<()> {
        debug!(db, name, "Ensuring collection");
        let mut body = json!({ "name": name });
        if let Some(ttl) = ttl {
            body["expireAfterSeconds"] = json!(ttl.as_secs());
        }
        self.create_collection(db, body).await
    }

    async fn insert_many(&self, db: &str, collection: &str, docs: &[Value]) -> AppResult<u64> {
        let url = format!("{}/documents", self.collection_url(db, collection));
        let response = self
            .send(self.client.post(&url).json(&json!({ "documents": docs })))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error("insert", status));
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let inserted = body
            .get("insertedCount")
            .and_then(Value::as_u64)
            .unwrap_or(docs.len() as u64);

        Ok(inserted)
    }

    async fn get_document(
        &self,
        db: &str,
        collection: &str,
        id: &str,
    ) -> AppResult<Option<Value>> {
        let url = format!("{}/documents/{id}", self.collection_url(db, collection));
        let response = self.send(self.client.get(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Self::status_error("get document", status)),
        }
    }

    async fn put_document(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        doc: &Value,
    ) -> AppResult<()> {
        let url = format!("{}/documents/{id}", self.collection_url(db, collection));
        let response = self.send(self.client.put(&url).json(doc)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error("put document", response.status()))
        }
    }

    async fn patch_document(
        &self,
        db: &str,
        collection: &str,
        id: &str,
        fields: &Value,
    ) -> AppResult<()> {
        let url = format!("{}/documents/{id}", self.collection_url(db, collection));
        let response = self
            .send(self.client.patch(&url).json(&json!({ "$set": fields })))
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error("patch document", response.status()))
        }
    }
}
