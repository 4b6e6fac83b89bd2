// Persistence seam for hotels, guest requests and the request audit log

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{GuestRequest, Hotel, RequestLogEntry};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate request id: {0}")]
    DuplicateRequest(String),

    #[error("Storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait GuestRequestStore: Send + Sync + 'static {
    async fn hotel_by_code(&self, hotel_code: &str) -> StoreResult<Option<Hotel>>;

    // Administrative provisioning; the protocol paths never mutate hotels.
    async fn upsert_hotel(&self, hotel: &Hotel) -> StoreResult<()>;

    /// Inserts a new request together with its `submitted` audit entry.
    /// Either the request row becomes visible or nothing does; the audit
    /// entry itself is best-effort.
    async fn insert_request(&self, request: &GuestRequest) -> StoreResult<()>;

    async fn request_by_id(&self, request_id: &str) -> StoreResult<Option<GuestRequest>>;

    /// Requests of one hotel in `pending` or `sent`, newest first.
    async fn unacknowledged_for_hotel(&self, hotel_code: &str) -> StoreResult<Vec<GuestRequest>>;

    /// Flips the given IDs from `pending` to `sent`. Returns the IDs that
    /// were actually transitioned by this call.
    async fn mark_sent(&self, request_ids: &[String], at: DateTime<Utc>) -> StoreResult<Vec<String>>;

    /// Flips the given IDs from `pending` or `sent` to `acknowledged`.
    /// Returns the IDs that were actually transitioned by this call.
    async fn mark_acknowledged(
        &self,
        request_ids: &[String],
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>>;

    async fn append_log(&self, entry: &RequestLogEntry) -> StoreResult<()>;

    /// Audit entries for one request in insertion order. Observability only.
    async fn logs_for_request(&self, request_id: &str) -> StoreResult<Vec<RequestLogEntry>>;
}
