// In-process store used by tests and when no database path is configured
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{GuestRequestStore, StoreError, StoreResult};
use crate::model::{GuestRequest, Hotel, LogEvent, RequestLogEntry, RequestStatus};

#[derive(Default)]
pub struct MemoryStore {
    hotels: DashMap<String, Hotel>,
    // Row updates happen under the write lock, which gives the same
    // per-row serialization a database WHERE clause would.
    requests: RwLock<HashMap<String, GuestRequest>>,
    logs: Mutex<Vec<RequestLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hotels(hotels: impl IntoIterator<Item = Hotel>) -> Self {
        let store = Self::new();
        for hotel in hotels {
            store.hotels.insert(hotel.hotel_code.clone(), hotel);
        }
        store
    }

    pub fn request_count(&self) -> usize {
        self.requests.read().len()
    }

    fn transition(
        &self,
        request_ids: &[String],
        to: RequestStatus,
        at: DateTime<Utc>,
    ) -> Vec<String> {
        let mut requests = self.requests.write();
        let mut changed = Vec::new();
        for id in request_ids {
            let Some(request) = requests.get_mut(id) else {
                continue;
            };
            if !request.status.can_transition_to(to) {
                continue;
            }
            request.status = to;
            match to {
                RequestStatus::Sent => request.sent_at = Some(at),
                RequestStatus::Acknowledged => request.acknowledged_at = Some(at),
                RequestStatus::Pending => {}
            }
            changed.push(id.clone());
        }
        changed
    }
}

#[async_trait]
impl GuestRequestStore for MemoryStore {
    async fn hotel_by_code(&self, hotel_code: &str) -> StoreResult<Option<Hotel>> {
        Ok(self.hotels.get(hotel_code).map(|entry| entry.value().clone()))
    }

    async fn upsert_hotel(&self, hotel: &Hotel) -> StoreResult<()> {
        self.hotels.insert(hotel.hotel_code.clone(), hotel.clone());
        Ok(())
    }

    async fn insert_request(&self, request: &GuestRequest) -> StoreResult<()> {
        {
            let mut requests = self.requests.write();
            if requests.contains_key(&request.request_id) {
                return Err(StoreError::DuplicateRequest(request.request_id.clone()));
            }
            requests.insert(request.request_id.clone(), request.clone());
        }
        self.logs.lock().push(RequestLogEntry::new(
            request.request_id.clone(),
            LogEvent::Submitted,
            request.created_at,
        ));
        Ok(())
    }

    async fn request_by_id(&self, request_id: &str) -> StoreResult<Option<GuestRequest>> {
        Ok(self.requests.read().get(request_id).cloned())
    }

    async fn unacknowledged_for_hotel(&self, hotel_code: &str) -> StoreResult<Vec<GuestRequest>> {
        let mut rows: Vec<GuestRequest> = self
            .requests
            .read()
            .values()
            .filter(|r| r.hotel_code == hotel_code && !r.status.is_terminal())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.request_id.cmp(&a.request_id))
        });
        Ok(rows)
    }

    async fn mark_sent(&self, request_ids: &[String], at: DateTime<Utc>) -> StoreResult<Vec<String>> {
        Ok(self.transition(request_ids, RequestStatus::Sent, at))
    }

    async fn mark_acknowledged(
        &self,
        request_ids: &[String],
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        Ok(self.transition(request_ids, RequestStatus::Acknowledged, at))
    }

    async fn append_log(&self, entry: &RequestLogEntry) -> StoreResult<()> {
        self.logs.lock().push(entry.clone());
        Ok(())
    }

    async fn logs_for_request(&self, request_id: &str) -> StoreResult<Vec<RequestLogEntry>> {
        Ok(self
            .logs
            .lock()
            .iter()
            .filter(|entry| entry.request_id == request_id)
            .cloned()
            .collect())
    }
}
