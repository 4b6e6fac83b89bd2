// SQLite-backed guest request store; status changes are guarded UPDATE ... RETURNING statements

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;

use super::{GuestRequestStore, StoreError, StoreResult};
use crate::model::{
    Gender, GuestRequest, Hotel, LogEvent, RequestLogEntry, RequestStatus, Selection,
};

const REQUEST_COLUMNS: &str = "request_id, hotel_code, check_in_date, check_out_date, \
    adult_count, children_count, child_ages, selected_room, selected_room_code, \
    selected_room_name, selected_offer, selected_offer_code, selected_offer_name, gender, \
    first_name, last_name, phone_number, email, language, comments, origin, status, \
    created_at, sent_at, acknowledged_at";

// SQLite caps host parameters at 32766 per statement.
const MAX_IDS_PER_STATEMENT: usize = 10_000;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates a database at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init_connection(Connection::open_in_memory()?)
    }

    fn init_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    // Fixed-width UTC so that lexical order in SQL equals chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, &v)).transpose()
}

fn parse_date(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<GuestRequest> {
    let child_ages: String = row.get(6)?;
    let child_ages: Vec<u32> =
        serde_json::from_str(&child_ages).map_err(|e| conversion_error(6, e))?;
    let gender: Option<String> = row.get(13)?;
    let gender = match gender.as_deref() {
        None => Gender::Unspecified,
        Some(value) => Gender::parse(value)
            .ok_or_else(|| conversion_error(13, format!("unknown gender '{value}'")))?,
    };
    let status: String = row.get(21)?;
    let status = status
        .parse::<RequestStatus>()
        .map_err(|e| conversion_error(21, e))?;

    Ok(GuestRequest {
        request_id: row.get(0)?,
        hotel_code: row.get(1)?,
        check_in_date: parse_date(2, &row.get::<_, String>(2)?)?,
        check_out_date: parse_date(3, &row.get::<_, String>(3)?)?,
        adult_count: row.get(4)?,
        children_count: row.get(5)?,
        child_ages,
        room: Selection {
            raw: row.get(7)?,
            code: row.get(8)?,
            name: row.get(9)?,
        },
        offer: Selection {
            raw: row.get(10)?,
            code: row.get(11)?,
            name: row.get(12)?,
        },
        gender,
        first_name: row.get(14)?,
        last_name: row.get(15)?,
        phone_number: row.get(16)?,
        email: row.get(17)?,
        language: row.get(18)?,
        comments: row.get(19)?,
        origin: row.get(20)?,
        status,
        created_at: parse_ts(22, &row.get::<_, String>(22)?)?,
        sent_at: parse_opt_ts(23, row.get(23)?)?,
        acknowledged_at: parse_opt_ts(24, row.get(24)?)?,
    })
}

fn insert_log(conn: &Connection, entry: &RequestLogEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO request_logs (request_id, event_type, details, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.request_id,
            entry.event_type.as_str(),
            entry.details,
            format_ts(&entry.timestamp),
        ],
    )?;
    Ok(())
}

fn insert_request_row(conn: &Connection, request: &GuestRequest) -> StoreResult<()> {
    let child_ages = serde_json::to_string(&request.child_ages)?;
    let gender = match request.gender {
        Gender::Unspecified => None,
        other => Some(other.as_str()),
    };

    let inserted = conn.execute(
        &format!(
            "INSERT INTO guest_requests ({REQUEST_COLUMNS}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
              ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
        ),
        params![
            request.request_id,
            request.hotel_code,
            request.check_in_date.format("%Y-%m-%d").to_string(),
            request.check_out_date.format("%Y-%m-%d").to_string(),
            request.adult_count,
            request.children_count,
            child_ages,
            request.room.raw,
            request.room.code,
            request.room.name,
            request.offer.raw,
            request.offer.code,
            request.offer.name,
            gender,
            request.first_name,
            request.last_name,
            request.phone_number,
            request.email,
            request.language,
            request.comments,
            request.origin,
            request.status.as_str(),
            format_ts(&request.created_at),
            request.sent_at.as_ref().map(format_ts),
            request.acknowledged_at.as_ref().map(format_ts),
        ],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(err) => Err(match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::DuplicateRequest(request.request_id.clone())
            }
            other => StoreError::Sqlite(other),
        }),
    }
}

/// Runs `UPDATE guest_requests SET {assignment} WHERE {guard} AND request_id IN (...)`
/// and returns the transitioned IDs in the caller's order.
///
/// IDs are bound in chunks below SQLite's host parameter limit; all chunks
/// commit together.
fn transition(
    conn: &mut Connection,
    assignment: &str,
    guard: &str,
    request_ids: &[String],
    at: DateTime<Utc>,
) -> StoreResult<Vec<String>> {
    if request_ids.is_empty() {
        return Ok(Vec::new());
    }
    let at = format_ts(&at);
    let tx = conn.transaction()?;
    let mut changed = HashSet::new();
    for chunk in request_ids.chunks(MAX_IDS_PER_STATEMENT) {
        let placeholders = (0..chunk.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE guest_requests SET {assignment} WHERE {guard} AND request_id IN ({placeholders}) \
             RETURNING request_id"
        );
        let bound = std::iter::once(at.clone()).chain(chunk.iter().cloned());

        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound), |row| row.get::<_, String>(0))?;
        for row in rows {
            changed.insert(row?);
        }
    }
    tx.commit()?;

    let mut ordered = Vec::with_capacity(changed.len());
    for id in request_ids {
        if changed.remove(id) {
            ordered.push(id.clone());
        }
    }
    Ok(ordered)
}

#[async_trait]
impl GuestRequestStore for SqliteStore {
    async fn hotel_by_code(&self, hotel_code: &str) -> StoreResult<Option<Hotel>> {
        let hotel_code = hotel_code.to_string();
        self.with_conn(move |conn| {
            let hotel = conn
                .query_row(
                    "SELECT hotel_code, hotel_name FROM hotels WHERE hotel_code = ?1",
                    params![hotel_code],
                    |row| {
                        Ok(Hotel {
                            hotel_code: row.get(0)?,
                            hotel_name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(hotel)
        })
        .await
    }

    async fn upsert_hotel(&self, hotel: &Hotel) -> StoreResult<()> {
        let hotel = hotel.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO hotels (hotel_code, hotel_name) VALUES (?1, ?2) \
                 ON CONFLICT(hotel_code) DO UPDATE SET hotel_name = excluded.hotel_name",
                params![hotel.hotel_code, hotel.hotel_name],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_request(&self, request: &GuestRequest) -> StoreResult<()> {
        let request = request.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            insert_request_row(&tx, &request)?;

            let entry = RequestLogEntry::new(
                request.request_id.clone(),
                LogEvent::Submitted,
                request.created_at,
            );
            if let Err(err) = insert_log(&tx, &entry) {
                warn!(request_id = %request.request_id, error = %err, "Failed to write audit entry");
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn request_by_id(&self, request_id: &str) -> StoreResult<Option<GuestRequest>> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            let request = conn
                .query_row(
                    &format!("SELECT {REQUEST_COLUMNS} FROM guest_requests WHERE request_id = ?1"),
                    params![request_id],
                    row_to_request,
                )
                .optional()?;
            Ok(request)
        })
        .await
    }

    async fn unacknowledged_for_hotel(&self, hotel_code: &str) -> StoreResult<Vec<GuestRequest>> {
        let hotel_code = hotel_code.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM guest_requests \
                 WHERE hotel_code = ?1 AND status IN ('pending', 'sent') \
                 ORDER BY created_at DESC, request_id DESC"
            ))?;
            let rows = stmt
                .query_map(params![hotel_code], row_to_request)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn mark_sent(&self, request_ids: &[String], at: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let request_ids = request_ids.to_vec();
        self.with_conn(move |conn| {
            transition(
                conn,
                "status = 'sent', sent_at = ?1",
                "status = 'pending'",
                &request_ids,
                at,
            )
        })
        .await
    }

    async fn mark_acknowledged(
        &self,
        request_ids: &[String],
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let request_ids = request_ids.to_vec();
        self.with_conn(move |conn| {
            transition(
                conn,
                "status = 'acknowledged', acknowledged_at = ?1",
                "status IN ('pending', 'sent')",
                &request_ids,
                at,
            )
        })
        .await
    }

    async fn append_log(&self, entry: &RequestLogEntry) -> StoreResult<()> {
        let entry = entry.clone();
        self.with_conn(move |conn| Ok(insert_log(conn, &entry)?)).await
    }

    async fn logs_for_request(&self, request_id: &str) -> StoreResult<Vec<RequestLogEntry>> {
        let request_id = request_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT request_id, event_type, details, timestamp FROM request_logs \
                 WHERE request_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![request_id], |row| {
                    let event_type: String = row.get(1)?;
                    let event_type = match event_type.as_str() {
                        "submitted" => LogEvent::Submitted,
                        "sent" => LogEvent::Sent,
                        "acknowledged" => LogEvent::Acknowledged,
                        other => {
                            return Err(conversion_error(1, format!("unknown event '{other}'")))
                        }
                    };
                    Ok(RequestLogEntry {
                        request_id: row.get(0)?,
                        event_type,
                        details: row.get(2)?,
                        timestamp: parse_ts(3, &row.get::<_, String>(3)?)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}
