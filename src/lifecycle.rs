// Protocol actions over the pending -> sent -> acknowledged request lifecycle

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::capabilities::{intersect, server_capabilities, Capabilities};
use crate::envelope::{Action, ClientContext};
use crate::model::{GuestRequest, LogEvent, RequestLogEntry, RequestStatus};
use crate::store::{GuestRequestStore, StoreError};
use crate::xml_codec::{
    parse_acknowledge, parse_ping, parse_read, write_error_response, write_notif_report_response,
    write_ping_response, write_read_response, CodecError,
};

pub const XML_CONTENT_TYPE: &str = "application/xml";
pub const PING_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{0}")]
    ProtocolFormat(&'static str),

    #[error("Hotel code '{0}' not found")]
    UnknownHotel(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// What a Read call does to the store and what it answers with.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPlan {
    /// Requests to move from `pending` to `sent`.
    pub mark_sent: Vec<String>,
    /// Requests listed in the response: freshly sent and previously sent alike.
    pub response: Vec<GuestRequest>,
}

/// Decides a Read from the current unacknowledged rows of one hotel.
/// Acknowledged and repeated rows are ignored; input order is kept.
pub fn plan_read(rows: Vec<GuestRequest>) -> ReadPlan {
    let mut seen = HashSet::new();
    let mut mark_sent = Vec::new();
    let mut response = Vec::new();

    for row in rows {
        if row.status.is_terminal() || !seen.insert(row.request_id.clone()) {
            continue;
        }
        if row.status == RequestStatus::Pending {
            mark_sent.push(row.request_id.clone());
        }
        response.push(row);
    }

    ReadPlan {
        mark_sent,
        response,
    }
}

/// A finished protocol answer, ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ProtocolReply {
    fn xml(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: XML_CONTENT_TYPE,
            body,
        }
    }

    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: TEXT_CONTENT_TYPE,
            body: message.into(),
        }
    }
}

pub struct Lifecycle {
    store: Arc<dyn GuestRequestStore>,
    server: Capabilities,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn GuestRequestStore>) -> Self {
        Self {
            store,
            server: server_capabilities(),
        }
    }

    /// Stateless capability negotiation. Returns the `OTA_PingRS` document.
    pub fn handshake(&self, xml: &str) -> Result<String, LifecycleError> {
        let ping = parse_ping(xml).ok_or(LifecycleError::ProtocolFormat(
            "invalid OTA_PingRQ format or missing EchoData",
        ))?;
        let intersection = intersect(&ping.capabilities, &self.server);
        info!(
            versions = intersection.versions.len(),
            "Handshake negotiated"
        );
        Ok(write_ping_response(&intersection, &ping.echo_data)?)
    }

    /// Lists the hotel's unacknowledged requests and marks the pending ones sent.
    pub async fn read(
        &self,
        client: &ClientContext,
        xml: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LifecycleError> {
        let request = parse_read(xml).ok_or(LifecycleError::ProtocolFormat(
            "Invalid OTA_ReadRQ format",
        ))?;
        let hotel = self
            .store
            .hotel_by_code(&request.hotel_code)
            .await?
            .ok_or_else(|| LifecycleError::UnknownHotel(request.hotel_code.clone()))?;

        let rows = self.store.unacknowledged_for_hotel(&hotel.hotel_code).await?;
        let plan = plan_read(rows);

        let transitioned = self.store.mark_sent(&plan.mark_sent, now).await?;
        self.audit(client, &transitioned, LogEvent::Sent, now).await;

        info!(
            hotel_code = %hotel.hotel_code,
            listed = plan.response.len(),
            newly_sent = transitioned.len(),
            "Read served"
        );
        Ok(write_read_response(&plan.response, &hotel)?)
    }

    /// Acknowledges every listed request still open. IDs that are unknown or
    /// already acknowledged are accepted without effect.
    pub async fn acknowledge(
        &self,
        client: &ClientContext,
        xml: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LifecycleError> {
        let request = parse_acknowledge(xml).ok_or(LifecycleError::ProtocolFormat(
            "Invalid OTA_NotifReportRQ format or no request IDs",
        ))?;

        let mut seen = HashSet::new();
        let ids: Vec<String> = request
            .request_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let transitioned = self.store.mark_acknowledged(&ids, now).await?;
        self.audit(client, &transitioned, LogEvent::Acknowledged, now).await;

        if transitioned.len() < ids.len() {
            let skipped: Vec<&String> = ids.iter().filter(|id| !transitioned.contains(id)).collect();
            warn!(ids = ?skipped, "Acknowledged ids were unknown or already acknowledged");
        }
        info!(acknowledged = transitioned.len(), "Notif report processed");

        Ok(write_notif_report_response(now)?)
    }

    /// Runs an action and turns the outcome into a wire reply. Format and
    /// lookup failures become protocol answers; storage and codec failures a
    /// generic 500.
    pub async fn dispatch(
        &self,
        client: &ClientContext,
        action: Action,
        xml: &str,
    ) -> ProtocolReply {
        let span = info_span!(
            "alpinebits_action",
            action = action.message_name(),
            protocol_version = %client.protocol_version,
            client_id = client.client_id.as_deref().unwrap_or("-"),
        );
        self.run(client, action, xml).instrument(span).await
    }

    async fn run(&self, client: &ClientContext, action: Action, xml: &str) -> ProtocolReply {
        let now = Utc::now();
        let outcome = match action {
            Action::Handshake => self.handshake(xml),
            Action::Read => self.read(client, xml, now).await,
            Action::Acknowledge => self.acknowledge(client, xml, now).await,
        };

        match outcome {
            Ok(body) if action == Action::Handshake => ProtocolReply {
                status: 200,
                content_type: PING_CONTENT_TYPE,
                body,
            },
            Ok(body) => ProtocolReply::xml(200, body),
            Err(LifecycleError::ProtocolFormat(message)) if action == Action::Handshake => {
                debug!(message, "Rejected handshake");
                ProtocolReply::text(400, format!("ERROR:{message}"))
            }
            Err(err @ (LifecycleError::ProtocolFormat(_) | LifecycleError::UnknownHotel(_))) => {
                let status = match err {
                    LifecycleError::UnknownHotel(_) => 404,
                    _ => 400,
                };
                info!(action = action.message_name(), error = %err, "Protocol request rejected");
                match write_error_response(action.response_root(), &err.to_string(), now) {
                    Ok(body) => ProtocolReply::xml(status, body),
                    Err(e) => internal_error(action, &e.into()),
                }
            }
            Err(err) => internal_error(action, &err),
        }
    }

    async fn audit(
        &self,
        client: &ClientContext,
        request_ids: &[String],
        event: LogEvent,
        at: DateTime<Utc>,
    ) {
        for id in request_ids {
            let entry =
                RequestLogEntry::new(id.clone(), event, at).by_client(client.client_id.as_deref());
            if let Err(e) = self.store.append_log(&entry).await {
                warn!(request_id = %id, event = event.as_str(), error = %e, "Failed to write audit entry");
            }
        }
    }
}

fn internal_error(action: Action, err: &LifecycleError) -> ProtocolReply {
    error!(action = action.message_name(), error = %err, "Protocol action failed");
    ProtocolReply::text(500, "ERROR:internal server error")
}
