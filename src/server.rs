// HTTP surface: JSON ingestion API, AlpineBits endpoint and health checks
use std::future::Future;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::{ProtocolAuthConfig, ServiceConfig};
use crate::envelope::{authorize, is_multipart, EnvelopeError, ProtocolForm, BASIC_CHALLENGE};
use crate::ingestion::Ingestion;
use crate::lifecycle::{Lifecycle, ProtocolReply};
use crate::model::Submission;
use crate::store::GuestRequestStore;

pub const SERVICE_NAME: &str = "AlpineBits Guest Request Bridge";

#[derive(Clone)]
pub struct AppState {
    ingestion: Arc<Ingestion>,
    lifecycle: Arc<Lifecycle>,
    auth: Arc<ProtocolAuthConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn GuestRequestStore>, config: &ServiceConfig) -> Self {
        Self {
            ingestion: Arc::new(Ingestion::new(store.clone(), config.default_language.clone())),
            lifecycle: Arc::new(Lifecycle::new(store)),
            auth: Arc::new(config.auth.clone()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/submit/:hotel_code", post(submit))
        .route("/alpinebits", post(alpinebits))
        .fallback(not_found)
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_error(status: StatusCode, error: &str, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "success": false,
            "error": error,
            "message": message.into(),
        })),
    )
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Endpoint not found")
}

async fn submit(
    State(state): State<AppState>,
    Path(hotel_code): Path<String>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let submission = match payload {
        Ok(Json(submission)) => submission,
        Err(rejection) => {
            info!(hotel_code = %hotel_code, error = %rejection, "Unreadable submission body");
            return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", rejection.body_text());
        }
    };

    match state.ingestion.submit(&hotel_code, &submission).await {
        Ok(request_id) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "requestId": request_id,
                "message": "Request received successfully",
            })),
        ),
        Err(err) => {
            if err.status() >= 500 {
                warn!(hotel_code = %hotel_code, error = %err, "Submission failed");
            }
            json_error(status_code(err.status()), err.code(), err.public_message())
        }
    }
}

impl IntoResponse for ProtocolReply {
    fn into_response(self) -> Response {
        (
            status_code(self.status),
            [(CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        let mut response = ProtocolReply::text(self.status(), self.wire_message()).into_response();
        if self.needs_challenge() {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
        }
        response
    }
}

async fn read_form(mut multipart: Multipart) -> Result<ProtocolForm, EnvelopeError> {
    let mut form = ProtocolForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| EnvelopeError::MalformedBody)?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|_| EnvelopeError::MalformedBody)?;
        form.set_part(&name, &bytes);
    }
    Ok(form)
}

async fn alpinebits(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let client = match authorize(&headers, &state.auth) {
        Ok(client) => client,
        Err(err) => {
            info!(error = %err, "AlpineBits request refused");
            return err.into_response();
        }
    };

    let multipart = match multipart {
        Ok(multipart) if is_multipart(&headers) => multipart,
        _ => return EnvelopeError::InvalidContentType.into_response(),
    };

    let (action, request) = match read_form(multipart).await.and_then(ProtocolForm::resolve) {
        Ok(resolved) => resolved,
        Err(err) => {
            info!(error = %err, "AlpineBits request refused");
            return err.into_response();
        }
    };

    debug!(
        action = action.message_name(),
        protocol_version = %client.protocol_version,
        client_id = client.client_id.as_deref().unwrap_or("-"),
        "Dispatching AlpineBits action"
    );
    state
        .lifecycle
        .dispatch(&client, action, &request)
        .await
        .into_response()
}
