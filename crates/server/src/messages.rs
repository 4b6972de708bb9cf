//! `POST /api/messages`: normalised inbound events in, rendered replies out.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use hrdesk_chat::{InboundEnvelope, OutboundMessage, Router as ChatRouter};

#[derive(Clone)]
pub struct MessagesState {
    chat: Arc<ChatRouter>,
    expose_detail: bool,
}

/// Transport-level fault. `type` and `details` are only filled in
/// development mode.
#[derive(Debug, Serialize)]
pub struct TransportError {
    pub error: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

type Rejection = (StatusCode, Json<TransportError>);

pub fn router(chat: Arc<ChatRouter>, expose_detail: bool) -> Router {
    Router::new()
        .route("/api/messages", post(receive))
        .with_state(MessagesState { chat, expose_detail })
}

pub async fn receive(
    State(state): State<MessagesState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OutboundMessage>, Rejection> {
    if !is_json(&headers) {
        return Err(state.reject(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected an application/json body",
            "unsupported_media_type",
            None,
        ));
    }

    let envelope: InboundEnvelope = serde_json::from_slice(&body).map_err(|error| {
        state.reject(
            StatusCode::BAD_REQUEST,
            "malformed inbound event",
            "invalid_payload",
            Some(error.to_string()),
        )
    })?;

    info!(
        event_name = "transport.message.received",
        correlation_id = %envelope.event_id,
        conversation_id = %envelope.conversation_id.0,
        event_shape = envelope.event.shape().as_str(),
        "inbound event accepted"
    );
    Ok(Json(state.chat.route(envelope).await))
}

impl MessagesState {
    fn reject(
        &self,
        status: StatusCode,
        message: &str,
        kind: &'static str,
        details: Option<String>,
    ) -> Rejection {
        warn!(
            event_name = "transport.message.rejected",
            status = status.as_u16(),
            kind,
            details = details.as_deref().unwrap_or(""),
            "inbound event rejected"
        );
        let body = if self.expose_detail {
            TransportError { error: message.to_string(), kind: Some(kind), details }
        } else {
            TransportError { error: message.to_string(), kind: None, details: None }
        };
        (status, Json(body))
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}
