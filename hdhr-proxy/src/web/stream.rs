//! Channel stream endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use log::{info, warn};

use crate::tuner::{AllocationError, BridgeError};
use crate::web::state::WebState;

/// Content type of stream responses.
pub const STREAM_CONTENT_TYPE: &str = "video/mpeg";

/// Routes `GET <stream prefix><channel id>` to a tuner and answers `HEAD`
/// on the same path with the stream headers only. Everything else is 404.
pub async fn stream_or_not_found(
    State(web_state): State<Arc<WebState>>,
    client: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
) -> Response {
    let channel_id = match uri.path().strip_prefix(web_state.routes.stream_prefix.as_str()) {
        Some(id) if !id.is_empty() => id,
        _ => return not_found(),
    };
    match method {
        Method::GET => stream_channel(&web_state, channel_id, client.map(|ConnectInfo(addr)| addr)).await,
        Method::HEAD => stream_headers(&web_state, channel_id),
        _ => not_found(),
    }
}

/// Answer `HEAD` without allocating a tuner.
fn stream_headers(web_state: &WebState, channel_id: &str) -> Response {
    if web_state.allocator.directory().resolve(channel_id).is_none() {
        return server_error("Unknown channel.");
    }
    (StatusCode::OK, stream_header_pairs(), Body::empty()).into_response()
}

fn stream_header_pairs() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
        (header::CACHE_CONTROL, "no-cache"),
    ]
}

async fn stream_channel(web_state: &WebState, channel_id: &str, client: Option<SocketAddr>) -> Response {
    info!(
        "Stream request for channel {} from {}",
        channel_id,
        client.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string())
    );

    let session = match web_state.allocator.allocate(channel_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Channel {}: {}", channel_id, e);
            return server_error(allocation_message(&e));
        }
    };

    let relay = match web_state.bridge.serve(session, client).await {
        Ok(relay) => relay,
        Err(BridgeError::StreamOpenFailed { .. }) => {
            return server_error("Failed to open the tuner stream.");
        }
    };

    (
        StatusCode::OK,
        stream_header_pairs(),
        Body::from_stream(relay.into_body_stream()),
    )
        .into_response()
}

fn allocation_message(e: &AllocationError) -> &'static str {
    match e {
        AllocationError::UnknownChannel(_) => "Unknown channel.",
        AllocationError::NoFreeTuner => "Failed to find or tune a free tuner.",
        AllocationError::TuneCommandFailed { .. } => "Failed to find or tune a free tuner.",
    }
}

fn server_error(message: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found.",
    )
        .into_response()
}
