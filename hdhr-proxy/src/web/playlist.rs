//! M3U playlist of the channel directory.

use std::fmt::Write;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
};

use hdhr_protocol::Channel;

use crate::web::state::WebState;

/// Content type of the playlist response.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/x-mpegURL";

/// Render an extended M3U playlist, one entry per channel in order.
///
/// Each stream URL is `http://<host><prefix><channel id>`.
pub fn render_playlist(channels: &[Channel], host: &str, stream_prefix: &str) -> String {
    let mut out = String::from("#EXTM3U\n");
    for channel in channels {
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "#EXTINF:-1 tvg-id=\"{id}\" tvg-chno=\"{id}\" tvg-name=\"{name}\",{name}",
            id = channel.id,
            name = channel.display_name
        );
        let _ = writeln!(out, "http://{}{}{}", host, stream_prefix, channel.id);
    }
    out
}

/// Serve the playlist, addressing streams through the request's `Host`.
pub async fn get_playlist(State(web_state): State<Arc<WebState>>, headers: HeaderMap) -> impl IntoResponse {
    let routes = &web_state.routes;
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or(routes.advertise_host.as_str());

    let body = render_playlist(
        web_state.allocator.directory().channels(),
        host,
        &routes.stream_prefix,
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], body)
}
