//! HTTP front door: playlist, channel streams and monitoring API.

pub mod api;
pub mod playlist;
pub mod state;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use state::WebState;

pub use state::{RouteConfig, SessionRegistry};

/// Build the application router.
pub fn router(web_state: Arc<WebState>) -> Router {
    Router::new()
        .route(&web_state.routes.playlist_path, get(playlist::get_playlist))
        // Monitoring API
        .route("/api/tuners", get(api::get_tuners))
        .route("/api/sessions", get(api::get_sessions))
        // Streams live under a prefix that path patterns cannot express.
        .fallback(stream::stream_or_not_found)
        .with_state(web_state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    web_state: Arc<WebState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let playlist_path = web_state.routes.playlist_path.clone();
    let app = router(web_state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Listening on http://{}", listen_addr);
    log::info!("Playlist available at http://{}{}", listen_addr, playlist_path);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
