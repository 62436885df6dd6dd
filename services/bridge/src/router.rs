//! Axum Router Configuration
//!
//! Three surfaces: the call-initiation endpoint, the TwiML callback Twilio
//! fetches when the call connects, and the media-stream WebSocket upgrade.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/outbound-call", post(handlers::outbound_call))
        .route(
            "/outbound-call-twiml",
            get(handlers::outbound_call_twiml).post(handlers::outbound_call_twiml),
        )
        .route("/outbound-media-stream", get(ws_handler))
        .route("/healthz", get(handlers::healthz))
        .with_state(app_state)
}
