use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes -- anonymous, the `t` secret is the only credential
    let public_routes = Router::new()
        .route("/public/photos/:id", get(handlers::photo_file))
        .route("/public/room-photos", get(handlers::room_photos))
        .route("/public/task-photos", get(handlers::task_photos));

    // Internal routes -- operator surface, bind on a private interface only
    let internal_routes = Router::new()
        .route("/_internal/health", get(handlers::health))
        .route("/_internal/links", post(handlers::create_link))
        .route("/_internal/links/:id", delete(handlers::revoke_link))
        .route("/_internal/links/:id/events", get(handlers::link_events))
        .route(
            "/_internal/subjects/:subject_type/:subject_id/events",
            get(handlers::subject_events),
        );

    Router::new()
        .merge(public_routes)
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
