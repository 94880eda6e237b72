use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::events;
use crate::media::{self, MAX_UPLOAD_SIZE};
use crate::middleware::{require_advocate, require_auth};
use crate::state::AppState;
use crate::subscriptions;
use crate::witness;

/// GET /api/health: liveness check (no auth).
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Full HTTP surface. Public routes, then routes for any authenticated
/// caller, then advocate-only routes; the gate layers run in that order.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/health", get(health));

    let advocate_routes = Router::new()
        .route("/api/events/{id}/media", get(media::list_event_media))
        .route(
            "/api/events/{id}/media/{media_id}",
            get(media::get_media).delete(media::delete_media),
        )
        .route("/api/events/{id}/media/{media_id}/file", get(media::download_media))
        .route("/api/events/{id}/contact-witnesses", post(witness::contact_witnesses))
        .route("/api/events/{id}/witness-count", get(witness::witness_count))
        .route_layer(middleware::from_fn(require_advocate));

    let authenticated_routes = Router::new()
        .route("/api/events", get(events::list_events).post(events::create_event))
        .route(
            "/api/events/{id}",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/api/events/{id}/subscribe",
            post(subscriptions::subscribe_event).delete(subscriptions::unsubscribe_event),
        )
        .route(
            "/api/events/{id}/media",
            post(media::upload_media).layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
        )
        .route("/api/subscriptions", get(subscriptions::list_my_subscriptions))
        .merge(advocate_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
