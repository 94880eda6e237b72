use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::PathRejection},
};
use tracing::info;

use tracker_db::Database;
use tracker_types::api::MessageResponse;
use tracker_types::models::{Subscription, User};

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::state::{AppState, run_blocking};

/// Many-to-many watch list between users and events.
#[derive(Clone)]
pub struct SubscriptionService {
    db: Arc<Database>,
}

impl SubscriptionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Idempotent. Returns true when a new subscription was recorded.
    pub async fn subscribe(&self, event_id: i64, user_id: i64) -> Result<bool, ApiError> {
        run_blocking(&self.db, move |db| {
            if !db.event_exists(event_id)? {
                return Ok(None);
            }
            db.subscribe(event_id, user_id).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("event not found"))
    }

    /// Idempotent. Returns true when a subscription was removed.
    pub async fn unsubscribe(&self, event_id: i64, user_id: i64) -> Result<bool, ApiError> {
        run_blocking(&self.db, move |db| db.unsubscribe(event_id, user_id)).await
    }

    /// Users currently subscribed to the event.
    pub async fn subscribers(&self, event_id: i64) -> Result<Vec<User>, ApiError> {
        run_blocking(&self.db, move |db| {
            db.subscribers(event_id)?
                .into_iter()
                .map(User::try_from)
                .collect()
        })
        .await
    }

    pub async fn count(&self, event_id: i64) -> Result<usize, ApiError> {
        run_blocking(&self.db, move |db| db.count_subscribers(event_id)).await
    }

    pub async fn for_user(&self, user_id: i64) -> Result<Vec<Subscription>, ApiError> {
        run_blocking(&self.db, move |db| {
            Ok(db
                .subscriptions_for_user(user_id)?
                .into_iter()
                .map(Subscription::from)
                .collect())
        })
        .await
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/events/{id}/subscribe
pub async fn subscribe_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(event_id) = path?;
    if state.subscriptions.subscribe(event_id, identity.user_id).await? {
        info!("User {} subscribed to event {}", identity.user_id, event_id);
    }
    Ok(Json(MessageResponse::new("subscribed")))
}

/// DELETE /api/events/{id}/subscribe
pub async fn unsubscribe_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(event_id) = path?;
    if state.subscriptions.unsubscribe(event_id, identity.user_id).await? {
        info!("User {} unsubscribed from event {}", identity.user_id, event_id);
    }
    Ok(Json(MessageResponse::new("unsubscribed")))
}

/// GET /api/subscriptions: the caller's own subscriptions.
pub async fn list_my_subscriptions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.subscriptions.for_user(identity.user_id).await?))
}
