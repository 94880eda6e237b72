use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
};
use tracing::info;

use tracker_db::Database;
use tracker_types::api::{ContactWitnessRequest, MessageResponse, WitnessCountResponse};

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};
use crate::subscriptions::SubscriptionService;

/// Outbound delivery of a message to resolved witness addresses.
pub trait Notifier: Send + Sync {
    fn dispatch(&self, event_id: i64, recipients: &[String], message: &str) -> anyhow::Result<()>;
}

/// Writes the dispatch to the log instead of sending anything.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn dispatch(&self, event_id: i64, recipients: &[String], message: &str) -> anyhow::Result<()> {
        info!(
            event_id,
            recipients = ?recipients,
            "Contacting witnesses: {}",
            message
        );
        Ok(())
    }
}

pub struct WitnessService {
    db: Arc<Database>,
    subscriptions: SubscriptionService,
    notifier: Arc<dyn Notifier>,
}

impl WitnessService {
    pub fn new(
        db: Arc<Database>,
        subscriptions: SubscriptionService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            subscriptions,
            notifier,
        }
    }

    /// Send `message` to every subscriber of the event. Returns how many
    /// witnesses were addressed.
    pub async fn contact(&self, event_id: i64, message: &str) -> Result<usize, ApiError> {
        if !run_blocking(&self.db, move |db| db.event_exists(event_id)).await? {
            return Err(ApiError::not_found("event not found"));
        }

        let subscribers = self.subscriptions.subscribers(event_id).await?;
        if subscribers.is_empty() {
            return Err(ApiError::validation("no witnesses subscribed to this event"));
        }

        let emails: Vec<String> = subscribers.into_iter().map(|u| u.email).collect();
        self.notifier.dispatch(event_id, &emails, message)?;
        Ok(emails.len())
    }

    /// Number of subscribers. A nonexistent event simply has none, unlike
    /// `contact`, which reports it as not found.
    pub async fn count(&self, event_id: i64) -> Result<usize, ApiError> {
        self.subscriptions.count(event_id).await
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/events/{id}/contact-witnesses
pub async fn contact_witnesses(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ContactWitnessRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(event_id) = path?;
    let Json(req) = payload?;
    if req.message.is_empty() {
        return Err(ApiError::validation("message is required"));
    }

    let sent = state.witnesses.contact(event_id, &req.message).await?;
    info!("Notified {} witnesses of event {}", sent, event_id);
    Ok(Json(MessageResponse::new("witnesses notified")))
}

/// GET /api/events/{id}/witness-count
pub async fn witness_count(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<WitnessCountResponse>, ApiError> {
    let Path(event_id) = path?;
    let count = state.witnesses.count(event_id).await?;
    Ok(Json(WitnessCountResponse { count }))
}
