use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use tracker_db::Database;
use tracker_db::models::EventRecord;
use tracker_types::api::{EventCreatedResponse, EventRequest, MessageResponse};
use tracker_types::models::ArrestEvent;

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::state::{AppState, run_blocking};
use crate::storage::BlobStore;

/// Decides whether `identity` may change or remove `event`.
///
/// Any authenticated caller may, today. A creator-only or advocate-only rule
/// goes here and nowhere else.
pub fn authorize_event_mutation(_identity: &Identity, _event: &ArrestEvent) -> Result<(), ApiError> {
    Ok(())
}

/// Zero is the "unset" sentinel for either coordinate and is never accepted.
fn validate(req: &EventRequest) -> Result<(), ApiError> {
    if req.latitude == 0.0 || req.longitude == 0.0 {
        return Err(ApiError::validation("latitude and longitude are required"));
    }
    if !(-90.0..=90.0).contains(&req.latitude) || !(-180.0..=180.0).contains(&req.longitude) {
        return Err(ApiError::validation("latitude or longitude out of range"));
    }
    Ok(())
}

fn to_record(req: EventRequest) -> EventRecord {
    EventRecord {
        time: req.time.unwrap_or_else(chrono::Utc::now),
        latitude: req.latitude,
        longitude: req.longitude,
        police_count: req.police_count,
        arrested_count: req.arrested_count,
        car_plates: req.car_plates.filter(|s| !s.is_empty()),
        notes: req.notes.filter(|s| !s.is_empty()),
    }
}

pub struct EventService {
    db: Arc<Database>,
    blobs: Arc<BlobStore>,
}

impl EventService {
    pub fn new(db: Arc<Database>, blobs: Arc<BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// All events, newest first.
    pub async fn list(&self) -> Result<Vec<ArrestEvent>, ApiError> {
        run_blocking(&self.db, |db| {
            db.list_events()?
                .into_iter()
                .map(ArrestEvent::try_from)
                .collect()
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<ArrestEvent, ApiError> {
        run_blocking(&self.db, move |db| db.get_event(id)?.map(ArrestEvent::try_from).transpose())
            .await?
            .ok_or_else(|| ApiError::not_found("event not found"))
    }

    /// The creator is always the caller, whatever the body says.
    pub async fn create(&self, identity: &Identity, req: EventRequest) -> Result<i64, ApiError> {
        validate(&req)?;
        let record = to_record(req);
        let creator = identity.user_id;

        let id = run_blocking(&self.db, move |db| db.insert_event(&record, creator)).await?;
        info!("Event {} created by user {}", id, creator);
        Ok(id)
    }

    pub async fn update(&self, identity: &Identity, id: i64, req: EventRequest) -> Result<(), ApiError> {
        validate(&req)?;
        let existing = self.get(id).await?;
        authorize_event_mutation(identity, &existing)?;

        let record = to_record(req);
        let updated = run_blocking(&self.db, move |db| db.update_event(id, &record)).await?;
        if !updated {
            return Err(ApiError::not_found("event not found"));
        }

        info!("Event {} updated by user {}", id, identity.user_id);
        Ok(())
    }

    /// Removes the event with its media and subscription rows, then its blob
    /// directory.
    pub async fn delete(&self, identity: &Identity, id: i64) -> Result<(), ApiError> {
        let existing = self.get(id).await?;
        authorize_event_mutation(identity, &existing)?;

        let deleted = run_blocking(&self.db, move |db| db.delete_event(id)).await?;
        if !deleted {
            return Err(ApiError::not_found("event not found"));
        }

        if let Err(e) = self.blobs.remove_event_dir(id).await {
            warn!("Event {} deleted but its media directory was not: {}", id, e);
        }

        info!("Event {} deleted by user {}", id, identity.user_id);
        Ok(())
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// GET /api/events
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<ArrestEvent>>, ApiError> {
    Ok(Json(state.events.list().await?))
}

/// GET /api/events/{id}
pub async fn get_event(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<ArrestEvent>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.events.get(id).await?))
}

/// POST /api/events
pub async fn create_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let id = state.events.create(&identity, req).await?;
    Ok((StatusCode::CREATED, Json(EventCreatedResponse { id })))
}

/// PUT /api/events/{id}
pub async fn update_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = path?;
    let Json(req) = payload?;
    state.events.update(&identity, id, req).await?;
    Ok(Json(MessageResponse::new("event updated")))
}

/// DELETE /api/events/{id}
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = path?;
    state.events.delete(&identity, id).await?;
    Ok(Json(MessageResponse::new("event deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestApp, event_request};
    use chrono::{TimeZone, Utc};
    use tracker_types::models::{MediaType, Role};

    #[tokio::test]
    async fn zero_coordinates_never_validate() {
        let app = TestApp::new().await;
        let spotter = app.user("a@x.com", Role::Spotter).await;

        for (lat, lon) in [(0.0, 2.0), (1.0, 0.0), (0.0, 0.0)] {
            let mut req = event_request(lat, lon);
            req.notes = Some("anything".into());
            req.arrested_count = 50;
            let err = app.state.events.create(&spotter, req).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "({lat}, {lon})");
        }
        assert!(app.state.events.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_rejected() {
        let app = TestApp::new().await;
        let spotter = app.user("a@x.com", Role::Spotter).await;
        let err = app
            .state
            .events
            .create(&spotter, event_request(91.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn creator_comes_from_identity() {
        let app = TestApp::new().await;
        let spotter = app.user("a@x.com", Role::Spotter).await;
        let id = app.event(&spotter).await;

        let event = app.state.events.get(id).await.unwrap();
        assert_eq!(event.created_by, spotter.user_id);
        assert_eq!(event.police_count, 3);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let app = TestApp::new().await;
        let spotter = app.user("a@x.com", Role::Spotter).await;

        let mut ids = Vec::new();
        for day in [3, 1, 2] {
            let mut req = event_request(1.0, 2.0);
            req.time = Some(Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap());
            ids.push(app.state.events.create(&spotter, req).await.unwrap());
        }

        let listed: Vec<i64> = app.state.events.list().await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(listed, vec![ids[0], ids[2], ids[1]]);
    }

    #[tokio::test]
    async fn anyone_authenticated_may_update() {
        let app = TestApp::new().await;
        let creator = app.user("a@x.com", Role::Spotter).await;
        let other = app.user("b@x.com", Role::Spotter).await;
        let id = app.event(&creator).await;

        let mut req = event_request(5.0, 6.0);
        req.notes = Some("corrected".into());
        app.state.events.update(&other, id, req).await.unwrap();

        let event = app.state.events.get(id).await.unwrap();
        assert_eq!(event.latitude, 5.0);
        assert_eq!(event.notes.as_deref(), Some("corrected"));
        assert_eq!(event.created_by, creator.user_id);
    }

    #[tokio::test]
    async fn missing_event_is_not_found_not_invalid() {
        let app = TestApp::new().await;
        let spotter = app.user("a@x.com", Role::Spotter).await;

        let update = app
            .state
            .events
            .update(&spotter, 404, event_request(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(update, ApiError::NotFound(_)));

        let delete = app.state.events.delete(&spotter, 404).await.unwrap_err();
        assert!(matches!(delete, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_children_and_blobs() {
        let app = TestApp::new().await;
        let spotter = app.user("a@x.com", Role::Spotter).await;
        let id = app.event(&spotter).await;
        app.state.subscriptions.subscribe(id, spotter.user_id).await.unwrap();
        let media = app
            .state
            .media
            .upload(id, "a.jpg", MediaType::Photo.as_str(), b"jpeg")
            .await
            .unwrap();

        app.state.events.delete(&spotter, id).await.unwrap();

        assert!(matches!(app.state.events.get(id).await, Err(ApiError::NotFound(_))));
        assert!(matches!(app.state.media.get(media.id).await, Err(ApiError::NotFound(_))));
        assert_eq!(app.state.witnesses.count(id).await.unwrap(), 0);
        assert!(!std::path::Path::new(&media.file_path).exists());
    }
}
