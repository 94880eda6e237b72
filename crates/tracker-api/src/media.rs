use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Extension, Json,
    body::{Body, Bytes},
    extract::{
        Multipart, Path, State,
        multipart::MultipartRejection,
        rejection::PathRejection,
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use tracker_db::Database;
use tracker_types::api::MessageResponse;
use tracker_types::models::{Media, MediaType};

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::state::{AppState, run_blocking};
use crate::storage::{BlobStore, sanitize_filename};

/// 10 MB cap on an upload request body.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Event-scoped evidence: blob on disk plus a metadata row.
///
/// A row is only written after its blob is durably on disk, and a blob whose
/// row could not be written is removed again.
pub struct MediaService {
    db: Arc<Database>,
    blobs: Arc<BlobStore>,
}

impl MediaService {
    pub fn new(db: Arc<Database>, blobs: Arc<BlobStore>) -> Self {
        Self { db, blobs }
    }

    async fn require_event(&self, event_id: i64) -> Result<(), ApiError> {
        if run_blocking(&self.db, move |db| db.event_exists(event_id)).await? {
            Ok(())
        } else {
            Err(ApiError::not_found("event not found"))
        }
    }

    /// Store an upload for an event. `kind` must be "photo" or "video".
    pub async fn upload(
        &self,
        event_id: i64,
        filename: &str,
        kind: &str,
        data: &[u8],
    ) -> Result<Media, ApiError> {
        let kind: MediaType = kind
            .parse()
            .map_err(|_| ApiError::validation("invalid media type"))?;
        let filename =
            sanitize_filename(filename).ok_or_else(|| ApiError::validation("invalid filename"))?;

        self.require_event(event_id).await?;

        let path = self
            .blobs
            .write_blob(event_id, &filename, data)
            .await
            .map_err(|e| ApiError::Internal(e.context("failed to save file")))?;
        let file_path = path.to_string_lossy().into_owned();

        let stored = file_path.clone();
        let inserted = run_blocking(&self.db, move |db| db.insert_media(event_id, &stored, kind)).await;

        let id = match inserted {
            Ok(id) => id,
            Err(e) => {
                // Compensate: the blob must not outlive its failed row.
                if let Err(cleanup) = self.blobs.delete_blob(&path).await {
                    error!("Orphaned blob {} after failed insert: {}", path.display(), cleanup);
                }
                return Err(e);
            }
        };

        info!("Stored {} {} for event {} ({} bytes)", kind, file_path, event_id, data.len());
        Ok(Media {
            id,
            event_id,
            file_path,
            kind,
        })
    }

    /// Media of an event, newest first.
    pub async fn list_for_event(&self, event_id: i64) -> Result<Vec<Media>, ApiError> {
        self.require_event(event_id).await?;
        run_blocking(&self.db, move |db| {
            db.media_for_event(event_id)?
                .into_iter()
                .map(Media::try_from)
                .collect()
        })
        .await
    }

    pub async fn get(&self, media_id: i64) -> Result<Media, ApiError> {
        run_blocking(&self.db, move |db| db.get_media(media_id)?.map(Media::try_from).transpose())
            .await?
            .ok_or_else(|| ApiError::not_found("media not found"))
    }

    /// Delete blob then row. A blob that is already gone is fine; any other
    /// blob failure leaves the row in place for a retry.
    pub async fn delete(&self, media_id: i64) -> Result<(), ApiError> {
        let media = self.get(media_id).await?;

        self.blobs
            .delete_blob(&PathBuf::from(&media.file_path))
            .await
            .map_err(|e| ApiError::Internal(e.context("failed to delete file")))?;

        run_blocking(&self.db, move |db| db.delete_media(media_id)).await?;
        info!("Deleted media {} of event {}", media_id, media.event_id);
        Ok(())
    }

    /// Open the stored blob for streaming.
    pub async fn open(&self, media_id: i64) -> Result<(Media, tokio::fs::File), ApiError> {
        let media = self.get(media_id).await?;
        match tokio::fs::File::open(&media.file_path).await {
            Ok(file) => Ok((media, file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::not_found("media file missing"))
            }
            Err(e) => Err(ApiError::Internal(e.into())),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/events/{id}/media: multipart with a `file` part and a `type`
/// field of "photo" or "video".
pub async fn upload_media(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(event_id) = path?;
    let mut multipart = multipart?;

    let mut file: Option<(String, Bytes)> = None;
    let mut kind = String::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                file = Some((filename, data));
            }
            Some("type") => kind = field.text().await?,
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::validation("missing file"))?;
    let media = state.media.upload(event_id, &filename, &kind, &data).await?;
    info!("User {} uploaded media {} to event {}", identity.user_id, media.id, event_id);

    Ok((StatusCode::CREATED, Json(media)))
}

/// GET /api/events/{id}/media
pub async fn list_event_media(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Media>>, ApiError> {
    let Path(event_id) = path?;
    Ok(Json(state.media.list_for_event(event_id).await?))
}

/// GET /api/events/{id}/media/{media_id}
pub async fn get_media(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<Media>, ApiError> {
    let Path((_event_id, media_id)) = path?;
    Ok(Json(state.media.get(media_id).await?))
}

/// GET /api/events/{id}/media/{media_id}/file: streams the stored bytes.
pub async fn download_media(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((_event_id, media_id)) = path?;
    let (_media, file) = state.media.open(media_id).await?;

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], body))
}

/// DELETE /api/events/{id}/media/{media_id}
pub async fn delete_media(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path((_event_id, media_id)) = path?;
    state.media.delete(media_id).await?;
    info!("Media {} deleted by user {}", media_id, identity.user_id);
    Ok(Json(MessageResponse::new("media deleted")))
}
