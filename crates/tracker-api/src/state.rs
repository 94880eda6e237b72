use std::sync::Arc;

use anyhow::anyhow;
use tracker_db::Database;

use crate::auth::AuthService;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::events::EventService;
use crate::media::MediaService;
use crate::storage::BlobStore;
use crate::subscriptions::SubscriptionService;
use crate::witness::{Notifier, WitnessService};

pub type AppState = Arc<AppStateInner>;

/// Everything a request handler can reach. Built once at startup from a
/// `Config`; nothing here is mutated afterwards.
pub struct AppStateInner {
    pub credentials: Arc<Credentials>,
    pub auth: AuthService,
    pub events: EventService,
    pub subscriptions: SubscriptionService,
    pub media: MediaService,
    pub witnesses: WitnessService,
}

impl AppStateInner {
    pub async fn new(
        db: Database,
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<AppState> {
        let db = Arc::new(db);
        let credentials = Arc::new(Credentials::new(&config.jwt_secret, config.password_cost)?);
        let blobs = Arc::new(BlobStore::new(config.media_dir.clone()).await?);
        let subscriptions = SubscriptionService::new(db.clone());

        Ok(Arc::new(Self {
            credentials: credentials.clone(),
            auth: AuthService::new(db.clone(), credentials),
            events: EventService::new(db.clone(), blobs.clone()),
            media: MediaService::new(db.clone(), blobs),
            witnesses: WitnessService::new(db, subscriptions.clone(), notifier),
            subscriptions,
        }))
    }
}

/// Run a store call off the async runtime.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
        .map_err(ApiError::Internal)
}
