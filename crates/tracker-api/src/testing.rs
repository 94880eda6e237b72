use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tracker_db::Database;
use tracker_types::api::EventRequest;
use tracker_types::models::Role;

use crate::config::Config;
use crate::credentials::PasswordCost;
use crate::middleware::Identity;
use crate::state::{AppState, AppStateInner};
use crate::witness::Notifier;

/// One recorded `Notifier::dispatch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub event_id: i64,
    pub recipients: Vec<String>,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Dispatch>>,
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, event_id: i64, recipients: &[String], message: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Dispatch {
            event_id,
            recipients: recipients.to_vec(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// In-memory store plus a throwaway blob area.
pub struct TestApp {
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub media_root: std::path::PathBuf,
    _tmp: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let media_root = tmp.path().join("media");
        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            db_path: ":memory:".into(),
            jwt_secret: "test-secret".into(),
            media_dir: media_root.clone(),
            password_cost: PasswordCost {
                memory_kib: 1024,
                iterations: 1,
            },
        };
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppStateInner::new(Database::open_in_memory().unwrap(), &config, notifier.clone())
            .await
            .unwrap();

        Self {
            state,
            notifier,
            media_root,
            _tmp: tmp,
        }
    }

    pub async fn user(&self, email: &str, role: Role) -> Identity {
        let user = self
            .state
            .auth
            .register(email, "pw", Some(role.as_str()))
            .await
            .unwrap();
        Identity {
            user_id: user.id,
            role: user.role,
        }
    }

    pub async fn event(&self, creator: &Identity) -> i64 {
        self.state
            .events
            .create(creator, event_request(1.0, 2.0))
            .await
            .unwrap()
    }
}

pub fn event_request(latitude: f64, longitude: f64) -> EventRequest {
    EventRequest {
        latitude,
        longitude,
        police_count: 3,
        arrested_count: 1,
        ..EventRequest::default()
    }
}
