use std::path::PathBuf;

use anyhow::Context;

use crate::credentials::PasswordCost;

/// Signing secrets that are only fit for local development.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Process-wide settings, read once at startup and handed to constructors.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub media_dir: PathBuf,
    pub password_cost: PasswordCost,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let defaults = PasswordCost::default();

        Ok(Self {
            host: get("TRACKER_HOST", "0.0.0.0"),
            port: get("TRACKER_PORT", "8080")
                .parse()
                .context("TRACKER_PORT must be a port number")?,
            db_path: get("TRACKER_DB_PATH", "tracker.db").into(),
            jwt_secret: get("TRACKER_JWT_SECRET", "dev-secret-change-me"),
            media_dir: get("TRACKER_MEDIA_DIR", "./media").into(),
            password_cost: PasswordCost {
                memory_kib: get("TRACKER_PASSWORD_MEMORY_KIB", &defaults.memory_kib.to_string())
                    .parse()
                    .context("TRACKER_PASSWORD_MEMORY_KIB must be an integer")?,
                iterations: get("TRACKER_PASSWORD_COST", &defaults.iterations.to_string())
                    .parse()
                    .context("TRACKER_PASSWORD_COST must be an integer")?,
            },
        })
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }
}
