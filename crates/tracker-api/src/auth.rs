use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use tracker_db::Database;
use tracker_types::api::{LoginRequest, LoginResponse, RegisterRequest};
use tracker_types::models::{Role, User};

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// Registration and login over the user directory.
pub struct AuthService {
    db: Arc<Database>,
    credentials: Arc<Credentials>,
}

impl AuthService {
    pub fn new(db: Arc<Database>, credentials: Arc<Credentials>) -> Self {
        Self { db, credentials }
    }

    /// Create an account. The role defaults to spotter and cannot change later.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<User, ApiError> {
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::validation("email and password are required"));
        }
        let role = match role.filter(|r| !r.is_empty()) {
            None => Role::Spotter,
            Some(r) => r
                .parse::<Role>()
                .map_err(|_| ApiError::validation("invalid role, must be 'spotter' or 'advocate'"))?,
        };

        let lookup = email.to_string();
        let existing = run_blocking(&self.db, move |db| db.get_user_by_email(&lookup)).await?;
        if existing.is_some() {
            return Err(ApiError::Conflict("user already exists".into()));
        }

        let credentials = self.credentials.clone();
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || credentials.hash(&password))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

        // The unique index decides if another registration won the race.
        let owned_email = email.to_string();
        let id = run_blocking(&self.db, move |db| db.create_user(&owned_email, &hash, role))
            .await?
            .ok_or_else(|| ApiError::Conflict("user already exists".into()))?;

        info!("Registered user {} as {}", id, role);
        Ok(User {
            id,
            email: email.to_string(),
            role,
        })
    }

    /// Check a password and issue a token. Unknown email and wrong password
    /// fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        if email.is_empty() || password.is_empty() {
            return Err(ApiError::validation("email and password are required"));
        }

        let lookup = email.to_string();
        let row = run_blocking(&self.db, move |db| db.get_user_by_email(&lookup))
            .await?
            .ok_or(ApiError::Unauthorized("invalid credentials"))?;

        let credentials = self.credentials.clone();
        let password = password.to_string();
        let stored = row.password.clone();
        let matches = tokio::task::spawn_blocking(move || credentials.verify(&password, &stored))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?;
        if !matches {
            return Err(ApiError::Unauthorized("invalid credentials"));
        }

        let user = User::try_from(row)?;
        let token = self.credentials.issue(user.id, user.role)?;
        Ok(token)
    }
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let user = state
        .auth
        .register(&req.email, &req.password, req.role.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;
    let token = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(LoginResponse { token }))
}

#[cfg(test)]
mod tests {
    use crate::error::ApiError;
    use crate::testing::TestApp;
    use tracker_types::models::Role;

    #[tokio::test]
    async fn register_then_login_carries_role() {
        let app = TestApp::new().await;
        for (email, role) in [("s@x.com", Role::Spotter), ("a@x.com", Role::Advocate)] {
            let user = app
                .state
                .auth
                .register(email, "pw", Some(role.as_str()))
                .await
                .unwrap();
            assert_eq!(user.role, role);

            let token = app.state.auth.login(email, "pw").await.unwrap();
            let claims = app.state.credentials.validate(&token).unwrap();
            assert_eq!(claims.role, role);
            assert_eq!(claims.user_id, user.id);
        }
    }

    #[tokio::test]
    async fn role_defaults_to_spotter() {
        let app = TestApp::new().await;
        let user = app.state.auth.register("d@x.com", "pw", None).await.unwrap();
        assert_eq!(user.role, Role::Spotter);
        let user = app.state.auth.register("e@x.com", "pw", Some("")).await.unwrap();
        assert_eq!(user.role, Role::Spotter);
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let app = TestApp::new().await;
        let err = app
            .state
            .auth
            .register("r@x.com", "pw", Some("admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_and_keeps_password() {
        let app = TestApp::new().await;
        app.state.auth.register("a@x.com", "pw1", None).await.unwrap();

        let err = app
            .state
            .auth
            .register("a@x.com", "pw2", Some("advocate"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        assert!(app.state.auth.login("a@x.com", "pw1").await.is_ok());
        assert!(matches!(
            app.state.auth.login("a@x.com", "pw2").await,
            Err(ApiError::Unauthorized("invalid credentials"))
        ));
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let app = TestApp::new().await;
        app.state.auth.register("a@x.com", "pw1", None).await.unwrap();

        let unknown = app.state.auth.login("nobody@x.com", "pw1").await.unwrap_err();
        let wrong = app.state.auth.login("a@x.com", "nope").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn empty_fields_are_validation_errors() {
        let app = TestApp::new().await;
        assert!(matches!(
            app.state.auth.register("", "pw", None).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            app.state.auth.login("a@x.com", "").await,
            Err(ApiError::Validation(_))
        ));
    }
}
