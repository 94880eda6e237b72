use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

use tracker_types::models::Role;

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::state::AppState;

/// Caller identity attached to an authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

/// What a route demands of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Authenticated,
    Advocate,
}

/// Resolve the `Authorization` header into an identity.
pub fn authenticate(
    header: Option<&HeaderValue>,
    credentials: &Credentials,
) -> Result<Identity, ApiError> {
    let header = header.ok_or(ApiError::Unauthorized("authorization required"))?;

    let token = header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized("invalid format"))?;

    let claims = credentials
        .validate(token)
        .map_err(|_| ApiError::Unauthorized("invalid token"))?;

    Ok(Identity {
        user_id: claims.user_id,
        role: claims.role,
    })
}

/// Capability check for an already authenticated caller.
pub fn authorize(identity: &Identity, capability: Capability) -> Result<(), ApiError> {
    match capability {
        Capability::Authenticated => Ok(()),
        Capability::Advocate if identity.role == Role::Advocate => Ok(()),
        Capability::Advocate => Err(ApiError::Forbidden("advocate access required")),
    }
}

/// Validate the bearer token and attach the caller's `Identity` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = authenticate(req.headers().get(header::AUTHORIZATION), &state.credentials)?;
    authorize(&identity, Capability::Authenticated)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Must sit inside `require_auth`.
pub async fn require_advocate(req: Request, next: Next) -> Result<Response, ApiError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or(ApiError::Unauthorized("authorization required"))?;
    authorize(identity, Capability::Advocate)?;

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::PasswordCost;

    fn creds() -> Credentials {
        Credentials::new("gate-secret", PasswordCost { memory_kib: 1024, iterations: 1 }).unwrap()
    }

    fn message(err: ApiError) -> String {
        err.to_string()
    }

    #[test]
    fn missing_header() {
        let err = authenticate(None, &creds()).unwrap_err();
        assert_eq!(message(err), "authorization required");
    }

    #[test]
    fn header_without_bearer_prefix() {
        let c = creds();
        let token = c.issue(1, Role::Spotter).unwrap();
        let raw = HeaderValue::from_str(&token).unwrap();
        assert_eq!(message(authenticate(Some(&raw), &c).unwrap_err()), "invalid format");

        let basic = HeaderValue::from_static("Basic dXNlcjpwdw==");
        assert_eq!(message(authenticate(Some(&basic), &c).unwrap_err()), "invalid format");
    }

    #[test]
    fn bad_token() {
        let value = HeaderValue::from_static("Bearer not.a.token");
        let err = authenticate(Some(&value), &creds()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized("invalid token")));
    }

    #[test]
    fn valid_token_yields_identity() {
        let c = creds();
        let value = HeaderValue::from_str(&format!("Bearer {}", c.issue(9, Role::Advocate).unwrap()))
            .unwrap();
        let identity = authenticate(Some(&value), &c).unwrap();
        assert_eq!(identity, Identity { user_id: 9, role: Role::Advocate });
    }

    #[test]
    fn advocate_capability() {
        let spotter = Identity { user_id: 1, role: Role::Spotter };
        let advocate = Identity { user_id: 2, role: Role::Advocate };

        assert!(authorize(&spotter, Capability::Authenticated).is_ok());
        assert!(matches!(
            authorize(&spotter, Capability::Advocate),
            Err(ApiError::Forbidden(_))
        ));
        assert!(authorize(&advocate, Capability::Advocate).is_ok());
    }
}
