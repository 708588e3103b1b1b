//! Access gate: bearer-token authentication and role checks as axum middleware.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::verifier::TokenVerifier;
use super::{Role, VerifiedIdentity};
use crate::ApiError;

/// Produces [`RoleGuard`]s sharing one [`TokenVerifier`].
#[derive(Debug, Clone)]
pub struct AccessGate {
    verifier: Arc<TokenVerifier>,
}

impl AccessGate {
    /// Gate verifying tokens with `verifier`
    #[must_use]
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Guard admitting any verified caller whose role is in `roles`.
    /// An empty slice admits every verified caller.
    #[must_use]
    pub fn require(&self, roles: &[Role]) -> RoleGuard {
        RoleGuard {
            verifier: Arc::clone(&self.verifier),
            roles: roles.into(),
        }
    }
}

/// Middleware state for [`enforce`]
#[derive(Debug, Clone)]
pub struct RoleGuard {
    verifier: Arc<TokenVerifier>,
    roles: Arc<[Role]>,
}

impl RoleGuard {
    /// Authenticate the request headers and check the role.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] for a missing or invalid token,
    /// [`ApiError::Forbidden`] for a valid token with a disallowed role.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, ApiError> {
        let Some(token) = bearer_token(headers) else {
            debug!("Request without bearer token");
            return Err(ApiError::Unauthorized);
        };

        let claims = self.verifier.verify(token).await.map_err(|e| {
            warn!(reason = %e, "Token verification failed");
            ApiError::Unauthorized
        })?;

        if !self.roles.is_empty() && !self.roles.contains(&claims.role) {
            debug!(user_id = %claims.sub, role = %claims.role, "Role not permitted");
            return Err(ApiError::Forbidden);
        }

        Ok(claims.into())
    }
}

/// Middleware: admit the request only if [`RoleGuard::authorize`] passes, and
/// hand the [`VerifiedIdentity`] to the handler through request extensions.
pub async fn enforce(
    State(guard): State<RoleGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = guard.authorize(request.headers()).await?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<S> FromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}
