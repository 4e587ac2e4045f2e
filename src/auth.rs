use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::PortalError,
    repository::RepositoryState,
    roles::Role,
    session::resolve_role,
};

/// Claims
///
/// The subset of a Supabase access token this service relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the auth provider's user UUID, the key into `user_roles` and `doctors.user_id`.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    /// Audience, normally `"authenticated"` for signed-in Supabase users.
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. `role` is `None` when the user has no
/// role row (or it could not be read); such users are still authenticated.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Option<Role>,
    /// The bearer token the request came with; absent for the local header bypass.
    pub access_token: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    /// Rejects the request with `Forbidden` unless the user holds one of `allowed`.
    pub fn require_any(&self, allowed: &[Role]) -> Result<(), PortalError> {
        match self.role {
            Some(role) if allowed.contains(&role) => Ok(()),
            _ => Err(PortalError::Forbidden(format!(
                "requires one of: {}",
                allowed
                    .iter()
                    .map(|r| r.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header with a UUID authenticates directly.
/// 2. Otherwise a `Bearer` token must be present, correctly signed, unexpired and carrying the
///    configured audience.
/// 3. The role is resolved softly through `resolve_role`; a lookup failure leaves it `None`.
///
/// Rejection: `PortalError::Auth` (401) on any authentication failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = PortalError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|id_str| Uuid::parse_str(id_str).ok());
            if let Some(user_id) = bypass_id {
                tracing::debug!(%user_id, "local x-user-id bypass");
                let role = resolve_role(repo.as_ref(), Some(user_id)).await;
                return Ok(AuthUser {
                    id: user_id,
                    role,
                    access_token: None,
                });
            }
        }

        let token = bearer_token(parts)
            .ok_or_else(|| PortalError::Auth("missing bearer token".to_string()))?;

        let claims = decode_claims(token, &config)?;
        let role = resolve_role(repo.as_ref(), Some(claims.sub)).await;

        Ok(AuthUser {
            id: claims.sub,
            role,
            access_token: Some(token.to_string()),
        })
    }
}

/// Optional form, for endpoints that answer both signed-in and anonymous callers.
/// Any authentication failure yields `None`.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(
            <AuthUser as FromRequestParts<S>>::from_request_parts(parts, state)
                .await
                .ok(),
        )
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Validates signature, expiry and audience of an access token.
pub fn decode_claims(token: &str, config: &AppConfig) -> Result<Claims, PortalError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.set_audience(&[config.jwt_audience.as_str()]);

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => PortalError::Auth("session expired".to_string()),
            _ => {
                tracing::debug!(error = ?e, "rejected access token");
                PortalError::Auth("invalid session token".to_string())
            }
        })
}
