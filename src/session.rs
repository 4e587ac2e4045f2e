use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::PortalError,
    identity::IdentityProvider,
    models::{AuthStatus, SignInRequest, SignInResponse},
    repository::Repository,
    roles::{DEFAULT_DESTINATION, Role, SIGN_IN_PATH},
};

/// SessionState
///
/// Where a request ends up after authentication. Every terminal state maps to exactly one
/// redirect; there is no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    AuthFailed,
    RoleKnown(Role),
    RoleUnknown,
}

impl SessionState {
    /// The state reached once credentials were accepted and the role lookup finished.
    pub fn authenticated(role: Option<Role>) -> Self {
        match role {
            Some(role) => SessionState::RoleKnown(role),
            None => SessionState::RoleUnknown,
        }
    }

    pub fn is_authenticated(self) -> bool {
        matches!(self, SessionState::RoleKnown(_) | SessionState::RoleUnknown)
    }

    pub fn redirect_target(self) -> &'static str {
        match self {
            SessionState::Unauthenticated | SessionState::AuthFailed => SIGN_IN_PATH,
            SessionState::RoleKnown(role) => role.landing_path(),
            SessionState::RoleUnknown => DEFAULT_DESTINATION,
        }
    }
}

/// resolve_role
///
/// Looks up the session user's role through the `user_roles` join. Never fails: no session,
/// no mapping row, an unknown role name, or a backend error all resolve to `None`, which
/// callers treat as "default destination".
pub async fn resolve_role(repo: &dyn Repository, session_user_id: Option<Uuid>) -> Option<Role> {
    let user_id = session_user_id?;
    match repo.get_role_name(user_id).await {
        Ok(Some(name)) => {
            let role = Role::from_name(&name);
            if role.is_none() {
                tracing::warn!(%user_id, role_name = %name, "user has an unrecognized role name");
            }
            role
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "role lookup failed, falling back to default destination");
            None
        }
    }
}

/// sign_in
///
/// Verifies credentials with the identity provider, then consults the role resolver once.
/// Authentication and role resolution are separate failure domains: once the credentials are
/// accepted the outcome is a success, whatever the role lookup does.
pub async fn sign_in(
    identity: &dyn IdentityProvider,
    repo: &dyn Repository,
    credentials: &SignInRequest,
) -> Result<SignInResponse, PortalError> {
    credentials.validate()?;

    let session = identity
        .sign_in_with_password(&credentials.email, &credentials.password)
        .await
        .inspect_err(|e| tracing::info!(error = %e, "sign-in rejected"))?;

    let role = resolve_role(repo, Some(session.user_id)).await;
    let state = SessionState::authenticated(role);
    tracing::info!(user_id = %session.user_id, ?state, "user signed in");

    Ok(SignInResponse {
        success: true,
        user_id: session.user_id,
        email: session.email,
        role,
        redirect_to: state.redirect_target().to_string(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
    })
}

/// check_auth_status
///
/// Where should this caller go right now? Anonymous callers are sent to the sign-in page.
pub fn check_auth_status(auth: Option<&AuthUser>) -> AuthStatus {
    let state = match auth {
        Some(user) => SessionState::authenticated(user.role),
        None => SessionState::Unauthenticated,
    };
    AuthStatus {
        authenticated: state.is_authenticated(),
        user_id: auth.map(|u| u.id),
        role: auth.and_then(|u| u.role),
        redirect_to: state.redirect_target().to_string(),
    }
}

/// sign_out
///
/// Revokes the caller's session at the identity provider. Sessions established through the
/// local header bypass carry no token and have nothing to revoke.
pub async fn sign_out(identity: &dyn IdentityProvider, auth: &AuthUser) -> Result<(), PortalError> {
    match auth.access_token.as_deref() {
        Some(token) => identity.sign_out(token).await,
        None => Ok(()),
    }
}
