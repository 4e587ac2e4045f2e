use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: the sign-in gateway, the status probe used by the
/// landing page, and the shared specialization catalogue the doctor form suggests from.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/sign-in
        // Password sign-in. Answers with the landing path for the user's role.
        .route("/auth/sign-in", post(handlers::sign_in))
        // GET /auth/status
        // Signed-in or not, and where to go. Uses the optional `AuthUser` extractor so that
        // anonymous callers get a 200 pointing at `/login` instead of a 401.
        .route("/auth/status", get(handlers::auth_status))
        // GET /specializations
        .route("/specializations", get(handlers::list_specializations))
}
