use crate::{AppState, handlers};
use axum::{Router, routing::put};

/// Admin Router Module
///
/// Nested under `/admin`. The router itself applies no role layer; every handler takes
/// `AuthUser` and calls `require_any(&[Role::Admin])` before touching data.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // PUT /admin/users/{id}/role
        // Assigns the single role a user holds, which decides their landing dashboard.
        .route("/users/{id}/role", put(handlers::assign_role))
}
