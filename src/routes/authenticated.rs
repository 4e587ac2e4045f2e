use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Routes behind the `AuthUser` middleware layer. Handlers still take `AuthUser` themselves
/// for the owner-or-admin checks on doctor records.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /auth/sign-out
        .route("/auth/sign-out", post(handlers::sign_out))
        // GET /me
        // Current identity, role and landing path.
        .route("/me", get(handlers::get_me))
        // --- Doctor Profiles ---
        // GET/POST /doctors
        // POST is the final step of the multi-step form and carries the initial specializations.
        .route(
            "/doctors",
            get(handlers::list_doctors).post(handlers::create_doctor),
        )
        // GET /doctors/me
        // The caller's own profile, for the doctor dashboard.
        .route("/doctors/me", get(handlers::get_my_doctor_profile))
        // GET/PUT/DELETE /doctors/{id}
        .route(
            "/doctors/{id}",
            get(handlers::get_doctor_profile)
                .put(handlers::update_doctor)
                .delete(handlers::delete_doctor),
        )
        // PUT /doctors/{id}/specializations
        // Reconciles the mapping to exactly the submitted names.
        .route(
            "/doctors/{id}/specializations",
            put(handlers::sync_doctor_specializations),
        )
        // --- Child Records ---
        .route("/doctors/{id}/education", post(handlers::add_education))
        .route(
            "/doctors/{id}/education/{record_id}",
            delete(handlers::delete_education),
        )
        .route(
            "/doctors/{id}/certifications",
            post(handlers::add_certification),
        )
        .route(
            "/doctors/{id}/certifications/{record_id}",
            delete(handlers::delete_certification),
        )
        .route("/doctors/{id}/availability", post(handlers::add_availability))
        .route(
            "/doctors/{id}/availability/{record_id}",
            delete(handlers::delete_availability),
        )
}
