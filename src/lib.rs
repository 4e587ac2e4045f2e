use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod memory;
pub mod models;
pub mod repository;
pub mod roles;
pub mod session;
pub mod specializations;

// Routing, split by access level (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::PortalError;
pub use identity::{IdentityState, MockIdentityProvider, SupabaseIdentityClient};
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};
pub use roles::{DEFAULT_DESTINATION, Role, SIGN_IN_PATH, redirect_target};

/// ApiDoc
///
/// OpenAPI document for every `#[utoipa::path]` handler and the schemas they exchange.
/// Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::sign_in, handlers::sign_out, handlers::auth_status, handlers::get_me,
        handlers::assign_role, handlers::list_doctors, handlers::get_doctor_profile,
        handlers::get_my_doctor_profile, handlers::create_doctor, handlers::update_doctor,
        handlers::delete_doctor, handlers::sync_doctor_specializations,
        handlers::list_specializations, handlers::add_education, handlers::delete_education,
        handlers::add_certification, handlers::delete_certification,
        handlers::add_availability, handlers::delete_availability
    ),
    components(
        schemas(
            roles::Role, models::ActionResult, models::SignInRequest, models::SignInResponse,
            models::AuthStatus, models::AssignRoleRequest, models::Doctor,
            models::CreateDoctorRequest, models::UpdateDoctorRequest, models::Specialization,
            models::SyncSpecializationsRequest, models::SyncReport, models::Education,
            models::NewEducation, models::Certification, models::NewCertification,
            models::AvailabilitySlot, models::NewAvailabilitySlot, models::DoctorProfile,
        )
    ),
    tags(
        (name = "care-portal", description = "Healthcare Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Single shared container for the services every request may need. Cloned per request;
/// each field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, `InMemoryRepository` in tests.
    pub repo: RepositoryState,
    /// Identity Layer: credential checks and session revocation (Supabase Auth or a mock).
    pub identity: IdentityState,
    /// Configuration: The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for `authenticated_routes`. Extracting `AuthUser` is the whole check:
/// a failed extraction rejects with the 401 envelope before the handler runs.
async fn auth_middleware(
    _auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles public, authenticated and admin routers, the Swagger UI and the
/// request-id/tracing/CORS layers around them.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))

        // Public Routes: No middleware applied.
        .merge(public::public_routes())

        // Authenticated Routes: Protected by the `auth_middleware`.
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware
                ))
        )

        // Admin Routes: Nested under '/admin'. Handlers authenticate via `AuthUser` and check
        // the Admin role themselves.
        .nest("/admin", admin::admin_routes())

        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
             ServiceBuilder::new()
                 // 3a. Request ID Generation: Generates a unique UUID for every incoming request.
                 .layer(SetRequestIdLayer::new(
                     x_request_id.clone(),
                     MakeRequestUuid,
                 ))
                 // 3b. Request Tracing: Wraps the entire request/response lifecycle in a tracing span.
                 // Uses the `trace_span_logger` to include the generated request ID.
                 .layer(
                     TraceLayer::new_for_http()
                         .make_span_with(trace_span_logger)
                         .on_response(
                             DefaultOnResponse::new()
                                 .level(Level::INFO)
                                 .latency_unit(tower_http::LatencyUnit::Millis)
                         )
                 )
                 // 3c. Request ID Propagation: echoes x-request-id back to the client.
                 .layer(PropagateRequestIdLayer::new(x_request_id))
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by `SetRequestIdLayer`,
/// so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
