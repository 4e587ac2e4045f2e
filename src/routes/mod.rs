/// Router Module Index
///
/// Routing is split by access level; authentication is applied per module as an axum layer.

/// Routes open to anonymous callers.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Routes restricted to the Admin role.
pub mod admin;
