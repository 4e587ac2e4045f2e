use care_portal::{
    InMemoryRepository, MockIdentityProvider, PortalError, Role,
    auth::AuthUser,
    models::SignInRequest,
    repository::Repository,
    session::{check_auth_status, resolve_role, sign_in, sign_out},
};
use uuid::Uuid;

const EMAIL: &str = "dr.house@clinic.test";
const PASSWORD: &str = "correct-horse";

fn credentials(email: &str, password: &str) -> SignInRequest {
    SignInRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

fn identity_for(user_id: Uuid) -> MockIdentityProvider {
    MockIdentityProvider::new().with_account(EMAIL, PASSWORD, user_id)
}

// --- resolve_role ---

#[tokio::test]
async fn test_resolve_role_without_session_is_none() {
    let repo = InMemoryRepository::new();
    assert_eq!(resolve_role(&repo, None).await, None);
}

#[tokio::test]
async fn test_resolve_role_reads_mapping() {
    let repo = InMemoryRepository::new();
    let user_id = Uuid::new_v4();
    repo.assign_role(user_id, Role::Receptionist).await.unwrap();

    assert_eq!(
        resolve_role(&repo, Some(user_id)).await,
        Some(Role::Receptionist)
    );
    // No side effects: a second call answers the same.
    assert_eq!(
        resolve_role(&repo, Some(user_id)).await,
        Some(Role::Receptionist)
    );
}

#[tokio::test]
async fn test_resolve_role_unknown_name_is_none() {
    let repo = InMemoryRepository::new();
    let user_id = Uuid::new_v4();
    repo.seed_role_name(user_id, "Janitor").await;

    assert_eq!(resolve_role(&repo, Some(user_id)).await, None);
}

#[tokio::test]
async fn test_resolve_role_backend_failure_is_none() {
    let repo = InMemoryRepository::new_unavailable();
    assert_eq!(resolve_role(&repo, Some(Uuid::new_v4())).await, None);
}

// --- sign_in ---

#[tokio::test]
async fn test_sign_in_doctor_lands_on_doctor_dashboard() {
    let user_id = Uuid::new_v4();
    let repo = InMemoryRepository::new();
    repo.assign_role(user_id, Role::Doctor).await.unwrap();

    let outcome = sign_in(&identity_for(user_id), &repo, &credentials(EMAIL, PASSWORD))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.user_id, user_id);
    assert_eq!(outcome.role, Some(Role::Doctor));
    assert_eq!(outcome.redirect_to, "/doctor/dashboard");
    assert_eq!(outcome.access_token, format!("mock-token-{}", user_id));
}

#[tokio::test]
async fn test_sign_in_without_role_uses_default_destination() {
    let user_id = Uuid::new_v4();
    let repo = InMemoryRepository::new();

    let outcome = sign_in(&identity_for(user_id), &repo, &credentials(EMAIL, PASSWORD))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.role, None);
    assert_eq!(outcome.redirect_to, "/dashboard");
}

#[tokio::test]
async fn test_sign_in_succeeds_when_role_lookup_fails() {
    let user_id = Uuid::new_v4();
    let repo = InMemoryRepository::new_unavailable();

    let outcome = sign_in(&identity_for(user_id), &repo, &credentials(EMAIL, PASSWORD))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.redirect_to, "/dashboard");
}

#[tokio::test]
async fn test_sign_in_bad_password_is_auth_error() {
    let repo = InMemoryRepository::new();
    let err = sign_in(
        &identity_for(Uuid::new_v4()),
        &repo,
        &credentials(EMAIL, "wrong"),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err,
        PortalError::Auth("Invalid login credentials".to_string())
    );
}

#[tokio::test]
async fn test_sign_in_rejects_blank_credentials_before_provider() {
    // A failing provider proves the call never reaches it.
    let repo = InMemoryRepository::new();
    let err = sign_in(
        &MockIdentityProvider::new_failing(),
        &repo,
        &credentials("", PASSWORD),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PortalError::Validation(_)));
}

#[tokio::test]
async fn test_sign_in_provider_outage_is_backend_error() {
    let repo = InMemoryRepository::new();
    let err = sign_in(
        &MockIdentityProvider::new_failing(),
        &repo,
        &credentials(EMAIL, PASSWORD),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PortalError::Backend(_)));
}

// --- check_auth_status / sign_out ---

#[test]
fn test_status_for_anonymous_caller_points_to_login() {
    let status = check_auth_status(None);
    assert!(!status.authenticated);
    assert_eq!(status.user_id, None);
    assert_eq!(status.redirect_to, "/login");
}

#[test]
fn test_status_for_signed_in_caller() {
    let user = AuthUser {
        id: Uuid::new_v4(),
        role: Some(Role::Radiologist),
        access_token: None,
    };
    let status = check_auth_status(Some(&user));
    assert!(status.authenticated);
    assert_eq!(status.user_id, Some(user.id));
    assert_eq!(status.redirect_to, "/radiology/dashboard");

    let roleless = AuthUser { role: None, ..user };
    assert_eq!(check_auth_status(Some(&roleless)).redirect_to, "/dashboard");
}

#[tokio::test]
async fn test_sign_out_without_token_is_noop() {
    let user = AuthUser {
        id: Uuid::new_v4(),
        role: None,
        access_token: None,
    };
    // Even a failing provider is never contacted.
    assert!(
        sign_out(&MockIdentityProvider::new_failing(), &user)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_sign_out_forwards_provider_errors() {
    let user = AuthUser {
        id: Uuid::new_v4(),
        role: None,
        access_token: Some("token".to_string()),
    };
    assert!(
        sign_out(&MockIdentityProvider::new_failing(), &user)
            .await
            .is_err()
    );
    assert!(sign_out(&MockIdentityProvider::new(), &user).await.is_ok());
}
