use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::PortalError;

/// AuthSession
///
/// What the identity provider hands back after a successful credential check.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

// 1. IdentityProvider Contract
/// IdentityProvider
///
/// The external auth boundary. Credentials are verified and sessions revoked by the provider;
/// this service never stores passwords. The real Supabase client and the in-process mock are
/// interchangeable behind `Arc<dyn IdentityProvider>`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Password grant. Bad credentials are `PortalError::Auth`; transport or provider faults
    /// are `PortalError::Backend`.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, PortalError>;

    /// Revokes the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), PortalError>;
}

// 2. The Real Implementation (Supabase Auth / GoTrue)
/// SupabaseIdentityClient
///
/// Talks to `{SUPABASE_URL}/auth/v1` with the project's anon key.
#[derive(Clone)]
pub struct SupabaseIdentityClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

// GoTrue has used both shapes over time.
#[derive(Deserialize, Default)]
struct ProviderErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl ProviderErrorBody {
    fn message(self) -> Option<String> {
        self.error_description.or(self.msg)
    }
}

impl SupabaseIdentityClient {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, PortalError> {
        let response = self
            .http
            .post(self.auth_url("token?grant_type=password"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response
                .json::<ProviderErrorBody>()
                .await
                .unwrap_or_default();
            return Err(PortalError::Auth(
                body.message()
                    .unwrap_or_else(|| "Invalid login credentials".to_string()),
            ));
        }
        if !status.is_success() {
            return Err(PortalError::Backend(format!(
                "identity provider answered {}",
                status
            )));
        }

        let token = response.json::<TokenResponse>().await?;
        Ok(AuthSession {
            user_id: token.user.id,
            email: token.user.email,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), PortalError> {
        let response = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        // An already-expired token has nothing left to revoke.
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(PortalError::Backend(format!(
                "identity provider answered {} on logout",
                response.status()
            )))
        }
    }
}

// 3. The Mock Implementation (For Tests)
/// MockIdentityProvider
///
/// Verifies credentials against a fixed account table. Access tokens are `mock-token-<uuid>`.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    accounts: HashMap<String, (String, Uuid)>,
    /// When true, every call fails as if the provider were unreachable.
    pub should_fail: bool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_account(mut self, email: &str, password: &str, user_id: Uuid) -> Self {
        self.accounts
            .insert(email.to_string(), (password.to_string(), user_id));
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, PortalError> {
        if self.should_fail {
            return Err(PortalError::Backend(
                "Mock identity provider unavailable".to_string(),
            ));
        }
        match self.accounts.get(email) {
            Some((expected, user_id)) if expected == password => Ok(AuthSession {
                user_id: *user_id,
                email: Some(email.to_string()),
                access_token: format!("mock-token-{}", user_id),
                refresh_token: None,
            }),
            _ => Err(PortalError::Auth("Invalid login credentials".to_string())),
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), PortalError> {
        if self.should_fail {
            return Err(PortalError::Backend(
                "Mock identity provider unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// IdentityState
///
/// The concrete type used to share the identity provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;
