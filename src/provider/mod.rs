use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::primitives::{AuthUser, MetadataPatch, Session};

pub mod http;

/// Scope of a sign-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// Invalidate only the session the access token belongs to.
    Local,
    /// Invalidate every session for the user.
    Global,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
        }
    }
}

/// The hosted identity provider.
///
/// Sessions are issued, refreshed and revoked exclusively by the provider;
/// the gateway holds transient, non-authoritative copies. Every method is a
/// single network round trip with no retry; retry policy lives in the
/// session recovery service.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Password sign-in; returns a fresh session on success.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    /// Register a new account with initial metadata.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &MetadataPatch,
    ) -> Result<Session, ProviderError>;

    /// Revoke the session(s) behind an access token.
    async fn sign_out(&self, access_token: &str, scope: SignOutScope)
        -> Result<(), ProviderError>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError>;

    /// Fetch the user behind an access token.
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError>;

    /// Apply a partial metadata update; returns the updated user.
    async fn update_user_metadata(
        &self,
        access_token: &str,
        patch: &MetadataPatch,
    ) -> Result<AuthUser, ProviderError>;

    /// Change the account password.
    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), ProviderError>;

    /// Send a password-recovery email.
    async fn reset_password_for_email(&self, email: &str) -> Result<(), ProviderError>;

    /// Adopt an externally delivered token pair (invitation / recovery
    /// links). The tokens are consumed once and must never be logged.
    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, ProviderError>;
}
