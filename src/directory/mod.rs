use async_trait::async_trait;
use thiserror::Error;

use crate::primitives::{Company, CompanyUser, Profile};
use crate::utils::TimeoutError;

pub mod memory;
pub mod resolver;
pub mod rest;

/// Relational-store error
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("store error: {0}")]
    Store(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{0}")]
    Timeout(TimeoutError),
}

impl From<TimeoutError> for DirectoryError {
    fn from(err: TimeoutError) -> Self {
        DirectoryError::Timeout(err)
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        DirectoryError::Store(err.to_string())
    }
}

/// The relational store's tenant directory: `companies`, `company_users`
/// and `profiles`.
///
/// All reads return `Ok(None)` for absence; only transport or decode
/// problems surface as errors. Flag updates run under the store timeout
/// configured for write calls.
#[async_trait]
pub trait DirectoryStore: Send + Sync + 'static {
    /// Company owned by the given auth user, if any.
    async fn find_company_by_auth_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Company>, DirectoryError>;

    /// Company whose contact email matches, used by the provisioning
    /// fallback during company sign-in.
    async fn find_company_by_contact_email(
        &self,
        email: &str,
    ) -> Result<Option<Company>, DirectoryError>;

    /// Collaborator membership for the given auth user, joined with its
    /// company.
    async fn find_collaborator(
        &self,
        user_id: &str,
    ) -> Result<Option<(CompanyUser, Company)>, DirectoryError>;

    /// Profile mirror row for the given auth user.
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError>;

    /// Clear the needs-password-change flag on a company row.
    async fn clear_company_password_flag(&self, company_id: &str) -> Result<(), DirectoryError>;

    /// Clear the needs-password-change flag on a collaborator row.
    async fn clear_collaborator_password_flag(
        &self,
        collaborator_id: &str,
    ) -> Result<(), DirectoryError>;
}
