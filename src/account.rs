use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::directory::{DirectoryError, DirectoryStore};
use crate::errors::ProviderError;
use crate::primitives::{AuthUser, Role};
use crate::provider::IdentityProvider;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Password management for signed-in users.
///
/// Auto-provisioned accounts (companies, invited collaborators) start on a
/// generated password with a `needs_password_change` flag in the directory;
/// changing the password also clears that flag.
pub struct AccountService {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryStore>,
}

impl AccountService {
    pub fn new(provider: Arc<dyn IdentityProvider>, directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            provider,
            directory,
        }
    }

    /// Change the password on the provider, then clear the matching
    /// directory flag for company owners and collaborators.
    ///
    /// The password change itself is the operation the user asked for; a
    /// failed flag update afterwards is logged but not surfaced, since the
    /// new password is already live.
    pub async fn change_password(
        &self,
        access_token: &str,
        user: &AuthUser,
        new_password: &str,
    ) -> Result<(), AccountError> {
        self.provider
            .update_password(access_token, new_password)
            .await?;
        info!(user_id = %user.id, "Password changed");

        match user.metadata.role {
            Some(Role::Company) => {
                match self
                    .directory
                    .find_company_by_auth_user(&user.id)
                    .await
                {
                    Ok(Some(company)) => {
                        if let Err(err) =
                            self.directory.clear_company_password_flag(&company.id).await
                        {
                            warn!(company_id = %company.id, %err, "Failed to clear company password flag");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(user_id = %user.id, %err, "Company lookup failed after password change");
                    }
                }
            }
            Some(Role::Collaborator) => {
                match self.directory.find_collaborator(&user.id).await {
                    Ok(Some((collaborator, _))) => {
                        if let Err(err) = self
                            .directory
                            .clear_collaborator_password_flag(&collaborator.id)
                            .await
                        {
                            warn!(collaborator_id = %collaborator.id, %err, "Failed to clear collaborator password flag");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(user_id = %user.id, %err, "Collaborator lookup failed after password change");
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Send a password-recovery email. The provider answers uniformly
    /// whether or not the address exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        self.provider.reset_password_for_email(email).await?;
        Ok(())
    }
}
