use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::directory::DirectoryStore;
use crate::errors::ProviderErrorCode;
use crate::functions::ProvisioningClient;
use crate::primitives::{MetadataPatch, Role, Session};
use crate::provider::IdentityProvider;
use crate::signin::{require_user, Credentials, SignInError, SignInFlow, SignInOutcome};

/// Company login. Companies are created in the directory before they ever
/// have an auth account, so an "invalid credentials" answer is not final:
/// if the email belongs to a known company, the flow provisions the account
/// through the serverless function and signs in once more.
pub struct CompanySignIn {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryStore>,
    provisioner: Arc<dyn ProvisioningClient>,
}

impl CompanySignIn {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn DirectoryStore>,
        provisioner: Arc<dyn ProvisioningClient>,
    ) -> Self {
        Self {
            provider,
            directory,
            provisioner,
        }
    }

    /// Straight sign-in succeeded: reconcile metadata with the company row.
    async fn finish_existing(&self, session: Session) -> Result<SignInOutcome, SignInError> {
        let user = require_user(&session)?;

        let company = self.directory.find_company_by_auth_user(&user.id).await?;

        let linked = user.metadata.role == Some(Role::Company)
            && company
                .as_ref()
                .map(|c| user.metadata.company_id.as_deref() == Some(c.id.as_str()))
                .unwrap_or(true);

        let user = if linked {
            user
        } else {
            let patch = match &company {
                Some(company) => {
                    MetadataPatch::company_link(Role::Company, &company.id, &company.name)
                }
                None => MetadataPatch::role(Role::Company),
            };
            info!(user_id = %user.id, "Reconciling company metadata on sign-in");
            self.provider
                .update_user_metadata(&session.access_token, &patch)
                .await?
        };

        let needs_password_change = company
            .as_ref()
            .map(|c| c.needs_password_change)
            .unwrap_or(false);

        Ok(SignInOutcome {
            session,
            user,
            role: Role::Company,
            company,
            collaborator: None,
            needs_password_change,
        })
    }

    /// Credentials were rejected: provision the auth account for a known
    /// company and retry the sign-in exactly once.
    async fn provision_and_retry(
        &self,
        credentials: &Credentials,
    ) -> Result<SignInOutcome, SignInError> {
        let company = self
            .directory
            .find_company_by_contact_email(&credentials.email)
            .await?
            .ok_or(SignInError::CompanyNotFound)?;

        info!(company_id = %company.id, "Provisioning auth account for company");
        let outcome = self
            .provisioner
            .create_company_auth_user(&company.contact_email, &company.id)
            .await
            .map_err(|err| SignInError::ProvisioningFailed(err.to_string()))?;

        if !outcome.success {
            let message = outcome.message.unwrap_or_else(|| "unknown error".to_string());
            warn!(company_id = %company.id, %message, "Provisioning function reported failure");
            return Err(SignInError::ProvisioningFailed(message));
        }

        let session = self
            .provider
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await
            .map_err(|err| SignInError::RetryFailed(err.to_string()))?;
        require_user(&session)?;

        let user = self
            .provider
            .update_user_metadata(
                &session.access_token,
                &MetadataPatch::company_link(Role::Company, &company.id, &company.name),
            )
            .await?;

        // Freshly provisioned accounts always start on the function's
        // generated password.
        Ok(SignInOutcome {
            session,
            user,
            role: Role::Company,
            company: Some(company),
            collaborator: None,
            needs_password_change: true,
        })
    }
}

#[async_trait]
impl SignInFlow for CompanySignIn {
    async fn sign_in(&self, credentials: &Credentials) -> Result<SignInOutcome, SignInError> {
        match self
            .provider
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await
        {
            Ok(session) => self.finish_existing(session).await,
            Err(err) if err.code == ProviderErrorCode::InvalidCredentials => {
                self.provision_and_retry(credentials).await
            }
            Err(err) => Err(err.into()),
        }
    }
}
