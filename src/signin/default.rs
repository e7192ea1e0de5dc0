use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::directory::DirectoryStore;
use crate::primitives::{MetadataPatch, Role};
use crate::provider::IdentityProvider;
use crate::signin::{require_user, Credentials, SignInError, SignInFlow, SignInOutcome};

/// Login without a declared role. The directory decides who the user is:
/// a collaborator row wins over whatever the metadata claims, a stale
/// company claim is downgraded, and a blank slate becomes a student.
pub struct DefaultSignIn {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryStore>,
}

impl DefaultSignIn {
    pub fn new(provider: Arc<dyn IdentityProvider>, directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            provider,
            directory,
        }
    }
}

#[async_trait]
impl SignInFlow for DefaultSignIn {
    async fn sign_in(&self, credentials: &Credentials) -> Result<SignInOutcome, SignInError> {
        let session = self
            .provider
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await?;
        let user = require_user(&session)?;

        if let Some((collaborator, company)) = self.directory.find_collaborator(&user.id).await? {
            let consistent = user.metadata.role == Some(Role::Collaborator)
                && user.metadata.company_id.as_deref() == Some(company.id.as_str());

            let user = if consistent {
                user
            } else {
                info!(user_id = %user.id, company_id = %company.id, "Linking collaborator metadata");
                self.provider
                    .update_user_metadata(
                        &session.access_token,
                        &MetadataPatch::company_link(Role::Collaborator, &company.id, &company.name),
                    )
                    .await?
            };

            let needs_password_change = collaborator.needs_password_change;
            return Ok(SignInOutcome {
                session,
                user,
                role: Role::Collaborator,
                company: Some(company),
                collaborator: Some(collaborator),
                needs_password_change,
            });
        }

        match user.metadata.role {
            Some(Role::Company) => {
                match self.directory.find_company_by_auth_user(&user.id).await? {
                    Some(company) => {
                        let needs_password_change = company.needs_password_change;
                        Ok(SignInOutcome {
                            session,
                            user,
                            role: Role::Company,
                            company: Some(company),
                            collaborator: None,
                            needs_password_change,
                        })
                    }
                    None => {
                        // Metadata claims a company that no longer exists in
                        // the directory. Strip the claim rather than trust it.
                        warn!(user_id = %user.id, "Company claim without directory row, downgrading to student");
                        let patch = MetadataPatch {
                            role: Some(Role::Student),
                            company_id: Some(None),
                            company_name: Some(None),
                            name: None,
                        };
                        let user = self
                            .provider
                            .update_user_metadata(&session.access_token, &patch)
                            .await?;
                        Ok(SignInOutcome {
                            session,
                            user,
                            role: Role::Student,
                            company: None,
                            collaborator: None,
                            needs_password_change: false,
                        })
                    }
                }
            }
            Some(role) => Ok(SignInOutcome {
                session,
                user,
                role,
                company: None,
                collaborator: None,
                needs_password_change: false,
            }),
            None => {
                let user = self
                    .provider
                    .update_user_metadata(
                        &session.access_token,
                        &MetadataPatch::role(Role::Student),
                    )
                    .await?;
                Ok(SignInOutcome {
                    session,
                    user,
                    role: Role::Student,
                    company: None,
                    collaborator: None,
                    needs_password_change: false,
                })
            }
        }
    }
}
