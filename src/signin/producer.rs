use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::primitives::{MetadataPatch, Role};
use crate::provider::IdentityProvider;
use crate::signin::{require_user, Credentials, SignInError, SignInFlow, SignInOutcome};

/// Producer login: authenticate, then make sure the account metadata claims
/// the producer role so later sessions resolve it without guessing.
pub struct ProducerSignIn {
    provider: Arc<dyn IdentityProvider>,
}

impl ProducerSignIn {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl SignInFlow for ProducerSignIn {
    async fn sign_in(&self, credentials: &Credentials) -> Result<SignInOutcome, SignInError> {
        let session = self
            .provider
            .sign_in_with_password(&credentials.email, &credentials.password)
            .await?;
        let user = require_user(&session)?;

        let user = if user.metadata.role == Some(Role::Producer) {
            user
        } else {
            info!(user_id = %user.id, "Stamping producer role on account metadata");
            self.provider
                .update_user_metadata(&session.access_token, &MetadataPatch::role(Role::Producer))
                .await?
        };

        Ok(SignInOutcome {
            session,
            user,
            role: Role::Producer,
            company: None,
            collaborator: None,
            needs_password_change: false,
        })
    }
}
