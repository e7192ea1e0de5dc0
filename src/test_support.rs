//! Hand-rolled fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::errors::ProviderError;
use crate::functions::{FunctionsError, ProvisionOutcome, ProvisioningClient};
use crate::primitives::{AuthUser, MetadataPatch, Session, UserMetadata};
use crate::provider::{IdentityProvider, SignOutScope};

/// A session for the fixed test user, expiring `secs` from now.
pub fn session_expiring_in(secs: i64) -> Session {
    Session {
        access_token: "access-u@example.com".to_string(),
        refresh_token: "refresh-u@example.com".to_string(),
        expires_at: Utc::now().timestamp() + secs,
        user: AuthUser {
            id: "u-1".to_string(),
            email: "u@example.com".to_string(),
            metadata: UserMetadata::default(),
        },
    }
}

struct FakeAccount {
    password: String,
    user: AuthUser,
}

/// Programmable in-memory identity provider.
///
/// Tokens are synthesized as `access-<email>` / `refresh-<email>` so calls
/// can be traced back to accounts without real token state.
pub struct FakeIdentityProvider {
    accounts: Mutex<HashMap<String, FakeAccount>>,
    refresh_failures: Mutex<Vec<String>>,
    sign_in_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    patches: Mutex<Vec<MetadataPatch>>,
    sign_outs: Mutex<Vec<SignOutScope>>,
    password_resets: Mutex<Vec<String>>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            refresh_failures: Mutex::new(Vec::new()),
            sign_in_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            patches: Mutex::new(Vec::new()),
            sign_outs: Mutex::new(Vec::new()),
            password_resets: Mutex::new(Vec::new()),
        }
    }

    pub fn add_account(&self, email: &str, password: &str) {
        self.add_account_with_metadata(email, password, UserMetadata::default());
    }

    pub fn add_account_with_metadata(&self, email: &str, password: &str, metadata: UserMetadata) {
        self.accounts.lock().insert(
            email.to_string(),
            FakeAccount {
                password: password.to_string(),
                user: AuthUser {
                    id: format!("user-{email}"),
                    email: email.to_string(),
                    metadata,
                },
            },
        );
    }

    /// Queue an error message for the next refresh call.
    pub fn fail_next_refresh(&self, message: &str) {
        self.refresh_failures.lock().push(message.to_string());
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_patches(&self) -> Vec<MetadataPatch> {
        self.patches.lock().clone()
    }

    pub fn recorded_sign_outs(&self) -> Vec<SignOutScope> {
        self.sign_outs.lock().clone()
    }

    pub fn recorded_password_resets(&self) -> Vec<String> {
        self.password_resets.lock().clone()
    }

    pub fn metadata_of(&self, email: &str) -> Option<UserMetadata> {
        self.accounts
            .lock()
            .get(email)
            .map(|a| a.user.metadata.clone())
    }

    fn session_for(&self, email: &str) -> Option<Session> {
        self.accounts.lock().get(email).map(|account| Session {
            access_token: format!("access-{email}"),
            refresh_token: format!("refresh-{email}"),
            expires_at: Utc::now().timestamp() + 3600,
            user: account.user.clone(),
        })
    }

    fn email_from_token<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
        token.strip_prefix(prefix)
    }

    fn apply_patch(user: &mut AuthUser, patch: &MetadataPatch) {
        if let Some(role) = patch.role {
            user.metadata.role = Some(role);
        }
        if let Some(company_id) = &patch.company_id {
            user.metadata.company_id = company_id.clone();
        }
        if let Some(company_name) = &patch.company_name {
            user.metadata.company_name = company_name.clone();
        }
        if let Some(name) = &patch.name {
            user.metadata.name = name.clone();
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let _ = self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let matches = self
            .accounts
            .lock()
            .get(email)
            .map(|a| a.password == password)
            .unwrap_or(false);
        if matches {
            Ok(self.session_for(email).expect("account exists"))
        } else {
            Err(ProviderError::from_message(
                "Invalid login credentials",
                Some(400),
            ))
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: &MetadataPatch,
    ) -> Result<Session, ProviderError> {
        self.add_account(email, password);
        Ok(self.session_for(email).expect("account just added"))
    }

    async fn sign_out(
        &self,
        _access_token: &str,
        scope: SignOutScope,
    ) -> Result<(), ProviderError> {
        self.sign_outs.lock().push(scope);
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let _ = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.refresh_failures.lock().pop() {
            return Err(ProviderError::from_message(message, Some(400)));
        }
        Self::email_from_token(refresh_token, "refresh-")
            .and_then(|email| self.session_for(email))
            .ok_or_else(|| ProviderError::from_message("refresh_token_not_found", Some(400)))
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError> {
        Self::email_from_token(access_token, "access-")
            .and_then(|email| self.accounts.lock().get(email).map(|a| a.user.clone()))
            .ok_or_else(|| ProviderError::from_message("JWT expired", Some(401)))
    }

    async fn update_user_metadata(
        &self,
        access_token: &str,
        patch: &MetadataPatch,
    ) -> Result<AuthUser, ProviderError> {
        self.patches.lock().push(patch.clone());
        let email = Self::email_from_token(access_token, "access-")
            .ok_or_else(|| ProviderError::from_message("JWT expired", Some(401)))?;
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| ProviderError::from_message("JWT expired", Some(401)))?;
        Self::apply_patch(&mut account.user, patch);
        Ok(account.user.clone())
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), ProviderError> {
        let email = Self::email_from_token(access_token, "access-")
            .ok_or_else(|| ProviderError::from_message("JWT expired", Some(401)))?;
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| ProviderError::from_message("JWT expired", Some(401)))?;
        account.password = new_password.to_string();
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), ProviderError> {
        self.password_resets.lock().push(email.to_string());
        Ok(())
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, ProviderError> {
        let _ = self.get_user(access_token).await?;
        self.refresh_session(refresh_token).await
    }
}

/// Programmable provisioning function.
///
/// On a successful outcome it can create the account on a linked fake
/// provider, so the retry sign-in after provisioning can succeed the way it
/// does against the real function.
pub struct FakeProvisioner {
    outcome: Mutex<ProvisionOutcome>,
    calls: AtomicUsize,
    grants: Mutex<Option<(Arc<FakeIdentityProvider>, String)>>,
}

impl FakeProvisioner {
    pub fn succeeding() -> Self {
        Self {
            outcome: Mutex::new(ProvisionOutcome {
                success: true,
                user_id: Some("provisioned".to_string()),
                message: None,
            }),
            calls: AtomicUsize::new(0),
            grants: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Mutex::new(ProvisionOutcome {
                success: false,
                user_id: None,
                message: Some(message.to_string()),
            }),
            calls: AtomicUsize::new(0),
            grants: Mutex::new(None),
        }
    }

    /// On success, create the provisioned account on the given provider
    /// with the given password.
    pub fn granting(provider: Arc<FakeIdentityProvider>, password: &str) -> Self {
        let this = Self::succeeding();
        *this.grants.lock() = Some((provider, password.to_string()));
        this
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisioningClient for FakeProvisioner {
    async fn create_company_auth_user(
        &self,
        email: &str,
        _company_id: &str,
    ) -> Result<ProvisionOutcome, FunctionsError> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.lock().clone();
        if outcome.success {
            if let Some((provider, password)) = &*self.grants.lock() {
                provider.add_account(email, password);
            }
        }
        Ok(outcome)
    }
}
