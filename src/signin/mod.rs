use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::directory::DirectoryError;
use crate::errors::{ProviderError, ProviderErrorCode};
use crate::primitives::{AuthUser, Company, CompanyUser, Role, Session};
use crate::session::monitor::AuthStateHandler;

pub mod company;
pub mod default;
pub mod producer;

/// Declared login intent, taken from the request's optional `role` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginIntent {
    Producer,
    Company,
    /// Role unspecified or student: collaborator probing happens here.
    Default,
}

impl LoginIntent {
    pub fn from_role(role: Option<Role>) -> Self {
        match role {
            Some(Role::Producer) => LoginIntent::Producer,
            Some(Role::Company) => LoginIntent::Company,
            Some(Role::Collaborator) | Some(Role::Student) | None => LoginIntent::Default,
        }
    }
}

/// Email/password pair from the login form.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Successful sign-in: the live session plus the reconciled role picture.
#[derive(Debug, Clone, Serialize)]
pub struct SignInOutcome {
    pub session: Session,
    pub user: AuthUser,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Company>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborator: Option<CompanyUser>,
    pub needs_password_change: bool,
}

/// Sign-in failure taxonomy. None of these are retryable by the service;
/// the human behind the UI may retry manually.
#[derive(Debug, Error)]
pub enum SignInError {
    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("email not confirmed")]
    EmailNotConfirmed,

    #[error("company not found")]
    CompanyNotFound,

    #[error("provisioning function failed: {0}")]
    ProvisioningFailed(String),

    #[error("sign-in failed after provisioning: {0}")]
    RetryFailed(String),

    #[error("no user data returned by the identity provider")]
    MissingUserData,

    #[error(transparent)]
    Provider(ProviderError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl SignInError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            SignInError::InvalidCredentials => "invalid_credentials",
            SignInError::EmailNotConfirmed => "email_not_confirmed",
            SignInError::CompanyNotFound => "company_not_found",
            SignInError::ProvisioningFailed(_) => "provisioning_failed",
            SignInError::RetryFailed(_) => "retry_failed",
            SignInError::MissingUserData => "missing_user_data",
            SignInError::Provider(_) => "provider_error",
            SignInError::Directory(_) => "directory_error",
        }
    }

    /// User-facing copy for the UI toast layer.
    pub fn user_message(&self) -> &'static str {
        match self {
            SignInError::InvalidCredentials => "E-mail ou senha incorretos.",
            SignInError::EmailNotConfirmed => "Confirme seu e-mail antes de entrar.",
            SignInError::CompanyNotFound => {
                "Empresa não encontrada. Verifique o e-mail informado."
            }
            SignInError::ProvisioningFailed(_) => {
                "Não foi possível preparar o acesso da empresa. Tente novamente mais tarde."
            }
            SignInError::RetryFailed(_) => {
                "Falha ao entrar após a preparação da conta. Tente novamente."
            }
            SignInError::MissingUserData => "Não foi possível carregar os dados do usuário.",
            SignInError::Provider(_) => "Não foi possível entrar no momento. Tente novamente.",
            SignInError::Directory(_) => "Erro ao consultar os dados da empresa.",
        }
    }
}

impl From<ProviderError> for SignInError {
    fn from(err: ProviderError) -> Self {
        match err.code {
            ProviderErrorCode::InvalidCredentials => SignInError::InvalidCredentials,
            ProviderErrorCode::EmailNotConfirmed => SignInError::EmailNotConfirmed,
            _ => SignInError::Provider(err),
        }
    }
}

/// One sign-in strategy per login intent.
#[async_trait]
pub trait SignInFlow: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<SignInOutcome, SignInError>;
}

/// Routes a login to the flow matching its declared intent and records the
/// resulting session with the state handler.
pub struct SignInService {
    producer: Box<dyn SignInFlow>,
    company: Box<dyn SignInFlow>,
    default: Box<dyn SignInFlow>,
    handler: AuthStateHandler,
}

impl SignInService {
    pub fn new(
        producer: Box<dyn SignInFlow>,
        company: Box<dyn SignInFlow>,
        default: Box<dyn SignInFlow>,
        handler: AuthStateHandler,
    ) -> Self {
        Self {
            producer,
            company,
            default,
            handler,
        }
    }

    pub async fn sign_in(
        &self,
        intent: LoginIntent,
        credentials: &Credentials,
    ) -> Result<SignInOutcome, SignInError> {
        let flow = match intent {
            LoginIntent::Producer => &self.producer,
            LoginIntent::Company => &self.company,
            LoginIntent::Default => &self.default,
        };

        let outcome = flow.sign_in(credentials).await?;
        info!(
            user_id = %outcome.user.id,
            role = %outcome.role,
            needs_password_change = outcome.needs_password_change,
            "Sign-in complete"
        );
        self.handler.on_signed_in(&outcome.session).await;
        Ok(outcome)
    }
}

/// Defensive check: a session whose embedded user has no id is unusable.
pub(crate) fn require_user(session: &Session) -> Result<AuthUser, SignInError> {
    if session.user.id.is_empty() {
        return Err(SignInError::MissingUserData);
    }
    Ok(session.user.clone())
}
