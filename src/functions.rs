use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::FunctionsConfig;

/// Serverless function error
#[derive(Debug, Error)]
pub enum FunctionsError {
    #[error("function call failed: {0}")]
    Call(String),
}

impl From<reqwest::Error> for FunctionsError {
    fn from(err: reqwest::Error) -> Self {
        FunctionsError::Call(err.to_string())
    }
}

/// Result reported by the provisioning function. `success=false` is a
/// domain outcome, not a transport failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionOutcome {
    pub success: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
    email: &'a str,
    company_id: &'a str,
}

/// Client for the platform's serverless functions.
#[async_trait]
pub trait ProvisioningClient: Send + Sync + 'static {
    /// Provision (or link) an auth identity for an existing company record.
    async fn create_company_auth_user(
        &self,
        email: &str,
        company_id: &str,
    ) -> Result<ProvisionOutcome, FunctionsError>;
}

/// HTTP client for the hosted functions endpoint.
pub struct HttpFunctionsClient {
    client: Client,
    base_url: Url,
    service_key: String,
}

impl HttpFunctionsClient {
    pub fn new(config: &FunctionsConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            service_key: config.service_key.clone(),
        }
    }
}

#[async_trait]
impl ProvisioningClient for HttpFunctionsClient {
    async fn create_company_auth_user(
        &self,
        email: &str,
        company_id: &str,
    ) -> Result<ProvisionOutcome, FunctionsError> {
        let url = self
            .base_url
            .join("create-company-auth-user")
            .map_err(|e| FunctionsError::Call(format!("invalid functions URL: {e}")))?;

        info!(company_id, "Invoking company auth-user provisioning function");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .json(&ProvisionRequest { email, company_id })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FunctionsError::Call(format!(
                "function returned status {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }
}
