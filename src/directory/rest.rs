use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::DirectoryConfig;
use crate::directory::{DirectoryError, DirectoryStore};
use crate::primitives::{Company, CompanyUser, Profile};
use crate::utils::with_timeout;

/// Collaborator row with its company embedded, as the store's REST layer
/// returns a joined select.
#[derive(Debug, Deserialize)]
struct CollaboratorRow {
    #[serde(flatten)]
    company_user: CompanyUser,
    companies: Option<Company>,
}

/// HTTP client for the relational store's PostgREST-style surface.
pub struct RestDirectoryStore {
    client: Client,
    base_url: Url,
    service_key: String,
    write_timeout: Duration,
}

impl RestDirectoryStore {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            service_key: config.service_key.clone(),
            write_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn table(&self, name: &str, query: &str) -> Result<Url, DirectoryError> {
        let mut url = self
            .base_url
            .join(name)
            .map_err(|e| DirectoryError::Store(format!("invalid store URL: {e}")))?;
        url.set_query(Some(query));
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Fetch at most one row from a filtered select.
    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Option<T>, DirectoryError> {
        let url = self.table(table, query)?;
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = Self::check_status(response).await?;

        let mut rows: Vec<T> = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn check_status(response: Response) -> Result<Response, DirectoryError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(DirectoryError::Store(format!(
            "store returned status {status}: {body}"
        )))
    }

    async fn clear_password_flag(&self, table: &str, row_id: &str) -> Result<(), DirectoryError> {
        let url = self.table(table, &format!("id=eq.{row_id}"))?;
        let request = self
            .authorized(self.client.patch(url))
            .json(&json!({ "needs_password_change": false }));

        with_timeout(self.write_timeout, async move {
            let response = request.send().await?;
            let _ = Self::check_status(response).await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DirectoryStore for RestDirectoryStore {
    async fn find_company_by_auth_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Company>, DirectoryError> {
        self.select_one("companies", &format!("auth_user_id=eq.{user_id}&limit=1"))
            .await
    }

    async fn find_company_by_contact_email(
        &self,
        email: &str,
    ) -> Result<Option<Company>, DirectoryError> {
        self.select_one("companies", &format!("contact_email=eq.{email}&limit=1"))
            .await
    }

    async fn find_collaborator(
        &self,
        user_id: &str,
    ) -> Result<Option<(CompanyUser, Company)>, DirectoryError> {
        let row: Option<CollaboratorRow> = self
            .select_one(
                "company_users",
                &format!("auth_user_id=eq.{user_id}&select=*,companies(*)&limit=1"),
            )
            .await?;

        match row {
            Some(row) => {
                let company = row.companies.ok_or_else(|| {
                    DirectoryError::Decode(format!(
                        "collaborator {} has no joined company row",
                        row.company_user.id
                    ))
                })?;
                Ok(Some((row.company_user, company)))
            }
            None => Ok(None),
        }
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, DirectoryError> {
        self.select_one("profiles", &format!("id=eq.{user_id}&limit=1"))
            .await
    }

    async fn clear_company_password_flag(&self, company_id: &str) -> Result<(), DirectoryError> {
        self.clear_password_flag("companies", company_id).await
    }

    async fn clear_collaborator_password_flag(
        &self,
        collaborator_id: &str,
    ) -> Result<(), DirectoryError> {
        self.clear_password_flag("company_users", collaborator_id)
            .await
    }
}
