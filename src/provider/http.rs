use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::errors::ProviderError;
use crate::primitives::{AuthUser, MetadataPatch, Session, UserMetadata};
use crate::provider::{IdentityProvider, SignOutScope};

/// User object as the provider's REST API returns it.
#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    email: String,
    #[serde(default)]
    user_metadata: Value,
}

impl From<UserPayload> for AuthUser {
    fn from(payload: UserPayload) -> Self {
        AuthUser {
            id: payload.id,
            email: payload.email,
            metadata: UserMetadata::from_value(&payload.user_metadata),
        }
    }
}

/// Session object as the provider's REST API returns it. Some deployments
/// send `expires_at` directly, others only `expires_in`.
#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserPayload,
}

impl From<SessionPayload> for Session {
    fn from(payload: SessionPayload) -> Self {
        let expires_at = payload
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + payload.expires_in.unwrap_or(0));
        Session {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at,
            user: payload.user.into(),
        }
    }
}

/// Shape of the provider's error bodies; the message field name varies
/// between endpoints.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorPayload {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// HTTP client for the hosted identity provider's GoTrue-style REST API.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: Url,
    anon_key: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::transport(format!("invalid provider URL: {e}")))
    }

    fn apply_headers(&self, builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        let builder = builder.header("apikey", &self.anon_key);
        match bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn a non-success response into a classified provider error.
    async fn error_from_response(response: Response) -> ProviderError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorPayload>().await {
            Ok(payload) => payload
                .into_message()
                .unwrap_or_else(|| format!("provider returned status {status}")),
            Err(_) => format!("provider returned status {status}"),
        };
        ProviderError::from_message(message, Some(status))
    }

    async fn expect_session(response: Response) -> Result<Session, ProviderError> {
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let payload: SessionPayload = response.json().await?;
        Ok(payload.into())
    }

    async fn expect_user(response: Response) -> Result<AuthUser, ProviderError> {
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let payload: UserPayload = response.json().await?;
        Ok(payload.into())
    }

    async fn expect_ok(response: Response) -> Result<(), ProviderError> {
        if response.status().is_success() || response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        Err(Self::error_from_response(response).await)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        debug!(email, "Password sign-in against identity provider");
        let mut url = self.endpoint("token")?;
        url.set_query(Some("grant_type=password"));

        let response = self
            .apply_headers(self.client.post(url), None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::expect_session(response).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &MetadataPatch,
    ) -> Result<Session, ProviderError> {
        let response = self
            .apply_headers(self.client.post(self.endpoint("signup")?), None)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;
        Self::expect_session(response).await
    }

    async fn sign_out(
        &self,
        access_token: &str,
        scope: SignOutScope,
    ) -> Result<(), ProviderError> {
        let mut url = self.endpoint("logout")?;
        url.set_query(Some(&format!("scope={}", scope.as_str())));

        let response = self
            .apply_headers(self.client.post(url), Some(access_token))
            .send()
            .await?;
        Self::expect_ok(response).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let mut url = self.endpoint("token")?;
        url.set_query(Some("grant_type=refresh_token"));

        let response = self
            .apply_headers(self.client.post(url), None)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        Self::expect_session(response).await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, ProviderError> {
        let response = self
            .apply_headers(self.client.get(self.endpoint("user")?), Some(access_token))
            .send()
            .await?;
        Self::expect_user(response).await
    }

    async fn update_user_metadata(
        &self,
        access_token: &str,
        patch: &MetadataPatch,
    ) -> Result<AuthUser, ProviderError> {
        let response = self
            .apply_headers(self.client.put(self.endpoint("user")?), Some(access_token))
            .json(&json!({ "data": patch }))
            .send()
            .await?;
        Self::expect_user(response).await
    }

    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .apply_headers(self.client.put(self.endpoint("user")?), Some(access_token))
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        // The user endpoint echoes the updated user; only status matters here.
        Self::expect_ok(response).await
    }

    async fn reset_password_for_email(&self, email: &str) -> Result<(), ProviderError> {
        let response = self
            .apply_headers(self.client.post(self.endpoint("recover")?), None)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::expect_ok(response).await
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, ProviderError> {
        // The provider has no read-session endpoint; adopting a delivered
        // token pair means proving the access token still maps to a user and
        // then rotating the pair so the one-time link tokens die here.
        let _ = self.get_user(access_token).await?;
        self.refresh_session(refresh_token).await
    }
}
