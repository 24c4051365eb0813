//! HTTP client for the management platform
//!
//! [`PlatformAuthenticator`] issues tokens; [`NavigatorClient`] makes the
//! authenticated calls (execute, upload) with tokens taken from a shared
//! [`TokenCache`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::inventory::ScriptUpload;
use super::types::{ExecuteRequest, TokenResponse};
use crate::auth::{Authenticator, IssuedToken, TokenCache};
use crate::common::config::{NavigatorConfig, Timeouts};
use crate::common::{Error, Result};

const TOKENS_PATH: &str = "/tron/api/v2/tokens";
const CUSTOM_SCRIPTS_PATH: &str = "/configmgmt/api/v1/customScripts";
const EXECUTE_PATH: &str = "/configmgmt/api/v1/customScripts/execute";

/// Turn a configured host into a base URL; bare hosts get `https://`
pub fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Build the shared HTTP client
pub fn http_client(accept_invalid_certs: bool, timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("navtest/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(accept_invalid_certs);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))
}

fn request_error(url: &str, e: reqwest::Error) -> Error {
    Error::ApiRequest {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

async fn status_error(url: &str, response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::ApiStatus {
        url: url.to_string(),
        status,
        body,
    }
}

/// Issues tokens with username/password credentials
pub struct PlatformAuthenticator {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl PlatformAuthenticator {
    pub fn new(http: reqwest::Client, base_url: String, username: String, password: String) -> Self {
        Self {
            http,
            base_url,
            username,
            password,
        }
    }
}

#[async_trait]
impl Authenticator for PlatformAuthenticator {
    async fn issue_token(&self, ttl: Duration) -> Result<IssuedToken> {
        let url = format!("{}{}", self.base_url, TOKENS_PATH);
        let timeout = ttl.as_secs().to_string();
        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("timeout", timeout.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::AuthenticationFailed(request_error(&url, e).to_string()))?;

        if !response.status().is_success() {
            return Err(Error::AuthenticationFailed(
                status_error(&url, response).await.to_string(),
            ));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            Error::AuthenticationFailed(format!("Malformed token response from {}: {}", url, e))
        })?;

        Ok(IssuedToken {
            expires_at: body.expiry(),
            token: body.token,
        })
    }
}

/// Authenticated platform API calls
#[derive(Clone)]
pub struct NavigatorClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
}

impl NavigatorClient {
    pub fn new(http: reqwest::Client, base_url: String, tokens: Arc<TokenCache>) -> Self {
        Self {
            http,
            base_url,
            tokens,
        }
    }

    /// Build the client, its authenticator and the endpoint's token cache from config
    pub fn from_config(navigator: &NavigatorConfig, timeouts: &Timeouts) -> Result<Self> {
        let base_url = base_url(navigator.require_host()?);
        let http = http_client(navigator.accept_invalid_certs, timeouts.http())?;
        let authenticator = PlatformAuthenticator::new(
            http.clone(),
            base_url.clone(),
            navigator.username.clone(),
            navigator.password.clone(),
        );
        let tokens = Arc::new(TokenCache::new(Arc::new(authenticator), navigator.token_ttl()));
        Ok(Self::new(http, base_url, tokens))
    }

    /// The token cache shared by every consumer of this endpoint
    pub fn tokens(&self) -> Arc<TokenCache> {
        self.tokens.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a custom script and return the raw response body
    ///
    /// A 401 answer drops the rejected token, unless another caller has
    /// already replaced it, and the request is retried once.
    pub async fn execute_script(&self, request: &ExecuteRequest) -> Result<String> {
        let url = format!("{}{}", self.base_url, EXECUTE_PATH);

        for attempt in 0..2 {
            let token = self.tokens.get_valid_credential().await?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header("Accept", "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| request_error(&url, e))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                tracing::warn!("Platform rejected token, refreshing");
                self.tokens.invalidate_if(&token).await;
                continue;
            }

            if !response.status().is_success() {
                return Err(status_error(&url, response).await);
            }

            return response.text().await.map_err(|e| request_error(&url, e));
        }

        Err(Error::AuthenticationFailed(format!(
            "{} rejected a freshly issued token",
            url
        )))
    }

    /// Upload one custom script file
    pub async fn upload_script(&self, upload: &ScriptUpload) -> Result<()> {
        let url = format!("{}{}", self.base_url, CUSTOM_SCRIPTS_PATH);
        let contents = tokio::fs::read(&upload.file)
            .await
            .map_err(|e| Error::file_read(&upload.file, e))?;
        let file_name = upload
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| upload.script_name.clone());

        let part = reqwest::multipart::Part::bytes(contents)
            .file_name(file_name)
            .mime_str("text/plain")
            .map_err(|e| request_error(&url, e))?;
        let form = reqwest::multipart::Form::new()
            .text("typeGroup", upload.type_group.clone())
            .text("protocolType", upload.protocol_type.clone())
            .text("scriptName", upload.script_name.clone())
            .text("description", upload.description.clone())
            .part("file", part);

        let token = self.tokens.get_valid_credential().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        if !response.status().is_success() {
            return Err(status_error(&url, response).await);
        }

        tracing::info!(script = %upload.script_name, "Custom script uploaded");
        Ok(())
    }
}

/// Check that an upload's file exists before talking to the platform
pub fn check_upload_file(upload: &ScriptUpload) -> Result<()> {
    if upload.file.is_file() {
        Ok(())
    } else {
        Err(Error::file_read(&upload.file, "file not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::stub::serve;

    fn authenticator(base: &str) -> PlatformAuthenticator {
        PlatformAuthenticator::new(
            http_client(false, Some(Duration::from_secs(5))).unwrap(),
            base.to_string(),
            "admin".to_string(),
            "adminpw".to_string(),
        )
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("10.92.44.121"), "https://10.92.44.121");
        assert_eq!(base_url("http://localhost:8080/"), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_issue_token_posts_form() {
        let (base, server) = serve(vec![(201, r#"{"token":"abc123"}"#)]).await;

        let issued = authenticator(&base)
            .issue_token(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(issued.token, "abc123");
        assert!(issued.expires_at.is_none());

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /tron/api/v2/tokens"));
        assert!(requests[0].contains("username=admin"));
        assert!(requests[0].contains("timeout=3600"));
    }

    #[tokio::test]
    async fn test_issue_token_rejected() {
        let (base, _server) = serve(vec![(401, r#"{"error":"denied"}"#)]).await;

        let err = authenticator(&base)
            .issue_token(Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_execute_retries_once_after_unauthorized() {
        let (base, server) = serve(vec![
            (201, r#"{"token":"first"}"#),
            (401, r#"{}"#),
            (201, r#"{"token":"second"}"#),
            (200, r#"{"status":"ok"}"#),
        ])
        .await;

        let http = http_client(false, Some(Duration::from_secs(5))).unwrap();
        let tokens = Arc::new(TokenCache::new(
            Arc::new(authenticator(&base)),
            Duration::from_secs(3600),
        ));
        let client = NavigatorClient::new(http, base.clone(), tokens);
        let ne = super::super::types::NetworkElement {
            ne_name: "PE-6x".to_string(),
            ne_type: "3928".to_string(),
            type_group: "PN6x".to_string(),
        };

        let body = client
            .execute_script(&ExecuteRequest::cli_cut_through("ShowTimer", &ne))
            .await
            .unwrap();
        assert_eq!(body, r#"{"status":"ok"}"#);

        let requests = server.await.unwrap();
        assert!(requests[1].contains("Bearer first"));
        assert!(requests[3].contains("Bearer second"));
        assert!(requests[3].contains("\"cmdFile\":\"ShowTimer\""));
    }
}
