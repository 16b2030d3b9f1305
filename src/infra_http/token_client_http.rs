use crate::domain_port::*;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTokenClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    expires_access: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    refresh_token: String,
}

/// Talks to the auth backend over HTTPS.
pub struct HttpTokenRefreshClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTokenRefreshClient {
    pub fn new(config: HttpTokenClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/{}", self.base_url, path)
    }
}

/// 401 and 403 are definitive; anything else may succeed on a later tick.
fn classify_status(status: StatusCode) -> Option<TokenClientError> {
    if status.is_success() {
        None
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(TokenClientError::Unauthorized)
    } else {
        Some(TokenClientError::NetworkTransient(format!(
            "unexpected status {status}"
        )))
    }
}

fn transient(e: reqwest::Error) -> TokenClientError {
    TokenClientError::NetworkTransient(e.to_string())
}

#[async_trait::async_trait]
impl TokenRefreshClient for HttpTokenRefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedAccess, TokenClientError> {
        let resp = self
            .http
            .post(self.url("refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(transient)?;

        if let Some(err) = classify_status(resp.status()) {
            return Err(err);
        }
        let body: RefreshResponse = resp.json().await.map_err(transient)?;
        Ok(IssuedAccess {
            access_token: body.access_token,
            expires_at: body.expires_access,
        })
    }

    async fn validate(&self, access_token: &str) -> Result<String, TokenClientError> {
        let resp = self
            .http
            .get(self.url("validate"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transient)?;

        // Only refresh rejections end a session; a failed validation is retried.
        if let Some(err) = classify_status(resp.status()) {
            return Err(match err {
                TokenClientError::Unauthorized => TokenClientError::NetworkTransient(format!(
                    "validation rejected with status {}",
                    resp.status()
                )),
                other => other,
            });
        }
        let body: ValidateResponse = resp.json().await.map_err(transient)?;
        Ok(body.refresh_token)
    }
}
