//! Refresh-token exchange against the platform's OAuth token endpoint.

use super::Credential;
use crate::error::AppError;
use crate::types::AccessToken;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;

/// The ability to trade a refresh token for a new credential.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AppError>;
}

/// Refreshes through `POST /open-apis/authen/v2/oauth/token`.
pub struct HttpTokenRefresher {
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl HttpTokenRefresher {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }
}

#[async_trait::async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AppError> {
        let url = format!("{}/open-apis/authen/v2/oauth/token", self.base_url);
        log::debug!("POST {}", url);

        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.app_id,
            "client_secret": self.app_secret,
            "refresh_token": refresh_token,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Auth {
                reason: format!("token endpoint unreachable: {}", e),
            })?;
        let status = response.status();
        let text = response.text().await?;

        let parsed: TokenResponse = serde_json::from_str(&text).map_err(|e| AppError::Auth {
            reason: format!("unreadable token response (HTTP {}): {}", status, e),
        })?;

        credential_from_response(parsed, refresh_token)
    }
}

fn credential_from_response(
    response: TokenResponse,
    previous_refresh_token: &str,
) -> Result<Credential, AppError> {
    let access_token = match (response.code, response.access_token) {
        (0, Some(token)) => token,
        (code, _) => {
            return Err(AppError::Auth {
                reason: format!(
                    "refresh rejected (code {}): {}",
                    code,
                    response
                        .error_description
                        .or(response.error)
                        .unwrap_or_else(|| "no access token returned".to_string())
                ),
            })
        }
    };

    let lifetime = Duration::seconds(
        response
            .expires_in
            .unwrap_or(crate::constants::DEFAULT_TOKEN_LIFETIME_SECS),
    );

    Ok(Credential::issued_now(
        AccessToken::new(access_token)?,
        // Refresh tokens rotate; keep the old one if none came back.
        Some(
            response
                .refresh_token
                .unwrap_or_else(|| previous_refresh_token.to_string()),
        ),
        lifetime,
    ))
}
