//! Access credentials: the token every request is authorized with.
//!
//! The exporter never stores credentials itself. It receives a
//! [`TokenSource`] and asks it for a valid token before each call, and tells
//! it when the server rejected one.

mod manager;
mod refresher;

pub use manager::{TokenManager, TokenPhase};
pub use refresher::{HttpTokenRefresher, TokenRefresher};

use crate::constants::TOKEN_REFRESH_MARGIN_FRACTION;
use crate::error::AppError;
use crate::types::AccessToken;
use chrono::{DateTime, Duration, Utc};

/// The ability to hand out a usable access token.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Waits until a usable token is available.
    async fn valid_token(&self) -> Result<AccessToken, AppError>;

    /// Reports that the server rejected `token`; returns a replacement.
    async fn reject(&self, token: &AccessToken) -> Result<AccessToken, AppError>;
}

/// An access/refresh token pair with its validity window.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: AccessToken,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
            issued_at,
            expires_at,
        }
    }

    /// A credential issued now that lives for `lifetime`.
    pub fn issued_now(
        access_token: AccessToken,
        refresh_token: Option<String>,
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now();
        Self::new(access_token, refresh_token, now, now + lifetime)
    }

    /// Inside the last tenth of the lifetime (or past expiry).
    pub fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        let lifetime = (self.expires_at - self.issued_at).num_milliseconds().max(0);
        let margin = Duration::milliseconds((lifetime as f64 * TOKEN_REFRESH_MARGIN_FRACTION) as i64);
        now >= self.expires_at - margin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// A fixed token with no refresh path.
pub struct StaticToken {
    token: AccessToken,
}

impl StaticToken {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn valid_token(&self) -> Result<AccessToken, AppError> {
        Ok(self.token.clone())
    }

    async fn reject(&self, _token: &AccessToken) -> Result<AccessToken, AppError> {
        Err(AppError::Auth {
            reason: "access token was rejected and no refresh token is configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccessToken {
        AccessToken::new("u-test-token").unwrap()
    }

    #[test]
    fn test_expiring_inside_last_tenth() {
        let issued = Utc::now();
        let credential =
            Credential::new(token(), None, issued, issued + Duration::seconds(1000));

        assert!(!credential.is_expiring(issued + Duration::seconds(899)));
        assert!(credential.is_expiring(issued + Duration::seconds(900)));
        assert!(!credential.is_expired(issued + Duration::seconds(999)));
        assert!(credential.is_expired(issued + Duration::seconds(1000)));
    }

    #[test]
    fn test_blank_refresh_token_means_no_refresh_path() {
        let credential = Credential::issued_now(token(), Some("  ".to_string()), Duration::hours(2));
        assert!(!credential.can_refresh());
    }

    #[tokio::test]
    async fn test_static_token_rejection_is_auth_error() {
        let source = StaticToken::new(token());
        assert_eq!(source.valid_token().await.unwrap(), token());
        assert!(matches!(
            source.reject(&token()).await,
            Err(AppError::Auth { .. })
        ));
    }
}
