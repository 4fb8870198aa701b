//! Token lifecycle state machine with a single-flight refresh.
//!
//! ```text
//! Fresh ──(expiring or rejected)──▶ Refreshing ──ok──▶ Fresh
//!                                        │
//!                                        └──err──▶ Invalid (terminal)
//! ```
//!
//! While `Refreshing`, every caller awaits the same shared future, so at
//! most one refresh request is ever in flight.

use super::{Credential, TokenRefresher, TokenSource};
use crate::error::AppError;
use crate::types::AccessToken;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;

type RefreshFlight = Shared<BoxFuture<'static, Result<Credential, String>>>;

enum TokenState {
    Fresh(Credential),
    Refreshing {
        generation: u64,
        flight: RefreshFlight,
    },
    Invalid(String),
}

/// Observable lifecycle phase, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    Fresh,
    Expiring,
    Refreshing,
    Invalid,
}

/// Owns the credential and refreshes it on demand.
pub struct TokenManager {
    state: Mutex<TokenState>,
    generation: Mutex<u64>,
    refresher: Arc<dyn TokenRefresher>,
}

/// What a caller must do after inspecting the state under the lock.
enum Next {
    Ready(AccessToken),
    Await(u64, RefreshFlight),
    Fail(String),
}

impl TokenManager {
    pub fn new(credential: Credential, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            state: Mutex::new(TokenState::Fresh(credential)),
            generation: Mutex::new(0),
            refresher,
        }
    }

    pub fn phase(&self) -> TokenPhase {
        match &*self.state.lock() {
            TokenState::Fresh(c) if c.is_expiring(Utc::now()) => TokenPhase::Expiring,
            TokenState::Fresh(_) => TokenPhase::Fresh,
            TokenState::Refreshing { .. } => TokenPhase::Refreshing,
            TokenState::Invalid(_) => TokenPhase::Invalid,
        }
    }

    /// Starts a refresh from `credential`, moving the state to `Refreshing`.
    fn begin_refresh(&self, state: &mut TokenState, credential: &Credential) -> Next {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            let reason = "access token expired or was rejected, and no refresh token is configured"
                .to_string();
            *state = TokenState::Invalid(reason.clone());
            return Next::Fail(reason);
        };

        let generation = {
            let mut counter = self.generation.lock();
            *counter += 1;
            *counter
        };

        log::info!("Refreshing access token (generation {})", generation);
        let refresher = Arc::clone(&self.refresher);
        let flight = async move {
            refresher
                .refresh(&refresh_token)
                .await
                .map_err(|e| e.to_string())
        }
        .boxed()
        .shared();

        *state = TokenState::Refreshing {
            generation,
            flight: flight.clone(),
        };
        Next::Await(generation, flight)
    }

    /// Awaits a refresh and settles the state if it is still ours.
    async fn finish(&self, next: Next) -> Result<AccessToken, AppError> {
        let (generation, flight) = match next {
            Next::Ready(token) => return Ok(token),
            Next::Fail(reason) => return Err(AppError::Auth { reason }),
            Next::Await(generation, flight) => (generation, flight),
        };

        let outcome = flight.await;

        {
            let mut state = self.state.lock();
            let still_ours = matches!(
                &*state,
                TokenState::Refreshing { generation: g, .. } if *g == generation
            );
            if still_ours {
                *state = match &outcome {
                    Ok(credential) => TokenState::Fresh(credential.clone()),
                    Err(reason) => TokenState::Invalid(reason.clone()),
                };
            }
        }

        match outcome {
            Ok(credential) => {
                log::debug!("Access token refreshed (generation {})", generation);
                Ok(credential.access_token)
            }
            Err(reason) => {
                log::warn!("Access token refresh failed: {}", reason);
                Err(AppError::Auth { reason })
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for TokenManager {
    async fn valid_token(&self) -> Result<AccessToken, AppError> {
        let next = {
            let mut state = self.state.lock();
            match &*state {
                TokenState::Fresh(credential) => {
                    let now = Utc::now();
                    if !credential.is_expiring(now) {
                        Next::Ready(credential.access_token.clone())
                    } else if !credential.can_refresh() && !credential.is_expired(now) {
                        // Nothing to refresh with; use it while it lasts.
                        Next::Ready(credential.access_token.clone())
                    } else {
                        let credential = credential.clone();
                        self.begin_refresh(&mut state, &credential)
                    }
                }
                TokenState::Refreshing { generation, flight } => {
                    Next::Await(*generation, flight.clone())
                }
                TokenState::Invalid(reason) => Next::Fail(reason.clone()),
            }
        };

        self.finish(next).await
    }

    async fn reject(&self, token: &AccessToken) -> Result<AccessToken, AppError> {
        let next = {
            let mut state = self.state.lock();
            match &*state {
                TokenState::Fresh(credential) if credential.access_token != *token => {
                    // Someone already replaced the rejected token.
                    Next::Ready(credential.access_token.clone())
                }
                TokenState::Fresh(credential) => {
                    log::warn!("Server rejected access token {}", token);
                    let credential = credential.clone();
                    self.begin_refresh(&mut state, &credential)
                }
                TokenState::Refreshing { generation, flight } => {
                    Next::Await(*generation, flight.clone())
                }
                TokenState::Invalid(reason) => Next::Fail(reason.clone()),
            }
        };

        self.finish(next).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingRefresher {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<Credential, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(AppError::Auth {
                    reason: "refresh token revoked".to_string(),
                });
            }
            Ok(Credential::issued_now(
                AccessToken::new(format!("u-refreshed-{}", n)).unwrap(),
                Some("r-next".to_string()),
                Duration::hours(2),
            ))
        }
    }

    fn expiring_credential(refresh: Option<&str>) -> Credential {
        let now = Utc::now();
        Credential::new(
            AccessToken::new("u-old").unwrap(),
            refresh.map(str::to_string),
            now - Duration::minutes(115),
            now + Duration::minutes(5),
        )
    }

    fn manager(credential: Credential, fail: bool) -> (TokenManager, Arc<CountingRefresher>) {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
            fail,
        });
        (TokenManager::new(credential, refresher.clone()), refresher)
    }

    #[tokio::test]
    async fn test_fresh_token_is_returned_without_refresh() {
        let credential = Credential::issued_now(
            AccessToken::new("u-fresh").unwrap(),
            Some("r".to_string()),
            Duration::hours(2),
        );
        let (manager, refresher) = manager(credential, false);

        assert_eq!(manager.phase(), TokenPhase::Fresh);
        assert_eq!(manager.valid_token().await.unwrap().as_str(), "u-fresh");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expiring_token_refreshes_once_for_concurrent_callers() {
        let (manager, refresher) = manager(expiring_credential(Some("r")), false);
        assert_eq!(manager.phase(), TokenPhase::Expiring);

        let (a, b) = tokio::join!(manager.valid_token(), manager.valid_token());

        assert_eq!(a.unwrap().as_str(), "u-refreshed-1");
        assert_eq!(b.unwrap().as_str(), "u-refreshed-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.phase(), TokenPhase::Fresh);
    }

    #[tokio::test]
    async fn test_rejection_triggers_refresh() {
        let credential = Credential::issued_now(
            AccessToken::new("u-fresh").unwrap(),
            Some("r".to_string()),
            Duration::hours(2),
        );
        let (manager, refresher) = manager(credential, false);

        let stale = AccessToken::new("u-fresh").unwrap();
        let replaced = manager.reject(&stale).await.unwrap();
        assert_eq!(replaced.as_str(), "u-refreshed-1");

        // A second report of the same stale token reuses the replacement.
        let again = manager.reject(&stale).await.unwrap();
        assert_eq!(again.as_str(), "u-refreshed-1");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_terminal() {
        let (manager, refresher) = manager(expiring_credential(Some("r")), true);

        assert!(matches!(
            manager.valid_token().await,
            Err(AppError::Auth { .. })
        ));
        assert_eq!(manager.phase(), TokenPhase::Invalid);
        assert!(matches!(
            manager.valid_token().await,
            Err(AppError::Auth { .. })
        ));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_without_refresh_token_is_auth_error() {
        let credential = Credential::issued_now(
            AccessToken::new("u-fresh").unwrap(),
            None,
            Duration::hours(2),
        );
        let (manager, _) = manager(credential, false);
        let token = manager.valid_token().await.unwrap();

        assert!(matches!(
            manager.reject(&token).await,
            Err(AppError::Auth { .. })
        ));
        assert_eq!(manager.phase(), TokenPhase::Invalid);
    }
}
