//! Access token management for the reactions endpoint
//!
//! The reactions endpoint wants a short-lived access token. Tokens are minted
//! by a relay that trades the user's long-lived refresh token for an access
//! token and its expiry (`POST {relay} {"token": ..}` answers
//! `{"token": .., "expires": <unix seconds>}`, or `{"token": null}`).
//!
//! [`TokenProvider`] owns the shared [`AuthSession`]. The session lock is held
//! for the whole refresh, so concurrent requests that find the token stale
//! wait for one refresh and then reuse its result.

use crate::config::AuthConfig;
use crate::error::Result;
use crate::queue::{Task, TaskResponse};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Cached access token
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthSession {
    /// Access token
    pub token: Option<String>,
    /// Expiry, unix seconds
    pub expires_at: Option<i64>,
}

impl AuthSession {
    /// Whether the token stays valid for at least `window` after `now`.
    pub fn is_fresh_at(&self, now: i64, window: Duration) -> bool {
        match (&self.token, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at - now >= window.as_secs() as i64,
            _ => false,
        }
    }
}

/// Relay answer
#[derive(Debug, Deserialize)]
struct TokenGrant {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires: Option<i64>,
}

/// Issues access tokens, refreshing them through the relay when needed
pub struct TokenProvider {
    http: reqwest::Client,
    relay_url: Url,
    refresh_token: String,
    refresh_window: Duration,
    session: Mutex<AuthSession>,
}

impl TokenProvider {
    /// Create a provider with an empty session.
    pub fn new(
        http: reqwest::Client,
        config: &AuthConfig,
        refresh_token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http,
            relay_url: Url::parse(&config.relay_url)?,
            refresh_token: refresh_token.into(),
            refresh_window: config.refresh_window,
            session: Mutex::new(AuthSession::default()),
        })
    }

    /// Current access token, refreshed first if it expires within the window.
    ///
    /// A failed refresh is logged and the cached token (possibly none) is
    /// returned; the request then fails with 401 and is handled upstream.
    pub async fn access_token(&self) -> Option<String> {
        let mut session = self.session.lock().await;
        if !session.is_fresh_at(chrono::Utc::now().timestamp(), self.refresh_window) {
            match self.relay_task().run().await.and_then(TaskResponse::into_json) {
                Ok(value) => {
                    if !apply(&mut session, value) {
                        tracing::warn!("Token relay returned no access token");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to refresh access token");
                }
            }
        }
        session.token.clone()
    }

    /// Store a relay answer obtained elsewhere (e.g. through the queue).
    ///
    /// Returns `false` and leaves the session untouched when the answer
    /// carries no token.
    pub async fn apply_grant(&self, value: Value) -> bool {
        let mut session = self.session.lock().await;
        apply(&mut session, value)
    }

    /// Force a refresh on the next [`access_token`](Self::access_token) call.
    pub async fn invalidate(&self) {
        self.session.lock().await.expires_at = None;
    }

    /// Snapshot of the cached session.
    pub async fn session(&self) -> AuthSession {
        self.session.lock().await.clone()
    }

    /// The relay call as a queue task.
    pub fn relay_task(&self) -> RelayTask {
        RelayTask {
            http: self.http.clone(),
            url: self.relay_url.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("relay_url", &self.relay_url.as_str())
            .field("refresh_window", &self.refresh_window)
            .finish_non_exhaustive()
    }
}

fn apply(session: &mut AuthSession, value: Value) -> bool {
    let grant = match serde_json::from_value::<Option<TokenGrant>>(value) {
        Ok(Some(grant)) => grant,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed token relay response");
            return false;
        }
    };

    match grant.token {
        Some(token) => {
            session.token = Some(token);
            session.expires_at = grant.expires;
            tracing::debug!(expires_at = ?grant.expires, "Access token refreshed");
            true
        }
        None => false,
    }
}

/// `POST {"token": <refresh token>}` to the relay
pub struct RelayTask {
    http: reqwest::Client,
    url: Url,
    refresh_token: String,
}

#[async_trait]
impl Task for RelayTask {
    async fn run(&self) -> Result<TaskResponse> {
        let response = self
            .http
            .post(self.url.clone())
            .json(&serde_json::json!({ "token": self.refresh_token }))
            .send()
            .await?;
        TaskResponse::from_reqwest(response).await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(relay: &MockServer) -> TokenProvider {
        let config = AuthConfig {
            relay_url: format!("{}/", relay.uri()),
            ..AuthConfig::default()
        };
        TokenProvider::new(reqwest::Client::new(), &config, "refresh-me").unwrap()
    }

    fn in_an_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn freshness_needs_the_whole_window() {
        let window = Duration::from_secs(600);
        let session = AuthSession {
            token: Some("t".to_string()),
            expires_at: Some(1_000),
        };

        assert!(session.is_fresh_at(400, window));
        assert!(!session.is_fresh_at(401, window));
        assert!(!AuthSession::default().is_fresh_at(0, window));

        let no_expiry = AuthSession {
            token: Some("t".to_string()),
            expires_at: None,
        };
        assert!(!no_expiry.is_fresh_at(0, window));
    }

    #[tokio::test]
    async fn stale_session_is_refreshed_once_for_concurrent_callers() {
        let relay = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_json(json!({"token": "refresh-me"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": "access-1", "expires": in_an_hour()})),
            )
            .expect(1)
            .mount(&relay)
            .await;

        let provider = Arc::new(provider(&relay));
        let (a, b) = tokio::join!(provider.access_token(), provider.access_token());

        assert_eq!(a.as_deref(), Some("access-1"));
        assert_eq!(b.as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_refresh() {
        let relay = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": "access-2", "expires": in_an_hour()})),
            )
            .expect(2)
            .mount(&relay)
            .await;

        let provider = provider(&relay);
        provider.access_token().await;
        provider.access_token().await;
        provider.invalidate().await;
        assert_eq!(provider.access_token().await.as_deref(), Some("access-2"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_cached_token() {
        let relay = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": null})))
            .mount(&relay)
            .await;

        let provider = provider(&relay);
        assert!(
            provider
                .apply_grant(json!({"token": "old", "expires": 10}))
                .await
        );

        // Expired long ago, relay refuses: the stale token is still sent
        assert_eq!(provider.access_token().await.as_deref(), Some("old"));
        assert_eq!(provider.session().await.expires_at, Some(10));
    }

    #[tokio::test]
    async fn unreachable_relay_yields_no_token() {
        let config = AuthConfig {
            relay_url: "http://127.0.0.1:9/".to_string(),
            ..AuthConfig::default()
        };
        let provider = TokenProvider::new(reqwest::Client::new(), &config, "r").unwrap();
        assert_eq!(provider.access_token().await, None);
    }

    #[tokio::test]
    async fn grants_without_token_are_ignored() {
        let relay = MockServer::start().await;
        let provider = provider(&relay);

        assert!(!provider.apply_grant(json!({"token": null})).await);
        assert!(!provider.apply_grant(Value::Null).await);
        assert!(!provider.apply_grant(json!("garbage")).await);
        assert_eq!(provider.session().await, AuthSession::default());
    }
}
