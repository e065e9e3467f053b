//! Platform API client
//!
//! Builds the requests the pipeline pushes through the [`Queue`](crate::Queue).
//! Nothing here talks to the network on its own: every builder returns an
//! [`ApiRequest`], a re-runnable [`Task`] the queue executes (and retries).
//!
//! Endpoints:
//! - `GET {api}/v2.5/comments?subsiteId=..&sorting=date[&lastId=..&lastSortingValue=..]`
//! - `GET {api}/v2.31/subsite?id=..`
//! - `GET {site}/vote/get_likers?id=..&type=4&mode=raw` (cookie)
//! - `GET {api}/v2.5/comment/{id}/reactions` (access token)
//! - `GET {api}/v2.5/comment/likers/{id}` (anonymous)

pub mod responses;

use crate::auth::TokenProvider;
use crate::config::ApiConfig;
use crate::error::Result;
use crate::queue::{Task, TaskResponse};
use crate::types::{CommentId, Site};
use async_trait::async_trait;
use responses::Cursor;
use std::sync::Arc;
use url::Url;

/// Header carrying the access token on the reactions endpoint
const JWT_HEADER: &str = "jwtauthorization";

/// Name of the session cookie accepted by the likers endpoint
const REMEMBER_COOKIE: &str = "osnova-remember";

/// Where a run's reactions come from
///
/// Chosen once per run; all comments of the run use the same source.
#[derive(Clone)]
pub enum ReactionSource {
    /// Public likers list, no credentials
    Anonymous,
    /// Likers list authenticated by the `osnova-remember` cookie value
    Cookie(String),
    /// Reactions list authenticated by a short-lived access token
    Token(Arc<TokenProvider>),
}

impl std::fmt::Debug for ReactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Credentials stay out of logs
        match self {
            ReactionSource::Anonymous => f.write_str("Anonymous"),
            ReactionSource::Cookie(_) => f.write_str("Cookie(..)"),
            ReactionSource::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// Client for the platform's JSON API
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ApiConfig>,
}

impl ApiClient {
    /// Create a client with the configured request timeout.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Underlying HTTP client, shared with the token relay.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Endpoint configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// One page of a user's comments, newest first.
    pub fn comments_page(
        &self,
        site: Site,
        subsite_id: u64,
        cursor: Option<&Cursor>,
    ) -> Result<ApiRequest> {
        let mut url = self.api_url(site, &self.config.api_version, "comments")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("subsiteId", &subsite_id.to_string())
                .append_pair("sorting", "date");
            if let Some(cursor) = cursor {
                query
                    .append_pair("lastId", &cursor.last_id)
                    .append_pair("lastSortingValue", &cursor.last_sorting_value);
            }
        }
        Ok(self.request(url, RequestAuth::None))
    }

    /// Profile metadata.
    ///
    /// Uses the older API version, which reports a real comment counter.
    pub fn profile(&self, site: Site, subsite_id: u64) -> Result<ApiRequest> {
        let mut url = self.api_url(site, &self.config.profile_api_version, "subsite")?;
        url.query_pairs_mut()
            .append_pair("id", &subsite_id.to_string());
        Ok(self.request(url, RequestAuth::None))
    }

    /// Reactors of one comment, from the endpoint matching `source`.
    pub fn reactions(
        &self,
        site: Site,
        comment: CommentId,
        source: &ReactionSource,
    ) -> Result<ApiRequest> {
        let version = &self.config.api_version;
        let request = match source {
            ReactionSource::Anonymous => {
                let url = self.api_url(site, version, &format!("comment/likers/{comment}"))?;
                self.request(url, RequestAuth::None)
            }
            ReactionSource::Cookie(key) => {
                let base = expand_site(&self.config.site_base, site);
                let mut url = Url::parse(&format!("{base}/vote/get_likers"))?;
                url.query_pairs_mut()
                    .append_pair("id", &comment.to_string())
                    .append_pair("type", "4")
                    .append_pair("mode", "raw");
                self.request(url, RequestAuth::Cookie(key.clone()))
            }
            ReactionSource::Token(provider) => {
                let url = self.api_url(site, version, &format!("comment/{comment}/reactions"))?;
                self.request(url, RequestAuth::Token(provider.clone()))
            }
        };
        Ok(request)
    }

    fn api_url(&self, site: Site, version: &str, endpoint: &str) -> Result<Url> {
        let base = expand_site(&self.config.api_base, site);
        Ok(Url::parse(&format!("{base}/v{version}/{endpoint}"))?)
    }

    fn request(&self, url: Url, auth: RequestAuth) -> ApiRequest {
        ApiRequest {
            http: self.http.clone(),
            url,
            auth,
        }
    }
}

/// Replace `{site}` in a base template and drop any trailing slash.
fn expand_site(template: &str, site: Site) -> String {
    template
        .replace("{site}", site.host())
        .trim_end_matches('/')
        .to_string()
}

enum RequestAuth {
    None,
    Cookie(String),
    Token(Arc<TokenProvider>),
}

/// A GET request against the platform, runnable any number of times
pub struct ApiRequest {
    http: reqwest::Client,
    url: Url,
    auth: RequestAuth,
}

impl ApiRequest {
    /// Target url.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Task for ApiRequest {
    async fn run(&self) -> Result<TaskResponse> {
        let mut request = self.http.get(self.url.clone());
        match &self.auth {
            RequestAuth::None => {}
            RequestAuth::Cookie(key) => {
                request = request.header(reqwest::header::COOKIE, format!("{REMEMBER_COOKIE}={key}"));
            }
            RequestAuth::Token(provider) => {
                // Refreshes first when the cached token is close to expiry.
                // Without a token the request still goes out and the 401 is
                // handled by the caller.
                match provider.access_token().await {
                    Some(token) => {
                        request = request.header(JWT_HEADER, format!("Bearer {token}"));
                    }
                    None => tracing::debug!(url = %self.url, "No access token available"),
                }
            }
        }

        tracing::trace!(url = %self.url, "Sending API request");
        let response = request.send().await?;
        TaskResponse::from_reqwest(response).await
    }
}
