//! Common test utilities for osnova-likes integration tests

use osnova_likes::{ApiConfig, AuthConfig, Config, Event, QueueConfig, RetryConfig};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config pointing every endpoint at `server`, with a fast queue
pub fn mock_config(server: &MockServer) -> Config {
    Config {
        queue: QueueConfig {
            period: Duration::from_millis(10),
            retry: RetryConfig {
                max_attempts: 2,
                delay: Duration::from_millis(10),
            },
        },
        api: ApiConfig {
            api_base: server.uri(),
            site_base: server.uri(),
            ..ApiConfig::default()
        },
        auth: AuthConfig {
            relay_url: format!("{}/relay/", server.uri()),
            ..AuthConfig::default()
        },
    }
}

/// Mount a profile answer for any subsite
pub async fn mount_profile(server: &MockServer, name: &str, comments: u64) {
    Mock::given(method("GET"))
        .and(path("/v2.31/subsite"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"subsite": {
            "name": name,
            "url": format!("https://dtf.ru/u/1-{name}"),
            "rating": 10,
            "avatar": {"type": "image", "data": {"uuid": "ava"}},
            "counters": {"entries": 1, "comments": comments}
        }}})))
        .mount(server)
        .await;
}

/// Mount a two-page comments listing: `first` with a cursor, then `second` without
pub async fn mount_comment_pages(server: &MockServer, first: Value, second: Value) {
    Mock::given(method("GET"))
        .and(path("/v2.5/comments"))
        .and(query_param_is_missing("lastId"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {
            "items": first,
            "lastId": 1,
            "lastSortingValue": 2
        }})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2.5/comments"))
        .and(query_param("lastId", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {
            "items": second
        }})))
        .mount(server)
        .await;
}

/// A listed comment with `likes` likes
pub fn comment(id: i64, likes: i64) -> Value {
    json!({"id": id, "likes": {"counterLikes": likes}})
}

/// Every event currently buffered in `events`
pub fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
