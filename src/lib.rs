//! # osnova-likes
//!
//! Collects who liked and disliked a user's comments on Osnova sites
//! (dtf.ru, vc.ru, tjournal.ru).
//!
//! ## Design Philosophy
//!
//! osnova-likes is designed to be:
//! - **Polite to the API** - Every request goes through one rate-limited, retrying queue
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use osnova_likes::{Config, LikesCollector, LikesMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collector = LikesCollector::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = collector.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = collector
//!         .collect("https://dtf.ru/u/12345", LikesMode::Anonymous)
//!         .await?;
//!     println!("{} likes from {} users", report.likes, report.users.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Reaction aggregation
pub mod aggregator;
/// Platform API requests and response shapes
pub mod api;
/// Access token refresh
pub mod auth;
/// End-to-end collection pipeline
pub mod collector;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Comment pagination
pub mod pager;
/// Rate-limited task queue
pub mod queue;
/// Retry logic with fixed backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Progress estimates and ranking
pub mod utils;

// Re-export commonly used types
pub use aggregator::{AggregateOutcome, LikesAggregator};
pub use api::{ApiClient, ReactionSource};
pub use auth::{AuthSession, TokenProvider};
pub use collector::{CollectionReport, LikesCollector};
pub use config::{ApiConfig, AuthConfig, Config, QueueConfig, RetryConfig};
pub use error::{Error, Result};
pub use pager::CommentPager;
pub use queue::{Queue, QueueState, QueueStatus, Task, TaskHandle, TaskResponse};
pub use types::{
    CommentId, CommentRef, Event, LikesMode, Profile, ProfileTarget, ProgressSnapshot, Reaction,
    ReactionKind, Site, UserId, UserMap, UserStat,
};

/// Run a collection, abandoning it when a termination signal arrives.
///
/// Listens for Ctrl+C everywhere and for SIGTERM on Unix. On a signal the
/// collector's queue is shut down and [`Error::Cancelled`] is returned.
///
/// # Example
///
/// ```no_run
/// use osnova_likes::{collect_with_shutdown, Config, LikesCollector, LikesMode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let collector = LikesCollector::new(Config::default())?;
///     let report =
///         collect_with_shutdown(&collector, "vc.ru/u/1", LikesMode::Anonymous).await?;
///     println!("{} users", report.users.len());
///     Ok(())
/// }
/// ```
pub async fn collect_with_shutdown(
    collector: &LikesCollector,
    input: &str,
    mode: LikesMode,
) -> Result<CollectionReport> {
    collect_until(collector, input, mode, wait_for_signal()).await
}

/// Run a collection, abandoning it as soon as `shutdown` completes.
pub async fn collect_until<S>(
    collector: &LikesCollector,
    input: &str,
    mode: LikesMode,
    shutdown: S,
) -> Result<CollectionReport>
where
    S: std::future::Future<Output = ()>,
{
    tokio::select! {
        report = collector.collect(input, mode) => report,
        () = shutdown => {
            tracing::info!(input, "Collection abandoned");
            collector.shutdown();
            Err(Error::Cancelled)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM unavailable, only Ctrl+C stops the collection");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = terminate.recv() => tracing::info!("Received SIGTERM"),
        () = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

/// Resolves on Ctrl+C; never resolves when the handler cannot be installed.
async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await
        }
    }
}
