//! End-to-end likes collection
//!
//! [`LikesCollector`] runs the whole pipeline for one profile link:
//! profile lookup, comment pagination, reaction aggregation. Progress is
//! published as [`Event`]s on a broadcast channel; the final tallies are also
//! returned directly from [`LikesCollector::collect`].
//!
//! # Example
//!
//! ```no_run
//! use osnova_likes::{Config, LikesCollector, LikesMode};
//!
//! # async fn example() -> osnova_likes::Result<()> {
//! let collector = LikesCollector::new(Config::default())?;
//! let mut events = collector.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! let report = collector
//!     .collect("https://dtf.ru/u/12345", LikesMode::Anonymous)
//!     .await?;
//! println!("{} users", report.users.len());
//! # Ok(())
//! # }
//! ```

use crate::aggregator::LikesAggregator;
use crate::api::responses::parse_profile;
use crate::api::{ApiClient, ReactionSource};
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::error::Result;
use crate::pager::CommentPager;
use crate::queue::Queue;
use crate::types::{CommentId, Event, LikesMode, Profile, ProfileTarget, UserMap};
use crate::utils::{comments_eta_secs, likes_eta_secs};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the event channel; slow subscribers lag past this
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Outcome of one collection run
#[derive(Clone, Debug)]
pub struct CollectionReport {
    /// Profile the run was for
    pub target: ProfileTarget,
    /// Profile metadata, when it could be fetched
    pub profile: Option<Profile>,
    /// Comments seen while paging (liked or not)
    pub comments_loaded: u64,
    /// Comments with at least one like
    pub liked_comments: usize,
    /// Per-user tallies
    pub users: UserMap,
    /// Likes across all comments
    pub likes: u64,
    /// Dislikes across all comments
    pub dislikes: u64,
    /// Comments whose reactions could not be fetched
    pub failed: Vec<CommentId>,
}

/// Runs likes collection through a shared rate-limited queue
pub struct LikesCollector {
    config: Arc<Config>,
    queue: Queue,
    api: ApiClient,
    event_tx: broadcast::Sender<Event>,
}

impl LikesCollector {
    /// Validate the configuration and start the request queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let api = ApiClient::new(config.api.clone())?;
        let queue = Queue::new(config.queue.clone());
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            queue,
            api,
            event_tx,
        })
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The request queue.
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Collect like statistics for the profile behind `input`.
    ///
    /// Only a malformed link (or bad token relay settings) fails the run.
    /// Network trouble degrades the result instead: a missing profile is
    /// reported with [`Event::ProfileUnavailable`], a failed page ends
    /// pagination early, and failed comments are listed in the report.
    ///
    /// The queue is reset when a run starts and cleared when it ends, so runs
    /// must not overlap.
    pub async fn collect(&self, input: &str, mode: LikesMode) -> Result<CollectionReport> {
        let target = ProfileTarget::parse(input)?;
        let source = self.reaction_source(mode)?;

        self.queue.clear();
        self.queue.start();

        tracing::info!(
            site = %target.site,
            subsite_id = target.subsite_id,
            mode = ?source,
            "Starting likes collection"
        );

        let profile = self.load_profile(&target).await;
        let total = profile.as_ref().map(|p| p.comments);
        let period = self.config.queue.period;

        let mut comments_loaded = 0;
        let comments = CommentPager::new(&self.queue, &self.api)
            .collect(target.site, target.subsite_id, |loaded| {
                comments_loaded = loaded;
                let loaded = total.map_or(loaded, |total| loaded.min(total));
                self.emit_event(Event::CommentsLoaded {
                    loaded,
                    total,
                    remaining_secs: total.map(|total| comments_eta_secs(total, loaded, period)),
                });
            })
            .await;

        let outcome = LikesAggregator::new(&self.queue, &self.api, source)
            .run(target.site, &comments, |progress| {
                self.emit_event(Event::LikesProgress {
                    progress: progress.clone(),
                    remaining_secs: likes_eta_secs(progress.count, progress.counted, period),
                });
            })
            .await;

        self.emit_event(Event::Completed {
            users: outcome.progress.users.clone(),
            failed: outcome.failed.clone(),
        });
        self.queue.clear();

        Ok(CollectionReport {
            target,
            profile,
            comments_loaded,
            liked_comments: outcome.progress.count,
            users: outcome.progress.users,
            likes: outcome.progress.likes,
            dislikes: outcome.progress.dislikes,
            failed: outcome.failed,
        })
    }

    /// Stop the request queue. Later runs fail their requests with
    /// [`Error::QueueClosed`](crate::Error::QueueClosed).
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    async fn load_profile(&self, target: &ProfileTarget) -> Option<Profile> {
        let result = match self.api.profile(target.site, target.subsite_id) {
            Ok(request) => self.queue.add_task(request).await.and_then(|value| {
                parse_profile(
                    value,
                    &self.config.api.avatar_template,
                    &target.profile_url(),
                )
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(profile) => {
                tracing::info!(
                    name = %profile.name,
                    comments = profile.comments,
                    "Profile loaded"
                );
                self.emit_event(Event::ProfileLoaded {
                    profile: profile.clone(),
                });
                Some(profile)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load profile, continuing without it");
                self.emit_event(Event::ProfileUnavailable {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    fn reaction_source(&self, mode: LikesMode) -> Result<ReactionSource> {
        Ok(match mode {
            LikesMode::Anonymous => ReactionSource::Anonymous,
            LikesMode::Cookie { key } => ReactionSource::Cookie(key),
            LikesMode::Token { refresh_token } => {
                let provider =
                    TokenProvider::new(self.api.http().clone(), &self.config.auth, refresh_token)?;
                ReactionSource::Token(Arc::new(provider))
            }
        })
    }

    fn emit_event(&self, event: Event) {
        // No subscribers is fine, the event is dropped
        self.event_tx.send(event).ok();
    }
}

impl Drop for LikesCollector {
    fn drop(&mut self) {
        self.queue.shutdown();
    }
}
