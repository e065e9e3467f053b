//! Reaction aggregation
//!
//! Enqueues one reaction request per comment and folds the answers into
//! per-user like/dislike tallies. Every settled comment, successful or not,
//! advances the `counted` counter and produces a progress snapshot, so
//! `counted == count` always marks the end of a run.
//!
//! A comment that fails with 401 on its first submission is submitted once
//! more (after invalidating the access token in token mode) and only counted
//! when that second submission settles.

use crate::api::responses::parse_reactions;
use crate::api::{ApiClient, ReactionSource};
use crate::error::{Error, Result};
use crate::queue::Queue;
use crate::types::{
    CommentId, CommentRef, ProgressSnapshot, Reaction, ReactionKind, Site, UserStat,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::HashSet;

/// Final state of an aggregation run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateOutcome {
    /// Totals and per-user tallies; `counted == count` once the run is over
    pub progress: ProgressSnapshot,
    /// Comments whose reactions could not be fetched
    pub failed: Vec<CommentId>,
}

struct Settled {
    comment: CommentRef,
    first_attempt: bool,
    result: Result<Value>,
}

/// Folds comment reactions into user statistics
pub struct LikesAggregator<'a> {
    queue: &'a Queue,
    api: &'a ApiClient,
    source: ReactionSource,
}

impl<'a> LikesAggregator<'a> {
    /// Create an aggregator fetching reactions from `source`.
    pub fn new(queue: &'a Queue, api: &'a ApiClient, source: ReactionSource) -> Self {
        Self { queue, api, source }
    }

    /// Fetch and tally the reactions of every comment.
    ///
    /// Duplicate comment ids are processed once. `on_progress` is called after
    /// each comment settles.
    pub async fn run<F>(
        &self,
        site: Site,
        comments: &[CommentRef],
        mut on_progress: F,
    ) -> AggregateOutcome
    where
        F: FnMut(&ProgressSnapshot),
    {
        let mut seen = HashSet::new();
        let comments: Vec<CommentRef> = comments
            .iter()
            .copied()
            .filter(|c| seen.insert(c.id))
            .collect();

        let mut outcome = AggregateOutcome {
            progress: ProgressSnapshot {
                count: comments.len(),
                ..ProgressSnapshot::default()
            },
            failed: Vec::new(),
        };
        if comments.is_empty() {
            tracing::info!("No liked comments, nothing to aggregate");
            return outcome;
        }

        self.prime_token().await;

        let mut pending = FuturesUnordered::new();
        for comment in &comments {
            pending.push(self.submit(site, *comment, true));
        }

        while let Some(settled) = pending.next().await {
            let Settled {
                comment,
                first_attempt,
                result,
            } = settled;

            let reactions = result.and_then(|value| {
                parse_reactions(&self.source, value, &self.api.config().avatar_template)
            });

            match reactions {
                Ok(reactions) => {
                    record(&mut outcome.progress, &reactions);
                    tracing::trace!(
                        comment_id = %comment.id,
                        reactions = reactions.len(),
                        "Comment processed"
                    );
                }
                Err(e) if first_attempt && e.is_unauthorized() => {
                    tracing::debug!(comment_id = %comment.id, "Unauthorized, resubmitting comment");
                    if let ReactionSource::Token(provider) = &self.source {
                        provider.invalidate().await;
                    }
                    pending.push(self.submit(site, comment, false));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        comment_id = %comment.id,
                        error = %e,
                        "Failed to load comment reactions"
                    );
                    outcome.failed.push(comment.id);
                }
            }

            outcome.progress.counted += 1;
            on_progress(&outcome.progress);
        }

        if !outcome.failed.is_empty() {
            tracing::error!(
                failed = outcome.failed.len(),
                comment_ids = ?outcome.failed,
                "Some comments could not be processed"
            );
        }
        tracing::info!(
            comments = outcome.progress.count,
            users = outcome.progress.users.len(),
            likes = outcome.progress.likes,
            dislikes = outcome.progress.dislikes,
            "Aggregation complete"
        );
        outcome
    }

    /// Obtain the first access token through the queue, before any reaction
    /// request needs it.
    async fn prime_token(&self) {
        let ReactionSource::Token(provider) = &self.source else {
            return;
        };
        match self.queue.add_task(provider.relay_task()).await {
            Ok(grant) => {
                if !provider.apply_grant(grant).await {
                    tracing::warn!("Token relay returned no access token");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to get access token from refresh token"),
        }
    }

    /// Enqueue the reaction request now; the returned future waits for it.
    fn submit(
        &self,
        site: Site,
        comment: CommentRef,
        first_attempt: bool,
    ) -> BoxFuture<'static, Settled> {
        match self.api.reactions(site, comment.id, &self.source) {
            Ok(request) => {
                let handle = self.queue.add_task(request);
                async move {
                    Settled {
                        comment,
                        first_attempt,
                        result: handle.await,
                    }
                }
                .boxed()
            }
            Err(e) => futures::future::ready(Settled {
                comment,
                first_attempt,
                result: Err::<Value, Error>(e),
            })
            .boxed(),
        }
    }
}

fn record(progress: &mut ProgressSnapshot, reactions: &[Reaction]) {
    for reaction in reactions {
        let user = progress
            .users
            .entry(reaction.user_id.clone())
            .or_insert_with(|| UserStat::from_reaction(reaction));
        match reaction.kind {
            ReactionKind::Like => {
                user.likes += 1;
                progress.likes += 1;
            }
            ReactionKind::Dislike => {
                user.dislikes += 1;
                progress.dislikes += 1;
            }
        }
    }
}
