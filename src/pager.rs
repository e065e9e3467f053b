//! Comment pagination
//!
//! Walks a user's comments page by page through the queue and keeps the ids of
//! comments somebody voted on. Pagination stops on an empty page, on a page
//! without a continuation cursor, or on the first failed page (the queue has
//! already retried it by then).

use crate::api::ApiClient;
use crate::api::responses::{CommentsPage, Cursor};
use crate::error::Result;
use crate::queue::Queue;
use crate::types::{CommentRef, Site};

/// Collects liked comments of one profile
pub struct CommentPager<'a> {
    queue: &'a Queue,
    api: &'a ApiClient,
}

impl<'a> CommentPager<'a> {
    /// Create a pager issuing its requests through `queue`.
    pub fn new(queue: &'a Queue, api: &'a ApiClient) -> Self {
        Self { queue, api }
    }

    /// Load every page and return the comments that have at least one like.
    ///
    /// `on_progress` receives the running number of loaded comments (liked or
    /// not) after every page.
    pub async fn collect<F>(
        &self,
        site: Site,
        subsite_id: u64,
        mut on_progress: F,
    ) -> Vec<CommentRef>
    where
        F: FnMut(u64),
    {
        let mut comments = Vec::new();
        let mut loaded: u64 = 0;
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0u32;

        loop {
            let page = match self.fetch_page(site, subsite_id, cursor.as_ref()).await {
                Ok(Some(page)) if !page.items().is_empty() => page,
                Ok(_) => {
                    tracing::debug!(pages, "No more comments");
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        subsite_id,
                        pages,
                        "Failed to load comments page, stopping pagination"
                    );
                    break;
                }
            };
            pages += 1;

            let items = page.items();
            loaded += items.len() as u64;
            comments.extend(items.iter().filter(|c| c.has_likes()).map(|c| c.to_ref()));
            on_progress(loaded);

            match page.cursor() {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(
            subsite_id,
            pages,
            loaded,
            liked = comments.len(),
            "Comments loaded"
        );
        comments
    }

    async fn fetch_page(
        &self,
        site: Site,
        subsite_id: u64,
        cursor: Option<&Cursor>,
    ) -> Result<Option<CommentsPage>> {
        let request = self.api.comments_page(site, subsite_id, cursor)?;
        let value = self.queue.add_task(request).await?;
        CommentsPage::from_value(value)
    }
}
