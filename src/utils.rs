//! Utility functions for progress estimates and result ranking

use crate::types::{UserMap, UserStat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of users in a ranking
pub const MAX_USERS_TO_SHOW: usize = 1000;

/// Comments returned per comments page
pub const COMMENTS_PER_REQUEST: u64 = 50;

/// Typical duration of a comments page request
pub const REQUEST_COMMENTS_ETA: Duration = Duration::from_millis(3000);

/// Typical duration of a single comment's reactions request
pub const REQUEST_COMMENT_ETA: Duration = Duration::from_millis(100);

/// Format a number of seconds as `HH:MM:SS`
///
/// Fractions are truncated and negative values clamp to zero. Hours are not
/// capped, so long runs render as e.g. `123:04:05`.
///
/// # Examples
///
/// ```
/// use osnova_likes::utils::format_time;
///
/// assert_eq!(format_time(3661.0), "01:01:01");
/// assert_eq!(format_time(59.0), "00:00:59");
/// ```
pub fn format_time(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Estimated seconds left for a whole run while comments are still paging
///
/// Remaining comment pages plus one reactions request per comment of the
/// profile, each paced by the queue `period`.
pub fn comments_eta_secs(total: u64, loaded: u64, period: Duration) -> f64 {
    let remaining_pages = total.saturating_sub(loaded) as f64 / COMMENTS_PER_REQUEST as f64;
    let paging = remaining_pages * (period + REQUEST_COMMENTS_ETA).as_secs_f64();
    let reactions = total as f64 * (period + REQUEST_COMMENT_ETA).as_secs_f64();
    paging + reactions
}

/// Estimated seconds left for aggregation: one queue period per comment
pub fn likes_eta_secs(count: usize, counted: usize, period: Duration) -> f64 {
    count.saturating_sub(counted) as f64 * period.as_secs_f64()
}

/// Counter to rank users by
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    /// Likes given
    Likes,
    /// Dislikes given
    Dislikes,
}

impl RankBy {
    fn count(&self, user: &UserStat) -> u64 {
        match self {
            RankBy::Likes => user.likes,
            RankBy::Dislikes => user.dislikes,
        }
    }
}

/// Users with a nonzero counter, highest first, at most `limit` of them
///
/// Ties are broken by user id so the order is stable between calls.
pub fn rank_users(users: &UserMap, by: RankBy, limit: usize) -> Vec<&UserStat> {
    let mut ranked: Vec<&UserStat> = users.values().filter(|u| by.count(u) > 0).collect();
    ranked.sort_by(|a, b| by.count(b).cmp(&by.count(a)).then_with(|| a.id.cmp(&b.id)));
    ranked.truncate(limit);
    ranked
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn user(id: &str, likes: u64, dislikes: u64) -> UserStat {
        UserStat {
            id: UserId::from(id),
            likes,
            dislikes,
            avatar_url: None,
            name: id.to_uppercase(),
        }
    }

    fn map(users: Vec<UserStat>) -> UserMap {
        users.into_iter().map(|u| (u.id.clone(), u)).collect()
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(3661.0), "01:01:01");
        assert_eq!(format_time(59.0), "00:00:59");
        assert_eq!(format_time(59.9), "00:00:59");
        assert_eq!(format_time(0.0), "00:00:00");
        assert_eq!(format_time(36_000.0), "10:00:00");
        assert_eq!(format_time(443_045.0), "123:04:05");
    }

    #[test]
    fn test_format_time_clamps_invalid_input() {
        assert_eq!(format_time(-5.0), "00:00:00");
        assert_eq!(format_time(f64::NAN), "00:00:00");
        assert_eq!(format_time(f64::INFINITY), "00:00:00");
    }

    #[test]
    fn test_comments_eta() {
        let period = Duration::from_millis(900);
        // One page left (3.9s) plus 100 reactions requests (1s each)
        let eta = comments_eta_secs(100, 50, period);
        assert!((eta - 103.9).abs() < 1e-9, "got {eta}");

        // Everything paged, only reactions left
        let eta = comments_eta_secs(100, 120, period);
        assert!((eta - 100.0).abs() < 1e-9, "got {eta}");
    }

    #[test]
    fn test_likes_eta() {
        let period = Duration::from_millis(900);
        assert!((likes_eta_secs(10, 4, period) - 5.4).abs() < 1e-9);
        assert_eq!(likes_eta_secs(3, 3, period), 0.0);
        assert_eq!(likes_eta_secs(3, 5, period), 0.0);
    }

    #[test]
    fn test_rank_users_orders_and_filters() {
        let users = map(vec![
            user("b", 3, 0),
            user("a", 3, 1),
            user("c", 7, 0),
            user("d", 0, 2),
        ]);

        let likers: Vec<_> = rank_users(&users, RankBy::Likes, MAX_USERS_TO_SHOW)
            .into_iter()
            .map(|u| u.id.0.as_str())
            .collect();
        assert_eq!(likers, vec!["c", "a", "b"]);

        let dislikers: Vec<_> = rank_users(&users, RankBy::Dislikes, MAX_USERS_TO_SHOW)
            .into_iter()
            .map(|u| u.id.0.as_str())
            .collect();
        assert_eq!(dislikers, vec!["d", "a"]);
    }

    #[test]
    fn test_rank_users_respects_limit() {
        let users = map((0..20).map(|i| user(&format!("u{i:02}"), i + 1, 0)).collect());
        let top = rank_users(&users, RankBy::Likes, 5);
        assert_eq!(top.len(), 5);
        assert_eq!(top[0].likes, 20);
        assert_eq!(top[4].likes, 16);
    }
}
