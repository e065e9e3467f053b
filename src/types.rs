//! Core types for osnova-likes

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Osnova-based site a profile lives on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// dtf.ru
    Dtf,
    /// vc.ru
    Vc,
    /// tjournal.ru
    Tjournal,
}

impl Site {
    /// Host name of the site
    pub fn host(&self) -> &'static str {
        match self {
            Site::Dtf => "dtf.ru",
            Site::Vc => "vc.ru",
            Site::Tjournal => "tjournal.ru",
        }
    }

    fn from_host(host: &str) -> Option<Self> {
        match host {
            "dtf.ru" => Some(Site::Dtf),
            "vc.ru" => Some(Site::Vc),
            "tjournal.ru" => Some(Site::Tjournal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.host())
    }
}

/// Profile whose comments are analysed, extracted from a profile link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileTarget {
    /// Site hosting the profile
    pub site: Site,
    /// Subsite (user) id
    pub subsite_id: u64,
}

impl ProfileTarget {
    /// Extract the site and subsite id from a link like `https://dtf.ru/u/12345`.
    ///
    /// The link may be surrounded by other text; only the first match is used.
    pub fn parse(input: &str) -> Result<Self> {
        static PROFILE_URL: OnceLock<Option<Regex>> = OnceLock::new();
        let invalid = || Error::InvalidProfileUrl(input.to_string());

        let re = PROFILE_URL
            .get_or_init(|| Regex::new(r"(https://)?(dtf\.ru|vc\.ru|tjournal\.ru)/u/(\d+)").ok())
            .as_ref()
            .ok_or_else(invalid)?;
        let captures = re.captures(input).ok_or_else(invalid)?;
        let site = captures
            .get(2)
            .and_then(|m| Site::from_host(m.as_str()))
            .ok_or_else(invalid)?;
        let subsite_id = captures
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)?;

        Ok(Self { site, subsite_id })
    }

    /// Public link to the profile
    pub fn profile_url(&self) -> String {
        format!("https://{}/u/{}", self.site.host(), self.subsite_id)
    }
}

/// Comment identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier
///
/// The cookie endpoint keys users by string, the JSON API by number; both are
/// normalized to the decimal string form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A comment that has at least one like and needs its reactors fetched
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentRef {
    /// Comment id
    pub id: CommentId,
}

/// Like or dislike
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    /// Positive vote (API type 1)
    Like,
    /// Any other vote
    Dislike,
}

impl ReactionKind {
    /// Map the API's numeric vote type.
    pub fn from_api_type(kind: i64) -> Self {
        if kind == 1 {
            ReactionKind::Like
        } else {
            ReactionKind::Dislike
        }
    }
}

/// One user's reaction on one comment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Reacting user
    pub user_id: UserId,
    /// Display name
    pub name: String,
    /// Resolved avatar url, if the avatar type is supported
    pub avatar_url: Option<String>,
    /// Vote direction
    pub kind: ReactionKind,
}

/// Accumulated votes of one user across all processed comments
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStat {
    /// User id
    pub id: UserId,
    /// Likes left by this user
    pub likes: u64,
    /// Dislikes left by this user
    pub dislikes: u64,
    /// Avatar url
    pub avatar_url: Option<String>,
    /// Display name
    pub name: String,
}

impl UserStat {
    /// Fresh record with zero votes, seeded from the first reaction seen.
    pub fn from_reaction(reaction: &Reaction) -> Self {
        Self {
            id: reaction.user_id.clone(),
            likes: 0,
            dislikes: 0,
            avatar_url: reaction.avatar_url.clone(),
            name: reaction.name.clone(),
        }
    }
}

/// Users keyed by id
pub type UserMap = HashMap<UserId, UserStat>;

/// Immutable view of aggregation progress, emitted after every comment
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Comments processed so far (successfully or not)
    pub counted: usize,
    /// Comments to process in total
    pub count: usize,
    /// Likes seen so far
    pub likes: u64,
    /// Dislikes seen so far
    pub dislikes: u64,
    /// Per-user tallies
    pub users: UserMap,
}

/// How reactions are fetched for a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum LikesMode {
    /// Public likers endpoint, no credentials
    #[default]
    Anonymous,
    /// Likers endpoint authenticated with the `osnova-remember` cookie
    Cookie {
        /// Cookie value
        key: String,
    },
    /// Reactions endpoint authenticated with a JWT obtained from a refresh token
    Token {
        /// Long-lived refresh token exchanged at the relay
        refresh_token: String,
    },
}

/// Profile metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    pub name: String,
    /// Profile link
    pub url: String,
    /// Karma
    pub rating: i64,
    /// Avatar url
    pub avatar_url: Option<String>,
    /// Number of published entries
    pub entries: u64,
    /// Number of comments left by the user
    pub comments: u64,
}

/// Events emitted by [`LikesCollector`](crate::LikesCollector)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Profile metadata fetched
    ProfileLoaded {
        /// Profile
        profile: Profile,
    },

    /// Profile could not be fetched; the run continues without it
    ProfileUnavailable {
        /// Why the lookup failed
        error: String,
    },

    /// Another page of comments was loaded
    CommentsLoaded {
        /// Comments loaded so far (capped at the profile's counter when known)
        loaded: u64,
        /// Total comments according to the profile
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
        /// Estimated seconds until the whole run finishes
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_secs: Option<f64>,
    },

    /// Another comment's reactions were processed
    LikesProgress {
        /// Current totals
        progress: ProgressSnapshot,
        /// Estimated seconds until aggregation finishes
        remaining_secs: f64,
    },

    /// Aggregation finished
    Completed {
        /// Final per-user tallies
        users: UserMap,
        /// Comments that could not be processed
        failed: Vec<CommentId>,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_profile_links() {
        let target = ProfileTarget::parse("https://dtf.ru/u/12345-some-name").unwrap();
        assert_eq!(target.site, Site::Dtf);
        assert_eq!(target.subsite_id, 12345);

        let target = ProfileTarget::parse("vc.ru/u/7").unwrap();
        assert_eq!(target.site, Site::Vc);
        assert_eq!(target.subsite_id, 7);

        let target = ProfileTarget::parse("look: tjournal.ru/u/42/comments").unwrap();
        assert_eq!(target.site, Site::Tjournal);
        assert_eq!(target.profile_url(), "https://tjournal.ru/u/42");
    }

    #[test]
    fn rejects_foreign_links() {
        for input in ["https://example.com/u/1", "dtf.ru/user/1", "", "dtf.ru/u/"] {
            match ProfileTarget::parse(input) {
                Err(Error::InvalidProfileUrl(raw)) => assert_eq!(raw, input),
                other => panic!("expected invalid url for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn vote_type_one_is_a_like() {
        assert_eq!(ReactionKind::from_api_type(1), ReactionKind::Like);
        assert_eq!(ReactionKind::from_api_type(-1), ReactionKind::Dislike);
        assert_eq!(ReactionKind::from_api_type(0), ReactionKind::Dislike);
    }

    #[test]
    fn likes_mode_serializes_with_tag() {
        let mode = LikesMode::Token {
            refresh_token: "r".to_string(),
        };
        let json = serde_json::to_value(&mode).unwrap();
        assert_eq!(json["mode"], "token");
        assert_eq!(json["refresh_token"], "r");
    }
}
