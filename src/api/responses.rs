//! Response shapes of the platform API
//!
//! The API is loose about types: ids arrive as numbers or strings, cursors may
//! be `null`, `0` or missing, and whole sections disappear on empty results.
//! Every optional part is modelled as `Option` so that a sparse payload decodes
//! to "nothing here" instead of a parse error.

use super::ReactionSource;
use crate::error::Result;
use crate::types::{CommentId, CommentRef, Profile, Reaction, ReactionKind, UserId};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// Continuation point for the next comments page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// `lastId` query value
    pub last_id: String,
    /// `lastSortingValue` query value
    pub last_sorting_value: String,
}

#[derive(Debug, Deserialize)]
struct CommentsEnvelope {
    #[serde(default)]
    result: Option<CommentsPage>,
}

/// One page of the comments listing
#[derive(Debug, Default, Deserialize)]
pub struct CommentsPage {
    #[serde(default)]
    items: Option<Vec<CommentItem>>,
    #[serde(rename = "lastId", default)]
    last_id: Option<Value>,
    #[serde(rename = "lastSortingValue", default)]
    last_sorting_value: Option<Value>,
}

impl CommentsPage {
    /// Decode a page; `None` when the response carries no page at all.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        let envelope: Option<CommentsEnvelope> = serde_json::from_value(value)?;
        Ok(envelope.and_then(|e| e.result))
    }

    /// Comments on this page (empty when the list is missing).
    pub fn items(&self) -> &[CommentItem] {
        self.items.as_deref().unwrap_or_default()
    }

    /// Cursor for the following page, or `None` on the last page.
    ///
    /// The last page is signalled by a missing or falsy `lastId` or
    /// `lastSortingValue`.
    pub fn cursor(&self) -> Option<Cursor> {
        Some(Cursor {
            last_id: cursor_param(self.last_id.as_ref())?,
            last_sorting_value: cursor_param(self.last_sorting_value.as_ref())?,
        })
    }
}

fn cursor_param(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

/// A comment as listed on a comments page
#[derive(Debug, Deserialize)]
pub struct CommentItem {
    /// Comment id
    pub id: CommentId,
    #[serde(default)]
    likes: Option<CommentLikes>,
}

#[derive(Debug, Deserialize)]
struct CommentLikes {
    #[serde(rename = "counterLikes", default, deserialize_with = "null_as_default")]
    counter_likes: i64,
}

impl CommentItem {
    /// Whether anyone has voted on the comment.
    pub fn has_likes(&self) -> bool {
        self.likes.as_ref().is_some_and(|l| l.counter_likes != 0)
    }

    /// Reference kept for reaction fetching.
    pub fn to_ref(&self) -> CommentRef {
        CommentRef { id: self.id }
    }
}

/// Avatar descriptor
#[derive(Debug, Deserialize)]
pub struct Avatar {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: String,
    #[serde(default)]
    data: Option<AvatarData>,
}

#[derive(Debug, Deserialize)]
struct AvatarData {
    #[serde(default)]
    uuid: Option<String>,
}

impl Avatar {
    /// CDN url for image avatars; other avatar kinds have no url.
    pub fn url(&self, template: &str) -> Option<String> {
        if self.kind != "image" {
            return None;
        }
        let uuid = self.data.as_ref()?.uuid.as_deref()?;
        Some(template.replace("{uuid}", uuid))
    }
}

/// A user as embedded in likers and reactions payloads
#[derive(Debug, Deserialize)]
struct ApiUser {
    #[serde(deserialize_with = "user_id")]
    id: UserId,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default)]
    avatar: Option<Avatar>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: i64,
}

impl ApiUser {
    fn into_reaction(self, avatar_template: &str) -> Reaction {
        Reaction {
            avatar_url: self.avatar.as_ref().and_then(|a| a.url(avatar_template)),
            user_id: self.id,
            name: self.name,
            kind: ReactionKind::from_api_type(self.kind),
        }
    }
}

/// `null` decodes like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn user_id<'de, D>(deserializer: D) -> std::result::Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(id) => UserId::from(id),
        Raw::Text(id) => UserId(id),
    })
}

#[derive(Debug, Deserialize)]
struct CookieLikers {
    #[serde(default)]
    data: Option<CookieLikersData>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CookieLikersData {
    #[serde(default)]
    likers: Option<HashMap<String, CookieLiker>>,
}

#[derive(Debug, Deserialize)]
struct CookieLiker {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    kind: i64,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenReactions {
    #[serde(default)]
    result: Option<TokenReactionsResult>,
}

#[derive(Debug, Deserialize)]
struct TokenReactionsResult {
    #[serde(default)]
    reactions: Option<Vec<TokenReaction>>,
}

#[derive(Debug, Deserialize)]
struct TokenReaction {
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct AnonymousLikers {
    #[serde(default)]
    result: Option<Vec<ApiUser>>,
}

/// Decode one comment's reactors from the payload shape of `source`.
pub fn parse_reactions(
    source: &ReactionSource,
    value: Value,
    avatar_template: &str,
) -> Result<Vec<Reaction>> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    let reactions = match source {
        ReactionSource::Cookie(_) => {
            let payload: CookieLikers = serde_json::from_value(value)?;
            let confirmed = payload.result.as_ref().and_then(Value::as_object);
            let likers = payload.data.and_then(|d| d.likers).unwrap_or_default();

            // Only users present in both maps count
            likers
                .into_iter()
                .filter(|(id, _)| confirmed.is_some_and(|c| c.contains_key(id)))
                .map(|(id, liker)| Reaction {
                    user_id: UserId(id),
                    name: liker.name,
                    avatar_url: liker.avatar_url,
                    kind: ReactionKind::from_api_type(liker.kind),
                })
                .collect()
        }
        ReactionSource::Token(_) => {
            let payload: TokenReactions = serde_json::from_value(value)?;
            payload
                .result
                .and_then(|r| r.reactions)
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.user.into_reaction(avatar_template))
                .collect()
        }
        ReactionSource::Anonymous => {
            let payload: AnonymousLikers = serde_json::from_value(value)?;
            payload
                .result
                .unwrap_or_default()
                .into_iter()
                .map(|user| user.into_reaction(avatar_template))
                .collect()
        }
    };
    Ok(reactions)
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    result: ProfileResult,
}

#[derive(Debug, Deserialize)]
struct ProfileResult {
    subsite: Subsite,
}

#[derive(Debug, Deserialize)]
struct Subsite {
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    rating: f64,
    #[serde(default)]
    avatar: Option<Avatar>,
    #[serde(default, deserialize_with = "null_as_default")]
    counters: SubsiteCounters,
}

#[derive(Debug, Default, Deserialize)]
struct SubsiteCounters {
    #[serde(default, deserialize_with = "null_as_default")]
    entries: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    comments: u64,
}

/// Decode a profile; `fallback_url` is used when the payload has no link.
pub fn parse_profile(value: Value, avatar_template: &str, fallback_url: &str) -> Result<Profile> {
    let subsite = serde_json::from_value::<ProfileEnvelope>(value)?.result.subsite;
    Ok(Profile {
        avatar_url: subsite.avatar.as_ref().and_then(|a| a.url(avatar_template)),
        name: subsite.name,
        url: subsite.url.unwrap_or_else(|| fallback_url.to_string()),
        rating: subsite.rating.round() as i64,
        entries: subsite.counters.entries,
        comments: subsite.counters.comments,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEMPLATE: &str = "https://cdn.test/{uuid}/";

    #[test]
    fn page_with_cursor_continues() {
        let page = CommentsPage::from_value(json!({
            "result": {
                "items": [
                    {"id": 1, "likes": {"counterLikes": 3}},
                    {"id": 2, "likes": {"counterLikes": 0}},
                    {"id": 3}
                ],
                "lastId": 3,
                "lastSortingValue": 1700000000
            }
        }))
        .unwrap()
        .unwrap();

        let liked: Vec<_> = page
            .items()
            .iter()
            .filter(|c| c.has_likes())
            .map(|c| c.id)
            .collect();
        assert_eq!(liked, vec![CommentId(1)]);
        assert_eq!(
            page.cursor(),
            Some(Cursor {
                last_id: "3".to_string(),
                last_sorting_value: "1700000000".to_string(),
            })
        );
    }

    #[test]
    fn falsy_cursor_ends_pagination() {
        for result in [
            json!({"items": [], "lastId": null, "lastSortingValue": 5}),
            json!({"items": [], "lastId": 1, "lastSortingValue": 0}),
            json!({"items": [], "lastId": "", "lastSortingValue": "x"}),
            json!({"items": []}),
        ] {
            let page = CommentsPage::from_value(json!({ "result": result }))
                .unwrap()
                .unwrap();
            assert_eq!(page.cursor(), None);
        }
    }

    #[test]
    fn null_like_counter_counts_as_unliked() {
        let page = CommentsPage::from_value(json!({"result": {
            "items": [
                {"id": 1, "likes": {"counterLikes": 2}},
                {"id": 2, "likes": {"counterLikes": null}},
                {"id": 3, "likes": null}
            ],
            "lastId": 3,
            "lastSortingValue": 9
        }}))
        .unwrap()
        .unwrap();

        assert_eq!(page.items().len(), 3);
        let liked: Vec<_> = page
            .items()
            .iter()
            .filter(|c| c.has_likes())
            .map(|c| c.id)
            .collect();
        assert_eq!(liked, vec![CommentId(1)]);
        assert!(page.cursor().is_some());
    }

    #[test]
    fn missing_page_is_none() {
        assert!(CommentsPage::from_value(Value::Null).unwrap().is_none());
        assert!(CommentsPage::from_value(json!({})).unwrap().is_none());
        assert!(CommentsPage::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn cookie_likers_must_be_confirmed() {
        let payload = json!({
            "data": {"likers": {
                "10": {"type": 1, "avatar_url": "https://a/10", "name": "Ten"},
                "11": {"type": -1, "avatar_url": null, "name": "Eleven"},
                "12": {"type": 1, "name": "Ghost"}
            }},
            "result": {"10": 1, "11": -1}
        });

        let mut reactions =
            parse_reactions(&ReactionSource::Cookie("k".into()), payload, TEMPLATE).unwrap();
        reactions.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        assert_eq!(reactions.len(), 2);
        assert_eq!(reactions[0].user_id, UserId::from("10"));
        assert_eq!(reactions[0].kind, ReactionKind::Like);
        assert_eq!(reactions[0].avatar_url.as_deref(), Some("https://a/10"));
        assert_eq!(reactions[1].kind, ReactionKind::Dislike);
    }

    #[test]
    fn anonymous_likers_resolve_image_avatars() {
        let payload = json!({"result": [
            {"id": 5, "name": "Five", "type": 1,
             "avatar": {"type": "image", "data": {"uuid": "abc"}}},
            {"id": "6", "name": "Six", "type": 0,
             "avatar": {"type": "gif", "data": {"uuid": "zzz"}}}
        ]});

        let reactions = parse_reactions(&ReactionSource::Anonymous, payload, TEMPLATE).unwrap();
        assert_eq!(reactions[0].user_id, UserId::from(5));
        assert_eq!(reactions[0].avatar_url.as_deref(), Some("https://cdn.test/abc/"));
        assert_eq!(reactions[1].user_id, UserId::from("6"));
        assert_eq!(reactions[1].avatar_url, None);
        assert_eq!(reactions[1].kind, ReactionKind::Dislike);
    }

    #[test]
    fn null_user_fields_keep_the_reactor() {
        let anonymous = json!({"result": [
            {"id": 5, "name": "Five", "type": 1},
            {"id": 6, "name": null, "type": 1, "avatar": {"type": null, "data": null}}
        ]});
        let reactions = parse_reactions(&ReactionSource::Anonymous, anonymous, TEMPLATE).unwrap();
        assert_eq!(reactions.len(), 2);
        assert_eq!(reactions[1].user_id, UserId::from(6));
        assert_eq!(reactions[1].name, "");
        assert_eq!(reactions[1].avatar_url, None);

        let cookie = json!({
            "data": {"likers": {"7": {"type": 1, "name": null}}},
            "result": {"7": 1}
        });
        let reactions =
            parse_reactions(&ReactionSource::Cookie("k".into()), cookie, TEMPLATE).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].kind, ReactionKind::Like);
        assert_eq!(reactions[0].name, "");
    }

    #[test]
    fn empty_payloads_have_no_reactions() {
        assert!(
            parse_reactions(&ReactionSource::Anonymous, Value::Null, TEMPLATE)
                .unwrap()
                .is_empty()
        );
        assert!(
            parse_reactions(&ReactionSource::Anonymous, json!({"result": null}), TEMPLATE)
                .unwrap()
                .is_empty()
        );
        assert!(
            parse_reactions(&ReactionSource::Cookie("k".into()), json!({}), TEMPLATE)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn profile_is_decoded() {
        let payload = json!({"result": {"subsite": {
            "name": "Someone",
            "rating": -12,
            "avatar": {"type": "image", "data": {"uuid": "u1"}},
            "counters": {"entries": 4, "comments": 250}
        }}});

        let profile = parse_profile(payload, TEMPLATE, "https://dtf.ru/u/1").unwrap();
        assert_eq!(profile.name, "Someone");
        assert_eq!(profile.url, "https://dtf.ru/u/1");
        assert_eq!(profile.rating, -12);
        assert_eq!(profile.avatar_url.as_deref(), Some("https://cdn.test/u1/"));
        assert_eq!(profile.comments, 250);
        assert_eq!(profile.entries, 4);
    }

    #[test]
    fn profile_with_null_fields_is_decoded() {
        let payload = json!({"result": {"subsite": {
            "name": null,
            "rating": null,
            "counters": {"entries": null, "comments": 7}
        }}});

        let profile = parse_profile(payload, TEMPLATE, "https://vc.ru/u/2").unwrap();
        assert_eq!(profile.name, "");
        assert_eq!(profile.rating, 0);
        assert_eq!(profile.entries, 0);
        assert_eq!(profile.comments, 7);
    }
}
