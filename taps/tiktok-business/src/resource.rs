//! The three extractable resource types and their request/response policies.
//!
//! Each [`Resource`] knows how to build the JSON payload for one page, where its records sit
//! in the response envelope, how it signals that more pages exist, and which context (if any)
//! each of its records seeds for the child resource.

use crate::context::{Context, Record, VIDEO_ID};
use serde_json::Value;

/// Opaque continuation token; compared for equality to detect pagination loops.
pub type Cursor = Value;

const ACCOUNT_FIELDS: &[&str] = &[
    "username",
    "display_name",
    "profile_image",
    "audience_countries",
    "audience_genders",
    "likes",
    "comments",
    "shares",
    "followers_count",
    "profile_views",
    "video_views",
    "audience_activity",
];

const VIDEO_FIELDS: &[&str] = &[
    "item_id",
    "create_time",
    "thumbnail_url",
    "share_url",
    "embed_url",
    "caption",
    "video_views",
    "likes",
    "comments",
    "shares",
    "reach",
    "video_duration",
    "full_video_watched_rate",
    "total_time_watched",
    "average_time_watched",
    "impression_sources",
    "audience_countries",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Business account profile and audience data; one single-page request per business id.
    Accounts,
    /// Videos published by a business account.
    Videos,
    /// Comments on one video.
    Comments,
}

impl Resource {
    /// All resource types, parents before children.
    pub const ALL: [Resource; 3] = [Resource::Accounts, Resource::Videos, Resource::Comments];

    /// Logical stream name records are emitted under.
    pub fn name(self) -> &'static str {
        match self {
            Resource::Accounts => "accounts",
            Resource::Videos => "videos",
            Resource::Comments => "comments",
        }
    }

    /// Endpoint path below the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            Resource::Accounts => "/get/",
            Resource::Videos => "/videos/list/",
            Resource::Comments => "/comments/list/",
        }
    }

    pub fn method(self) -> http::Method {
        http::Method::POST
    }

    pub fn parent(self) -> Option<Resource> {
        match self {
            Resource::Accounts => None,
            Resource::Videos => Some(Resource::Accounts),
            Resource::Comments => Some(Resource::Videos),
        }
    }

    /// Resource types whose contexts are derived from this one's records.
    pub fn children(self) -> impl Iterator<Item = Resource> {
        Self::ALL
            .into_iter()
            .filter(move |r| r.parent() == Some(self))
    }

    pub fn replication_key(self) -> Option<&'static str> {
        match self {
            Resource::Accounts => None,
            Resource::Videos | Resource::Comments => Some("create_time"),
        }
    }

    /// The static field list requested from the API, if the endpoint takes one.
    pub fn fields(self) -> Option<&'static [&'static str]> {
        match self {
            Resource::Accounts => Some(ACCOUNT_FIELDS),
            Resource::Videos => Some(VIDEO_FIELDS),
            Resource::Comments => None,
        }
    }

    /// URL query parameters sent with every page request.
    pub fn query_params(self) -> Vec<(&'static str, &'static str)> {
        match self.replication_key() {
            Some(key) => vec![("sort", "asc"), ("order_by", key)],
            None => Vec::new(),
        }
    }

    /// Builds the JSON body for one page request.
    ///
    /// Every partition key of the context goes into the body (`business_id`, plus `video_id`
    /// for comments), followed by the field list and the cursor when there is one.
    pub fn payload(self, context: &Context, cursor: Option<&Cursor>) -> Value {
        let mut body = serde_json::Map::new();
        for (key, value) in context.iter() {
            body.insert(key.to_string(), Value::String(value.to_string()));
        }
        if let Some(fields) = self.fields() {
            body.insert(
                "fields".to_string(),
                Value::Array(fields.iter().map(|f| Value::from(*f)).collect()),
            );
        }
        if let Some(cursor) = cursor {
            body.insert("cursor".to_string(), cursor.clone());
        }
        Value::Object(body)
    }

    /// Pulls this resource's records out of a response and annotates them with the context.
    ///
    /// Returns `None` when the envelope lacks the expected record list. The caller treats that
    /// as an empty page: the API answers legitimately empty results that way too.
    pub fn extract_records(self, response: &Value, context: &Context) -> Option<Vec<Record>> {
        let data = response.get("data")?;
        let rows: Vec<Record> = match self {
            Resource::Accounts => match data {
                Value::Array(rows) => rows.iter().filter_map(as_record).collect(),
                Value::Object(row) if !row.is_empty() => vec![row.clone()],
                _ => return None,
            },
            Resource::Videos => data
                .get("videos")?
                .as_array()?
                .iter()
                .filter_map(as_record)
                .collect(),
            Resource::Comments => data
                .get("comments")?
                .as_array()?
                .iter()
                .filter_map(as_record)
                .collect(),
        };
        Some(
            rows.into_iter()
                .map(|mut row| {
                    context.annotate(&mut row);
                    row
                })
                .collect(),
        )
    }

    /// Cursor for the next page, or `None` when the sequence is complete.
    ///
    /// Accounts never paginate. Videos and comments only trust `data.cursor` when
    /// `data.has_more` is `true`.
    pub fn next_cursor(self, response: &Value) -> Option<Cursor> {
        match self {
            Resource::Accounts => None,
            Resource::Videos | Resource::Comments => {
                let data = response.get("data")?;
                if data.get("has_more").and_then(Value::as_bool) != Some(true) {
                    return None;
                }
                data.get("cursor").filter(|c| !c.is_null()).cloned()
            }
        }
    }

    /// Context seeded for the child resource by one of this resource's records.
    ///
    /// Returns `None` for resources without children, and for records too malformed to derive
    /// a context from; such records are still emitted.
    pub fn child_context(self, record: &Record, context: &Context) -> Option<Context> {
        match self {
            Resource::Accounts => {
                let Some(business_id) = context.business_id() else {
                    tracing::warn!(stream = self.name(), %context, "context has no business_id");
                    return None;
                };
                Some(Context::for_business(business_id))
            }
            Resource::Videos => match record.get("item_id") {
                Some(Value::String(id)) if !id.is_empty() => {
                    Some(context.with(VIDEO_ID, id.as_str()))
                }
                Some(Value::Number(id)) => Some(context.with(VIDEO_ID, id.to_string())),
                other => {
                    tracing::warn!(
                        stream = self.name(),
                        %context,
                        item_id = ?other,
                        "video record has no usable item_id, not fetching its comments"
                    );
                    None
                }
            },
            Resource::Comments => None,
        }
    }

    /// Root contexts for a resource without a parent: one per configured business id.
    pub fn partitions(self, business_ids: &[String]) -> Vec<Context> {
        match self.parent() {
            None => business_ids.iter().map(Context::for_business).collect(),
            Some(_) => Vec::new(),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn as_record(value: &Value) -> Option<Record> {
    match value {
        Value::Object(row) => Some(row.clone()),
        other => {
            tracing::debug!(value = %other, "skipping non-object row");
            None
        }
    }
}
