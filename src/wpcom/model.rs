use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Client credentials for the authorization-code exchange, as stored in the
/// settings record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
}

/// Successful token-exchange response body.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// The endpoint serves this as a JSON string; some deployments send a
    /// bare number.
    #[serde(deserialize_with = "string_or_number")]
    pub blog_id: String,
}

/// Envelope of the posts listing endpoint. A body without a `posts` key is
/// treated as a failed fetch by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct PostsResponse {
    pub posts: Vec<RemotePost>,
}

/// One published remote post, projected down to the fields the sync engine
/// consumes. Ordered ascending by `date` in fetch results.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemotePost {
    pub title: String,
    pub slug: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub date: DateTime<FixedOffset>,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default, deserialize_with = "tags_list_or_map")]
    pub tags: Vec<RemoteTag>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteTag {
    pub name: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Text(String),
        Number(u64),
    }
    Ok(match Wire::deserialize(deserializer)? {
        Wire::Text(s) => s,
        Wire::Number(n) => n.to_string(),
    })
}

/// The posts endpoint serves `tags` as an object keyed by tag name; flatten
/// it to a list, accepting the plain-array form as well.
fn tags_list_or_map<'de, D>(deserializer: D) -> Result<Vec<RemoteTag>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        List(Vec<RemoteTag>),
        Map(BTreeMap<String, RemoteTag>),
    }
    Ok(match Wire::deserialize(deserializer)? {
        Wire::List(tags) => tags,
        Wire::Map(tags) => tags.into_values().collect(),
    })
}
