use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single-row connection/settings record. Created empty; the access
/// token and blog id are only meaningful once an authorization code has
/// been stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_code: String,
    pub access_token: String,
    pub blog_id: String,
    pub category_id: i64,
    /// "yes" or "no"; anything else is normalized to "no" on write.
    pub close_comments: String,
}

impl Settings {
    pub fn is_connected(&self) -> bool {
        !self.auth_code.is_empty() && !self.access_token.is_empty()
    }

    /// A stored code without a token means the exchange is still pending.
    pub fn needs_exchange(&self) -> bool {
        !self.auth_code.is_empty() && self.access_token.is_empty()
    }

    pub fn comment_status(&self) -> &'static str {
        if self.close_comments == "yes" {
            "closed"
        } else {
            "open"
        }
    }
}

/// Payload for creating a local post. Built by the sync engine and passed
/// through the post-payload hook before creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub publish_date: DateTime<Utc>,
    pub status: String,
    pub comment_status: String,
    pub author_id: i64,
    pub category_id: i64,
    pub tags: Vec<String>,
    pub meta: Vec<(String, String)>,
}

/// A stored local post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalPost {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub publish_date: DateTime<Utc>,
    pub status: String,
    pub comment_status: String,
    pub author_id: i64,
    pub category_id: i64,
    pub format: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
}

/// A registered recurring job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job_name: String,
    pub interval_secs: i64,
    pub next_run_at: DateTime<Utc>,
}
