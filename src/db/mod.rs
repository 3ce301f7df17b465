//! Database module: entity models, SQL repositories, and the content-store
//! seam the sync engine writes through.
//!
//! - `model`: typed domain entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `crosspostd::db`; the repository API
//! and commonly used models are re-exported here.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::PostFormat;

pub mod model;
pub mod repo;

pub use model::{LocalPost, NewPost, ScheduledJob, Settings, User};
pub use repo::*;

/// The content sink the sync engine creates posts in. The engine never
/// touches SQL directly; tests substitute their own store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Duplicate check on the exact (title, publish date) pair.
    async fn post_exists(&self, title: &str, publish_date: DateTime<Utc>) -> Result<bool>;

    async fn create_post(&self, post: &NewPost) -> Result<i64>;

    async fn set_post_format(&self, post_id: i64, format: PostFormat) -> Result<()>;

    async fn attach_metadata(&self, post_id: i64, key: &str, value: &str) -> Result<()>;

    async fn post_metadata(&self, post_id: i64, key: &str) -> Result<Option<String>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// The sqlite-backed content store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn post_exists(&self, title: &str, publish_date: DateTime<Utc>) -> Result<bool> {
        repo::post_exists(&self.pool, title, publish_date).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<i64> {
        repo::insert_post(&self.pool, post).await
    }

    async fn set_post_format(&self, post_id: i64, format: PostFormat) -> Result<()> {
        repo::set_post_format(&self.pool, post_id, format.as_str()).await
    }

    async fn attach_metadata(&self, post_id: i64, key: &str, value: &str) -> Result<()> {
        repo::attach_post_meta(&self.pool, post_id, key, value).await
    }

    async fn post_metadata(&self, post_id: i64, key: &str) -> Result<Option<String>> {
        repo::post_meta(&self.pool, post_id, key).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        repo::find_user_by_email(&self.pool, email).await
    }
}
