use super::model::{LocalPost, NewPost, ScheduledJob, Settings, User};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let pool = SqlitePool::connect(database_url).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---- settings record ----

/// Load the settings record, creating the empty row on first access.
#[instrument(skip_all)]
pub async fn load_settings(pool: &Pool) -> Result<Settings> {
    sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (1)")
        .execute(pool)
        .await?;
    let row = sqlx::query(
        "SELECT client_id, client_secret, auth_code, access_token, blog_id, category_id, close_comments \
         FROM settings WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;
    Ok(Settings {
        client_id: row.get("client_id"),
        client_secret: row.get("client_secret"),
        auth_code: row.get("auth_code"),
        access_token: row.get("access_token"),
        blog_id: row.get("blog_id"),
        category_id: row.get("category_id"),
        close_comments: row.get("close_comments"),
    })
}

/// Whole-record write; last writer wins. The comment flag is normalized the
/// way the settings surface did it: anything but an explicit "yes" is "no".
#[instrument(skip_all)]
pub async fn save_settings(pool: &Pool, settings: &Settings) -> Result<()> {
    let close_comments = if settings.close_comments == "yes" {
        "yes"
    } else {
        "no"
    };
    sqlx::query(
        "INSERT INTO settings (id, client_id, client_secret, auth_code, access_token, blog_id, category_id, close_comments) \
         VALUES (1, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (id) DO UPDATE SET \
           client_id = excluded.client_id, \
           client_secret = excluded.client_secret, \
           auth_code = excluded.auth_code, \
           access_token = excluded.access_token, \
           blog_id = excluded.blog_id, \
           category_id = excluded.category_id, \
           close_comments = excluded.close_comments",
    )
    .bind(&settings.client_id)
    .bind(&settings.client_secret)
    .bind(&settings.auth_code)
    .bind(&settings.access_token)
    .bind(&settings.blog_id)
    .bind(settings.category_id)
    .bind(close_comments)
    .execute(pool)
    .await?;
    Ok(())
}

/// Store client credentials and a freshly received authorization code.
#[instrument(skip_all)]
pub async fn store_client(
    pool: &Pool,
    client_id: &str,
    client_secret: &str,
    code: &str,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (1)")
        .execute(pool)
        .await?;
    sqlx::query(
        "UPDATE settings SET client_id = ?, client_secret = ?, auth_code = ? WHERE id = 1",
    )
    .bind(client_id)
    .bind(client_secret)
    .bind(code)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a successful token exchange in one write.
#[instrument(skip_all)]
pub async fn store_grant(pool: &Pool, access_token: &str, blog_id: &str) -> Result<()> {
    sqlx::query("UPDATE settings SET access_token = ?, blog_id = ? WHERE id = 1")
        .bind(access_token)
        .bind(blog_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Clear the connection fields together in a single update. Category and
/// comment settings are left as they are.
#[instrument(skip_all)]
pub async fn disconnect(pool: &Pool) -> Result<()> {
    sqlx::query(
        "UPDATE settings SET auth_code = '', access_token = '', blog_id = '' WHERE id = 1",
    )
    .execute(pool)
    .await?;
    Ok(())
}

// ---- posts and metadata ----

#[instrument(skip_all)]
pub async fn post_exists(pool: &Pool, title: &str, publish_date: DateTime<Utc>) -> Result<bool> {
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM posts WHERE title = ? AND publish_date = ? LIMIT 1",
    )
    .bind(title)
    .bind(publish_date)
    .fetch_optional(pool)
    .await?;
    Ok(id.is_some())
}

#[instrument(skip_all)]
pub async fn insert_post(pool: &Pool, post: &NewPost) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let rec = sqlx::query(
        "INSERT INTO posts (title, slug, content, publish_date, status, comment_status, author_id, category_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&post.title)
    .bind(&post.slug)
    .bind(&post.content)
    .bind(post.publish_date)
    .bind(&post.status)
    .bind(&post.comment_status)
    .bind(post.author_id)
    .bind(post.category_id)
    .fetch_one(&mut *tx)
    .await?;
    let post_id = rec.get::<i64, _>("id");

    for tag in &post.tags {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
    }
    for (key, value) in &post.meta {
        sqlx::query(
            "INSERT OR REPLACE INTO post_meta (post_id, meta_key, meta_value) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(post_id)
}

#[instrument(skip_all)]
pub async fn set_post_format(pool: &Pool, post_id: i64, format: &str) -> Result<()> {
    sqlx::query("UPDATE posts SET format = ? WHERE id = ?")
        .bind(format)
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn attach_post_meta(pool: &Pool, post_id: i64, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO post_meta (post_id, meta_key, meta_value) VALUES (?, ?, ?)",
    )
    .bind(post_id)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn post_meta(pool: &Pool, post_id: i64, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT meta_value FROM post_meta WHERE post_id = ? AND meta_key = ?",
    )
    .bind(post_id)
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(value)
}

#[instrument(skip_all)]
pub async fn get_post(pool: &Pool, post_id: i64) -> Result<Option<LocalPost>> {
    let row = sqlx::query(
        "SELECT id, title, slug, content, publish_date, status, comment_status, author_id, category_id, format, created_at \
         FROM posts WHERE id = ?",
    )
    .bind(post_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| LocalPost {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        publish_date: row.get("publish_date"),
        status: row.get("status"),
        comment_status: row.get("comment_status"),
        author_id: row.get("author_id"),
        category_id: row.get("category_id"),
        format: row.get("format"),
        created_at: row.get("created_at"),
    }))
}

#[instrument(skip_all)]
pub async fn post_tags(pool: &Pool, post_id: i64) -> Result<Vec<String>> {
    let tags = sqlx::query_scalar::<_, String>(
        "SELECT tag FROM post_tags WHERE post_id = ? ORDER BY tag",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(tags)
}

// ---- users ----

#[instrument(skip_all)]
pub async fn find_user_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, email, display_name FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| User {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
    }))
}

#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, email: &str, display_name: Option<&str>) -> Result<i64> {
    let rec = sqlx::query("INSERT INTO users (email, display_name) VALUES (?, ?) RETURNING id")
        .bind(email)
        .bind(display_name)
        .fetch_one(pool)
        .await?;
    Ok(rec.get::<i64, _>("id"))
}

// ---- recurring schedule ----

/// Register a named recurring job unless one already exists. Returns true
/// when a new row was inserted.
#[instrument(skip_all)]
pub async fn register_job(
    pool: &Pool,
    job_name: &str,
    interval_secs: i64,
    first_run_at: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT OR IGNORE INTO schedule (job_name, interval_secs, next_run_at) VALUES (?, ?, ?)",
    )
    .bind(job_name)
    .bind(interval_secs)
    .bind(first_run_at)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn get_job(pool: &Pool, job_name: &str) -> Result<Option<ScheduledJob>> {
    let row = sqlx::query(
        "SELECT job_name, interval_secs, next_run_at FROM schedule WHERE job_name = ?",
    )
    .bind(job_name)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| ScheduledJob {
        job_name: row.get("job_name"),
        interval_secs: row.get("interval_secs"),
        next_run_at: row.get("next_run_at"),
    }))
}

#[instrument(skip_all)]
pub async fn cancel_job(pool: &Pool, job_name: &str) -> Result<()> {
    sqlx::query("DELETE FROM schedule WHERE job_name = ?")
        .bind(job_name)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn next_due_job(pool: &Pool, now: DateTime<Utc>) -> Result<Option<ScheduledJob>> {
    let row = sqlx::query(
        "SELECT job_name, interval_secs, next_run_at FROM schedule \
         WHERE next_run_at <= ? ORDER BY next_run_at LIMIT 1",
    )
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| ScheduledJob {
        job_name: row.get("job_name"),
        interval_secs: row.get("interval_secs"),
        next_run_at: row.get("next_run_at"),
    }))
}

/// Advance a job's next firing to `now + interval`. The next fire is
/// measured from completion time, not the planned slot.
#[instrument(skip_all)]
pub async fn advance_job(pool: &Pool, job_name: &str, now: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;
    let interval = sqlx::query_scalar::<_, i64>(
        "SELECT interval_secs FROM schedule WHERE job_name = ?",
    )
    .bind(job_name)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(interval) = interval {
        sqlx::query("UPDATE schedule SET next_run_at = ? WHERE job_name = ?")
            .bind(now + Duration::seconds(interval))
            .bind(job_name)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Cancel the named job and delete the settings record as one operation.
#[instrument(skip_all)]
pub async fn uninstall(pool: &Pool, job_name: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM schedule WHERE job_name = ?")
        .bind(job_name)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM settings").execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

// ---- sync run lock ----

/// Take the run-in-progress lock. A held lock younger than `stale_secs`
/// blocks the caller; an older one is taken over.
#[instrument(skip_all)]
pub async fn try_acquire_sync_lock(
    pool: &Pool,
    owner: &str,
    now: DateTime<Utc>,
    stale_secs: i64,
) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let held = sqlx::query("SELECT owner, acquired_at FROM sync_lock WHERE id = 1")
        .fetch_optional(&mut *tx)
        .await?;
    match held {
        Some(row) => {
            let acquired_at: DateTime<Utc> = row.get("acquired_at");
            if now - acquired_at < Duration::seconds(stale_secs) {
                return Ok(false);
            }
            sqlx::query("UPDATE sync_lock SET owner = ?, acquired_at = ? WHERE id = 1")
                .bind(owner)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query("INSERT INTO sync_lock (id, owner, acquired_at) VALUES (1, ?, ?)")
                .bind(owner)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
    }
    tx.commit().await?;
    Ok(true)
}

/// Release the lock if still held by `owner`. A stolen lock is left alone.
#[instrument(skip_all)]
pub async fn release_sync_lock(pool: &Pool, owner: &str) -> Result<()> {
    sqlx::query("DELETE FROM sync_lock WHERE id = 1 AND owner = ?")
        .bind(owner)
        .execute(pool)
        .await?;
    Ok(())
}
