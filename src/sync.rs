//! The scheduled sync pass: fetch recent remote posts, skip the ones already
//! republished, create the rest as local link-format posts.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, ContentStore, NewPost, Pool, Settings, SqliteStore};
use crate::model::{Frequency, PostFormat, SyncOutcome};
use crate::wpcom::model::{ClientCredentials, RemotePost, RemoteTag};
use crate::wpcom::WpcomApi;

/// Metadata key recording the URL a cross-post originated from.
pub const ORIGINAL_URL_META: &str = "original_url";

/// Extension points for a sync run. Every hook is pass-through by default.
pub struct SyncHooks {
    /// Maps the configured cross-post author email before lookup.
    pub author_email: Box<dyn Fn(String) -> String + Send + Sync>,
    /// Mutates the assembled post payload before creation.
    pub post_payload: Box<dyn Fn(NewPost, &RemotePost, &Settings) -> NewPost + Send + Sync>,
    /// Maps the computed watermark before it is sent to the fetcher.
    pub watermark: Box<dyn Fn(NaiveDate) -> NaiveDate + Send + Sync>,
    /// Maps the configured schedule frequency at registration time.
    pub frequency: Box<dyn Fn(Frequency) -> Frequency + Send + Sync>,
}

impl Default for SyncHooks {
    fn default() -> Self {
        Self {
            author_email: Box::new(|email| email),
            post_payload: Box::new(|payload, _, _| payload),
            watermark: Box::new(|since| since),
            frequency: Box::new(|freq| freq),
        }
    }
}

/// Start of the previous calendar day, UTC. Recomputed on every run rather
/// than persisted, so runs missed for longer than a day will not look
/// further back than this.
pub fn default_watermark(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

/// Run the token exchange if a code is stored but no token yet. Returns
/// whether the installation is connected afterwards. A failed exchange is
/// not retried here; the code stays stored and the next run re-evaluates.
#[instrument(skip_all)]
pub async fn maybe_exchange(pool: &Pool, api: &dyn WpcomApi) -> Result<bool> {
    let settings = db::load_settings(pool).await?;
    if !settings.needs_exchange() {
        return Ok(settings.is_connected());
    }
    let creds = ClientCredentials {
        client_id: settings.client_id.clone(),
        client_secret: settings.client_secret.clone(),
        code: settings.auth_code.clone(),
    };
    match api.exchange_token(&creds).await {
        Some(grant) => {
            db::store_grant(pool, &grant.access_token, &grant.blog_id).await?;
            info!(blog_id = %grant.blog_id, "token exchange succeeded");
            Ok(true)
        }
        None => {
            warn!("token exchange failed; will retry on a later run");
            Ok(false)
        }
    }
}

/// One sync pass under the run-in-progress lock. A live lock from another
/// run skips this one.
#[instrument(skip_all)]
pub async fn run_locked(
    pool: &Pool,
    api: &dyn WpcomApi,
    cfg: &Config,
    hooks: &SyncHooks,
) -> Result<SyncOutcome> {
    let owner = Uuid::new_v4().to_string();
    let stale = cfg.app.sync_lock_stale_secs as i64;
    if !db::try_acquire_sync_lock(pool, &owner, Utc::now(), stale).await? {
        info!("another sync run holds the lock; skipping");
        return Ok(SyncOutcome::NothingToSync);
    }

    let settings = db::load_settings(pool).await?;
    let store = SqliteStore::new(pool.clone());
    let outcome = run_sync(&store, api, &settings, cfg, hooks).await;

    if let Err(err) = db::release_sync_lock(pool, &owner).await {
        warn!(?err, "failed to release sync lock");
    }
    outcome
}

/// The sync pass itself: fetch → dedupe → create, strictly in order.
///
/// The batch loop stops at the first post it actually creates; duplicates
/// are skipped and the loop moves on. With `sync.process_full_batch` set,
/// every non-duplicate in the batch is created and the first created id is
/// returned.
#[instrument(skip_all)]
pub async fn run_sync(
    store: &dyn ContentStore,
    api: &dyn WpcomApi,
    settings: &Settings,
    cfg: &Config,
    hooks: &SyncHooks,
) -> Result<SyncOutcome> {
    if !settings.is_connected() {
        info!("not connected to a remote blog; skipping sync run");
        return Ok(SyncOutcome::NothingToSync);
    }

    let since = (hooks.watermark)(default_watermark(Utc::now()));
    let posts = match api
        .fetch_posts(&settings.blog_id, &settings.access_token, since)
        .await
    {
        Some(posts) => posts,
        None => {
            warn!("fetch failed; nothing to sync this run");
            return Ok(SyncOutcome::NothingToSync);
        }
    };
    if posts.is_empty() {
        info!(%since, "no remote posts since watermark");
        return Ok(SyncOutcome::NothingToSync);
    }

    let author_email = (hooks.author_email)(cfg.sync.author_email.clone());
    let mut first_created: Option<i64> = None;

    for post in &posts {
        let author_id = match store.find_user_by_email(&author_email).await? {
            Some(user) => user.id,
            None => {
                warn!(email = %author_email, "cross-post author not found; using anonymous author");
                0
            }
        };

        let payload = build_post_payload(post, settings, author_id);
        let payload = (hooks.post_payload)(payload, post, settings);

        // Duplicate key is the raw remote title plus the exact remote publish
        // date; the slug takes no part in the check, and the hooked payload
        // does not influence it.
        if store
            .post_exists(&post.title, post.date.with_timezone(&Utc))
            .await?
        {
            info!(title = %post.title, "already cross-posted; skipping");
            continue;
        }

        let post_id = store.create_post(&payload).await?;
        store.set_post_format(post_id, PostFormat::Link).await?;
        info!(post_id, title = %post.title, "created cross-post");

        if !cfg.sync.process_full_batch {
            return Ok(SyncOutcome::Created { post_id });
        }
        if first_created.is_none() {
            first_created = Some(post_id);
        }
    }

    Ok(match first_created {
        Some(post_id) => SyncOutcome::Created { post_id },
        None => SyncOutcome::NothingToSync,
    })
}

/// Assemble the local post payload from a remote post and the stored sync
/// settings.
pub fn build_post_payload(post: &RemotePost, settings: &Settings, author_id: i64) -> NewPost {
    NewPost {
        title: html_escape(&post.title),
        slug: sanitize_slug(&post.slug),
        content: post.excerpt.clone(),
        publish_date: post.date.with_timezone(&Utc),
        status: "publish".into(),
        comment_status: settings.comment_status().into(),
        author_id,
        category_id: settings.category_id,
        tags: extract_tags(&post.tags),
        meta: vec![(ORIGINAL_URL_META.into(), post.url.clone())],
    }
}

/// Remote tag display names, escaped, as a flat list. An empty input is a
/// valid empty list.
fn extract_tags(tags: &[RemoteTag]) -> Vec<String> {
    tags.iter().map(|tag| html_escape(&tag.name)).collect()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Slug form of a remote post name: lowercase alphanumeric runs joined by
/// single dashes.
fn sanitize_slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_settings() -> Settings {
        Settings {
            client_id: "4242".into(),
            client_secret: "secret".into(),
            auth_code: "code".into(),
            access_token: "token".into(),
            blog_id: "77".into(),
            category_id: 3,
            close_comments: "yes".into(),
        }
    }

    fn sample_post() -> RemotePost {
        serde_json::from_value(serde_json::json!({
            "title": "Ampersands & <Angles>",
            "slug": "Ampersands -- & Angles!",
            "URL": "https://a.example/p",
            "date": "2016-08-01T10:00:00+00:00",
            "excerpt": "<p>Short.</p>",
            "tags": [ { "name": "a&b" } ]
        }))
        .unwrap()
    }

    #[test]
    fn payload_escapes_title_and_tags() {
        let payload = build_post_payload(&sample_post(), &sample_settings(), 5);
        assert_eq!(payload.title, "Ampersands &amp; &lt;Angles&gt;");
        assert_eq!(payload.tags, vec!["a&amp;b".to_string()]);
        assert_eq!(payload.author_id, 5);
        assert_eq!(payload.category_id, 3);
        assert_eq!(payload.comment_status, "closed");
        assert_eq!(
            payload.meta,
            vec![(ORIGINAL_URL_META.to_string(), "https://a.example/p".to_string())]
        );
    }

    #[test]
    fn payload_keeps_empty_tag_list() {
        let mut post = sample_post();
        post.tags.clear();
        let payload = build_post_payload(&post, &sample_settings(), 0);
        assert!(payload.tags.is_empty());
    }

    #[test]
    fn open_comments_when_not_closing() {
        let mut settings = sample_settings();
        settings.close_comments = "no".into();
        let payload = build_post_payload(&sample_post(), &settings, 0);
        assert_eq!(payload.comment_status, "open");
    }

    #[test]
    fn slug_is_sanitized() {
        assert_eq!(sanitize_slug("Ampersands -- & Angles!"), "ampersands-angles");
        assert_eq!(sanitize_slug("hello-world"), "hello-world");
        assert_eq!(sanitize_slug("  "), "");
    }

    #[test]
    fn watermark_is_yesterday() {
        let now = Utc.with_ymd_and_hms(2016, 8, 2, 13, 30, 0).unwrap();
        assert_eq!(
            default_watermark(now),
            NaiveDate::from_ymd_opt(2016, 8, 1).unwrap()
        );
    }

    #[test]
    fn default_hooks_pass_through() {
        let hooks = SyncHooks::default();
        assert_eq!((hooks.author_email)("a@b.c".into()), "a@b.c");
        assert_eq!((hooks.frequency)(Frequency::Daily), Frequency::Daily);
        let since = NaiveDate::from_ymd_opt(2016, 8, 1).unwrap();
        assert_eq!((hooks.watermark)(since), since);
    }
}
