use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Mutex;

use crosspostd::canonical;
use crosspostd::config::{self, Config};
use crosspostd::db::{self, Settings, SqliteStore};
use crosspostd::model::SyncOutcome;
use crosspostd::sync::{self, SyncHooks, ORIGINAL_URL_META};
use crosspostd::wpcom::model::{ClientCredentials, RemotePost, RemoteTag, TokenGrant};
use crosspostd::wpcom::WpcomApi;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn test_config() -> Config {
    serde_yaml::from_str(config::example()).unwrap()
}

fn connected_settings() -> Settings {
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

fn remote_post(title: &str, date: &str, url: &str) -> RemotePost {
    RemotePost {
        title: title.into(),
        slug: title.to_lowercase().replace(' ', "-"),
        url: url.into(),
        date: DateTime::parse_from_rfc3339(date).unwrap(),
        excerpt: format!("<p>{}</p>", title),
        tags: vec![RemoteTag { name: "rust".into() }],
    }
}

fn three_post_batch() -> Vec<RemotePost> {
    vec![
        remote_post("First Post", "2016-08-01T08:00:00+00:00", "https://a.example/first"),
        remote_post("Second Post", "2016-08-01T09:00:00+00:00", "https://a.example/second"),
        remote_post("Third Post", "2016-08-01T10:00:00+00:00", "https://a.example/third"),
    ]
}

/// Remote API double: canned fetch batches, recorded calls.
#[derive(Default)]
struct FakeApi {
    batch: Mutex<Option<Vec<RemotePost>>>,
    grant: Option<TokenGrant>,
    fetch_calls: Mutex<Vec<(String, String, NaiveDate)>>,
    exchange_calls: Mutex<Vec<ClientCredentials>>,
}

impl FakeApi {
    fn with_batch(batch: Vec<RemotePost>) -> Self {
        Self {
            batch: Mutex::new(Some(batch)),
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self::default()
    }

    fn fetch_calls(&self) -> Vec<(String, String, NaiveDate)> {
        self.fetch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WpcomApi for FakeApi {
    async fn exchange_token(&self, creds: &ClientCredentials) -> Option<TokenGrant> {
        self.exchange_calls.lock().unwrap().push(creds.clone());
        self.grant.clone()
    }

    async fn fetch_posts(
        &self,
        blog_id: &str,
        token: &str,
        since: NaiveDate,
    ) -> Option<Vec<RemotePost>> {
        self.fetch_calls
            .lock()
            .unwrap()
            .push((blog_id.to_string(), token.to_string(), since));
        self.batch.lock().unwrap().clone()
    }
}

async fn post_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn three_post_batch_creates_only_the_first() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let api = FakeApi::with_batch(three_post_batch());
    let store = SqliteStore::new(pool.clone());

    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &SyncHooks::default())
        .await
        .unwrap();

    let post_id = match outcome {
        SyncOutcome::Created { post_id } => post_id,
        other => panic!("expected creation, got {:?}", other),
    };
    assert_eq!(post_count(&pool).await, 1);
    let created = db::get_post(&pool, post_id).await.unwrap().unwrap();
    assert_eq!(created.title, "First Post");
    assert_eq!(created.format, "link");
    assert_eq!(created.status, "publish");
    assert_eq!(created.comment_status, "closed");
    assert_eq!(created.category_id, 3);
}

#[tokio::test]
async fn second_run_skips_duplicate_and_creates_next() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let api = FakeApi::with_batch(three_post_batch());
    let store = SqliteStore::new(pool.clone());
    let hooks = SyncHooks::default();

    sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();

    // The first post is detected as a duplicate and skipped; the run moves
    // on and creates the second post, then stops.
    let post_id = match outcome {
        SyncOutcome::Created { post_id } => post_id,
        other => panic!("expected creation, got {:?}", other),
    };
    let created = db::get_post(&pool, post_id).await.unwrap().unwrap();
    assert_eq!(created.title, "Second Post");
    assert_eq!(post_count(&pool).await, 2);
}

#[tokio::test]
async fn single_post_batch_is_idempotent() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let api = FakeApi::with_batch(vec![remote_post(
        "Only Post",
        "2016-08-01T08:00:00+00:00",
        "https://a.example/only",
    )]);
    let store = SqliteStore::new(pool.clone());
    let hooks = SyncHooks::default();

    let first = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    assert!(matches!(first, SyncOutcome::Created { .. }));

    let second = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    assert_eq!(second, SyncOutcome::NothingToSync);
    assert_eq!(post_count(&pool).await, 1);
}

#[tokio::test]
async fn full_batch_policy_creates_every_new_post() {
    let pool = setup_pool().await;
    let mut cfg = test_config();
    cfg.sync.process_full_batch = true;
    let settings = connected_settings();
    let api = FakeApi::with_batch(three_post_batch());
    let store = SqliteStore::new(pool.clone());

    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &SyncHooks::default())
        .await
        .unwrap();

    let post_id = match outcome {
        SyncOutcome::Created { post_id } => post_id,
        other => panic!("expected creation, got {:?}", other),
    };
    // Returns the first created id while processing the whole batch.
    let created = db::get_post(&pool, post_id).await.unwrap().unwrap();
    assert_eq!(created.title, "First Post");
    assert_eq!(post_count(&pool).await, 3);
}

#[tokio::test]
async fn fetch_failure_degrades_to_nothing() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let api = FakeApi::failing();
    let store = SqliteStore::new(pool.clone());

    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &SyncHooks::default())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::NothingToSync);
    assert_eq!(post_count(&pool).await, 0);
}

#[tokio::test]
async fn disconnected_settings_skip_fetch_entirely() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = Settings {
        auth_code: "".into(),
        access_token: "".into(),
        ..connected_settings()
    };
    let api = FakeApi::with_batch(three_post_batch());
    let store = SqliteStore::new(pool.clone());

    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &SyncHooks::default())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::NothingToSync);
    assert!(api.fetch_calls().is_empty());
}

#[tokio::test]
async fn author_resolution_and_fallback() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let store = SqliteStore::new(pool.clone());
    let hooks = SyncHooks::default();

    // No matching user: anonymous author.
    let api = FakeApi::with_batch(vec![remote_post(
        "Fallback Post",
        "2016-08-01T08:00:00+00:00",
        "https://a.example/f",
    )]);
    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    let SyncOutcome::Created { post_id } = outcome else {
        panic!("expected creation");
    };
    let created = db::get_post(&pool, post_id).await.unwrap().unwrap();
    assert_eq!(created.author_id, 0);

    // With the configured author present, posts are attributed to them.
    let author_id = db::create_user(&pool, &cfg.sync.author_email, Some("Admin"))
        .await
        .unwrap();
    let api = FakeApi::with_batch(vec![remote_post(
        "Attributed Post",
        "2016-08-01T09:00:00+00:00",
        "https://a.example/g",
    )]);
    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    let SyncOutcome::Created { post_id } = outcome else {
        panic!("expected creation");
    };
    let created = db::get_post(&pool, post_id).await.unwrap().unwrap();
    assert_eq!(created.author_id, author_id);
}

#[tokio::test]
async fn author_email_hook_overrides_config() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let store = SqliteStore::new(pool.clone());
    let editor_id = db::create_user(&pool, "editor@blog.example.org", None)
        .await
        .unwrap();

    let hooks = SyncHooks {
        author_email: Box::new(|_| "editor@blog.example.org".to_string()),
        ..Default::default()
    };
    let api = FakeApi::with_batch(vec![remote_post(
        "Hooked Author",
        "2016-08-01T08:00:00+00:00",
        "https://a.example/h",
    )]);
    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    let SyncOutcome::Created { post_id } = outcome else {
        panic!("expected creation");
    };
    let created = db::get_post(&pool, post_id).await.unwrap().unwrap();
    assert_eq!(created.author_id, editor_id);
}

#[tokio::test]
async fn empty_tag_list_is_preserved() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let store = SqliteStore::new(pool.clone());
    let mut post = remote_post("Untagged", "2016-08-01T08:00:00+00:00", "https://a.example/u");
    post.tags.clear();
    let api = FakeApi::with_batch(vec![post]);

    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &SyncHooks::default())
        .await
        .unwrap();
    let SyncOutcome::Created { post_id } = outcome else {
        panic!("expected creation");
    };
    assert!(db::post_tags(&pool, post_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn canonical_url_round_trip() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let store = SqliteStore::new(pool.clone());
    let api = FakeApi::with_batch(vec![remote_post(
        "Canonical Post",
        "2016-08-01T08:00:00+00:00",
        "https://a.example/p",
    )]);

    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &SyncHooks::default())
        .await
        .unwrap();
    let SyncOutcome::Created { post_id } = outcome else {
        panic!("expected creation");
    };

    assert_eq!(
        db::post_meta(&pool, post_id, ORIGINAL_URL_META)
            .await
            .unwrap()
            .as_deref(),
        Some("https://a.example/p")
    );
    let url = canonical::canonical_for_post(&store, post_id, "https://local.example/whatever")
        .await
        .unwrap();
    assert_eq!(url, "https://a.example/p");

    // A post this system did not create keeps its default.
    let other = canonical::canonical_for_post(&store, post_id + 1000, "https://local.example/x")
        .await
        .unwrap();
    assert_eq!(other, "https://local.example/x");
}

#[tokio::test]
async fn payload_hook_can_inject_metadata() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let store = SqliteStore::new(pool.clone());
    let api = FakeApi::with_batch(vec![remote_post(
        "Hooked Post",
        "2016-08-01T08:00:00+00:00",
        "https://a.example/hp",
    )]);

    let hooks = SyncHooks {
        post_payload: Box::new(|mut payload, _, _| {
            payload.meta.push(("source".into(), "wpcom".into()));
            payload
        }),
        ..Default::default()
    };
    let outcome = sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();
    let SyncOutcome::Created { post_id } = outcome else {
        panic!("expected creation");
    };
    assert_eq!(
        db::post_meta(&pool, post_id, "source").await.unwrap().as_deref(),
        Some("wpcom")
    );
    // The standard metadata is still attached alongside.
    assert!(db::post_meta(&pool, post_id, ORIGINAL_URL_META)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn watermark_hook_controls_fetch_window() {
    let pool = setup_pool().await;
    let cfg = test_config();
    let settings = connected_settings();
    let store = SqliteStore::new(pool.clone());
    let api = FakeApi::with_batch(vec![]);

    let pinned = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let hooks = SyncHooks {
        watermark: Box::new(move |_| pinned),
        ..Default::default()
    };
    sync::run_sync(&store, &api, &settings, &cfg, &hooks)
        .await
        .unwrap();

    let calls = api.fetch_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "77");
    assert_eq!(calls[0].1, "token");
    assert_eq!(calls[0].2, pinned);
}

#[tokio::test]
async fn run_locked_skips_when_lock_is_held() {
    let pool = setup_pool().await;
    let cfg = test_config();
    db::save_settings(&pool, &connected_settings()).await.unwrap();
    let api = FakeApi::with_batch(three_post_batch());

    db::try_acquire_sync_lock(&pool, "other-run", Utc::now(), 3600)
        .await
        .unwrap();
    let outcome = sync::run_locked(&pool, &api, &cfg, &SyncHooks::default())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::NothingToSync);
    assert!(api.fetch_calls().is_empty());
}

#[tokio::test]
async fn run_locked_releases_the_lock() {
    let pool = setup_pool().await;
    let cfg = test_config();
    db::save_settings(&pool, &connected_settings()).await.unwrap();
    let api = FakeApi::with_batch(three_post_batch());
    let hooks = SyncHooks::default();

    let first = sync::run_locked(&pool, &api, &cfg, &hooks).await.unwrap();
    assert!(matches!(first, SyncOutcome::Created { .. }));

    // Lock is free again; the next run proceeds to the second post.
    let second = sync::run_locked(&pool, &api, &cfg, &hooks).await.unwrap();
    assert!(matches!(second, SyncOutcome::Created { .. }));
}

#[tokio::test]
async fn maybe_exchange_persists_grant_once() {
    let pool = setup_pool().await;
    db::store_client(&pool, "4242", "secret", "the-code")
        .await
        .unwrap();

    let api = FakeApi {
        grant: Some(TokenGrant {
            access_token: "fresh-token".into(),
            blog_id: "90210".into(),
        }),
        ..Default::default()
    };
    assert!(sync::maybe_exchange(&pool, &api).await.unwrap());

    let settings = db::load_settings(&pool).await.unwrap();
    assert_eq!(settings.access_token, "fresh-token");
    assert_eq!(settings.blog_id, "90210");
    assert!(settings.is_connected());

    // Already connected: no further exchange attempts.
    assert!(sync::maybe_exchange(&pool, &api).await.unwrap());
    assert_eq!(api.exchange_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_exchange_leaves_settings_unchanged() {
    let pool = setup_pool().await;
    db::store_client(&pool, "4242", "secret", "the-code")
        .await
        .unwrap();

    let api = FakeApi::failing();
    assert!(!sync::maybe_exchange(&pool, &api).await.unwrap());

    let settings = db::load_settings(&pool).await.unwrap();
    assert_eq!(settings.access_token, "");
    assert_eq!(settings.blog_id, "");
    assert_eq!(settings.auth_code, "the-code");
}
