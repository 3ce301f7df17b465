use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;
use crate::wpcom::model::{ClientCredentials, PostsResponse, RemotePost, TokenGrant};

pub mod model;

const AUTHORIZE_URL: &str = "https://public-api.wordpress.com/oauth2/authorize";

/// Field projection requested from the posts endpoint.
const POST_FIELDS: &str = "title,slug,URL,date,excerpt,tags";

/// Transformation applied to the outgoing posts-query parameters before the
/// request is built. Pass-through when unset.
pub type ParamsHook =
    Arc<dyn Fn(Vec<(String, String)>) -> Vec<(String, String)> + Send + Sync>;

#[derive(Clone)]
pub struct WpcomClient {
    http: Client,
    api_base: Url,
    token_url: Url,
    redirect_uri: String,
    params_hook: Option<ParamsHook>,
}

impl fmt::Debug for WpcomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WpcomClient")
            .field("api_base", &self.api_base)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

/// Remote blogging API as the sync engine sees it. Both operations degrade
/// transport and protocol failures to `None`; neither retries.
#[async_trait]
pub trait WpcomApi: Send + Sync {
    /// Exchange an authorization code for an access token and the id of the
    /// blog it grants access to.
    async fn exchange_token(&self, creds: &ClientCredentials) -> Option<TokenGrant>;

    /// Published posts of `blog_id` after `since` (day granularity),
    /// ascending by publish date.
    async fn fetch_posts(
        &self,
        blog_id: &str,
        token: &str,
        since: NaiveDate,
    ) -> Option<Vec<RemotePost>>;
}

impl WpcomClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let api_base = parse_base_url(&cfg.wpcom.api_base)
            .context("invalid wpcom.api_base in config")?;
        let token_url =
            Url::parse(&cfg.wpcom.token_url).context("invalid wpcom.token_url in config")?;
        let http = Client::builder()
            .user_agent(&cfg.wpcom.user_agent)
            .connect_timeout(Duration::from_millis(cfg.wpcom.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.wpcom.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base,
            token_url,
            redirect_uri: cfg.wpcom.redirect_uri.clone(),
            params_hook: None,
        })
    }

    /// Test seam: point the client at arbitrary endpoints.
    pub fn with_base_urls(api_base: Url, token_url: Url, redirect_uri: String) -> Self {
        let http = Client::builder()
            .user_agent("crosspostd/test")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_base,
            token_url,
            redirect_uri,
            params_hook: None,
        }
    }

    pub fn set_params_hook(&mut self, hook: ParamsHook) {
        self.params_hook = Some(hook);
    }

    /// URL a user visits to obtain an authorization code for this
    /// installation.
    pub fn authorize_url(&self, client_id: &str) -> String {
        let mut url = Url::parse(AUTHORIZE_URL).expect("valid authorize URL");
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code");
        url.to_string()
    }

    async fn do_exchange_token(&self, creds: &ClientCredentials) -> Option<TokenGrant> {
        if creds.client_id.trim().is_empty()
            || creds.client_secret.trim().is_empty()
            || creds.code.trim().is_empty()
        {
            warn!("token exchange skipped: incomplete client credentials");
            return None;
        }

        // The settings surface treats the client id as numeric.
        let client_id = creds.client_id.trim().parse::<u64>().unwrap_or(0);
        let params = [
            ("client_id", client_id.to_string()),
            ("client_secret", creds.client_secret.clone()),
            ("code", creds.code.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("grant_type", "authorization_code".to_string()),
        ];

        let res = match self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => {
                warn!(?err, "token exchange request failed");
                return None;
            }
        };

        if res.status() != StatusCode::OK {
            warn!(status = %res.status(), "token endpoint returned non-200");
            return None;
        }

        match res.json::<TokenGrant>().await {
            Ok(grant) => Some(grant),
            Err(err) => {
                warn!(?err, "malformed token response");
                None
            }
        }
    }

    async fn do_fetch_posts(
        &self,
        blog_id: &str,
        token: &str,
        since: NaiveDate,
    ) -> Option<Vec<RemotePost>> {
        let mut params = posts_query(since);
        if let Some(hook) = &self.params_hook {
            params = hook(params);
        }

        let endpoint = match self.api_base.join(&format!("sites/{}/posts", blog_id)) {
            Ok(url) => url,
            Err(err) => {
                warn!(?err, blog_id, "could not build posts endpoint URL");
                return None;
            }
        };

        let res = match self
            .http
            .get(endpoint)
            .query(&params)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => {
                warn!(?err, "posts fetch request failed");
                return None;
            }
        };

        if res.status() != StatusCode::OK {
            warn!(status = %res.status(), "posts endpoint returned non-200");
            return None;
        }

        match res.json::<PostsResponse>().await {
            Ok(body) => Some(body.posts),
            Err(err) => {
                warn!(?err, "posts response missing or malformed");
                None
            }
        }
    }
}

#[async_trait]
impl WpcomApi for WpcomClient {
    async fn exchange_token(&self, creds: &ClientCredentials) -> Option<TokenGrant> {
        self.do_exchange_token(creds).await
    }

    async fn fetch_posts(
        &self,
        blog_id: &str,
        token: &str,
        since: NaiveDate,
    ) -> Option<Vec<RemotePost>> {
        self.do_fetch_posts(blog_id, token, since).await
    }
}

fn posts_query(since: NaiveDate) -> Vec<(String, String)> {
    vec![
        ("after".into(), since.format("%Y-%m-%d").to_string()),
        ("order".into(), "ASC".into()),
        ("fields".into(), POST_FIELDS.into()),
        ("status".into(), "publish".into()),
    ]
}

/// The posts endpoint is joined onto this base, so it must end in a slash.
fn parse_base_url(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Ok(Url::parse(&normalized)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posts_query_has_fixed_projection_and_order() {
        let params = posts_query(NaiveDate::from_ymd_opt(2016, 8, 1).unwrap());
        assert!(params.contains(&("after".into(), "2016-08-01".into())));
        assert!(params.contains(&("order".into(), "ASC".into())));
        assert!(params.contains(&("status".into(), "publish".into())));
        assert!(params.contains(&("fields".into(), POST_FIELDS.into())));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let url = parse_base_url("https://api.example/rest/v1.1").unwrap();
        assert_eq!(url.as_str(), "https://api.example/rest/v1.1/");
        let joined = url.join("sites/42/posts").unwrap();
        assert_eq!(joined.path(), "/rest/v1.1/sites/42/posts");
    }

    #[test]
    fn authorize_url_carries_client_and_redirect() {
        let client = WpcomClient::with_base_urls(
            Url::parse("https://api.example/rest/v1.1/").unwrap(),
            Url::parse("https://api.example/oauth2/token").unwrap(),
            "https://blog.example.org/settings".into(),
        );
        let url = client.authorize_url("4242");
        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=4242"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fblog.example.org%2Fsettings"));
    }
}
