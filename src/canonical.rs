//! Canonical-URL rewriting for cross-posts. Search engines should treat the
//! originating post as authoritative, so a local post that recorded its
//! source URL reports that URL as canonical.

use anyhow::Result;

use crate::db::ContentStore;
use crate::sync::ORIGINAL_URL_META;

/// Pure rewrite: a recorded originating URL wins over the default; absent
/// metadata is the common case and leaves the default untouched.
pub fn rewrite_canonical(default_url: &str, original_url: Option<&str>) -> String {
    match original_url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => default_url.to_string(),
    }
}

/// Store-backed variant: looks up the originating URL recorded for
/// `post_id` and rewrites against it.
pub async fn canonical_for_post(
    store: &dyn ContentStore,
    post_id: i64,
    default_url: &str,
) -> Result<String> {
    let original = store.post_metadata(post_id, ORIGINAL_URL_META).await?;
    Ok(rewrite_canonical(default_url, original.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_url_wins() {
        assert_eq!(
            rewrite_canonical("https://local.example/p", Some("https://a.example/p")),
            "https://a.example/p"
        );
    }

    #[test]
    fn absent_metadata_keeps_default() {
        assert_eq!(
            rewrite_canonical("https://local.example/p", None),
            "https://local.example/p"
        );
    }

    #[test]
    fn empty_metadata_keeps_default() {
        assert_eq!(
            rewrite_canonical("https://local.example/p", Some("")),
            "https://local.example/p"
        );
    }
}
