use serde::{Deserialize, Serialize};

/// Result of one sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new local post was created from the remote batch.
    Created { post_id: i64 },
    /// Nothing was created: empty batch, fetch failure, or everything
    /// examined was already present.
    NothingToSync,
}

/// Recognized recurring-schedule frequencies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Frequency {
    Hourly,
    TwiceDaily,
    Daily,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::TwiceDaily => "twicedaily",
            Frequency::Daily => "daily",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Frequency::Hourly),
            "twicedaily" => Some(Frequency::TwiceDaily),
            "daily" => Some(Frequency::Daily),
            _ => None,
        }
    }

    pub fn interval_secs(&self) -> i64 {
        match self {
            Frequency::Hourly => 3_600,
            Frequency::TwiceDaily => 43_200,
            Frequency::Daily => 86_400,
        }
    }
}

/// Post formats the content store understands. Cross-posts are forced to
/// `Link` after creation; everything else starts as `Standard`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PostFormat {
    Standard,
    Link,
}

impl PostFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostFormat::Standard => "standard",
            PostFormat::Link => "link",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_round_trips() {
        for f in [Frequency::Hourly, Frequency::TwiceDaily, Frequency::Daily] {
            assert_eq!(Frequency::parse(f.as_str()), Some(f));
        }
        assert_eq!(Frequency::parse("weekly"), None);
    }

    #[test]
    fn daily_interval_is_one_day() {
        assert_eq!(Frequency::Daily.interval_secs(), 86_400);
    }
}
