//! Recurring-trigger management for the sync job: idempotent registration
//! on install, cancellation plus settings wipe on uninstall, and the due
//! check the daemon polls.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::config::Config;
use crate::db::{self, Pool, ScheduledJob};
use crate::sync::SyncHooks;

/// Fixed name of the recurring sync job.
pub const SYNC_JOB: &str = "create_cross_posts";

/// Register the sync job unless it is already registered. The first firing
/// is offset by `schedule.initial_delay_secs`; the interval comes from the
/// configured frequency after the frequency hook has been applied. Returns
/// true when a new job was registered.
#[instrument(skip_all)]
pub async fn install(pool: &Pool, cfg: &Config, hooks: &SyncHooks) -> Result<bool> {
    let frequency = (hooks.frequency)(cfg.frequency());
    let first_run = Utc::now() + Duration::seconds(cfg.schedule.initial_delay_secs as i64);
    let registered =
        db::register_job(pool, SYNC_JOB, frequency.interval_secs(), first_run).await?;
    if registered {
        info!(frequency = frequency.as_str(), "registered sync schedule");
    }
    Ok(registered)
}

/// Cancel the sync job and clear all persisted settings as one operation.
#[instrument(skip_all)]
pub async fn uninstall(pool: &Pool) -> Result<()> {
    db::uninstall(pool, SYNC_JOB).await?;
    info!("sync schedule removed and settings cleared");
    Ok(())
}

/// The next job due at `now`, if any.
pub async fn next_due(pool: &Pool, now: DateTime<Utc>) -> Result<Option<ScheduledJob>> {
    db::next_due_job(pool, now).await
}

/// Advance the job after a firing; the next run is `now + interval`.
pub async fn mark_ran(pool: &Pool, job: &ScheduledJob, now: DateTime<Utc>) -> Result<()> {
    db::advance_job(pool, &job.job_name, now).await
}

/// Whether the trigger mechanism is available at all. Hosts surface a
/// persistent notice to the operator when it is not.
pub fn is_available(cfg: &Config) -> bool {
    cfg.schedule.enabled
}
