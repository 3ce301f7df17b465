//! Cross-post daemon: pulls recently published posts from a remote blogging
//! API and republishes them as local link-format posts, once per schedule.

pub mod canonical;
pub mod config;
pub mod db;
pub mod model;
pub mod schedule;
pub mod sync;
pub mod wpcom;
