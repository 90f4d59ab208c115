use std::path::PathBuf;
use std::time::Duration;

use bookhound_core::search::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use bookhound_transmission::MonitorOptions;
use chrono::{DateTime, Utc};

/// Orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the daemon downloads into.
    pub download_dir: PathBuf,
    /// Directory `.torrent` metadata files are saved to.
    pub torrent_dir: PathBuf,
    pub monitor: MonitorOptions,
    /// Candidates requested per tracker search.
    pub search_limit: usize,
    pub seeding: SeedingPolicy,
}

/// When a completed download's seeding obligation is met.
#[derive(Debug, Clone)]
pub struct SeedingPolicy {
    /// How often the seeding monitor refreshes upload stats.
    pub check_interval: Duration,
    pub min_ratio: f64,
    pub min_seed_time: chrono::Duration,
}

impl Default for SeedingPolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(900),
            min_ratio: 1.0,
            min_seed_time: chrono::Duration::hours(72),
        }
    }
}

impl SeedingPolicy {
    /// The obligation is met by ratio or by time seeded, whichever is first.
    pub fn is_satisfied(&self, ratio: f64, seeding_started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        ratio >= self.min_ratio || now - seeding_started_at >= self.min_seed_time
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            torrent_dir: PathBuf::from("torrents"),
            monitor: MonitorOptions::default(),
            search_limit: DEFAULT_SEARCH_LIMIT as usize,
            seeding: SeedingPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default     |
    /// |-------------------------------|-------------|
    /// | `DOWNLOAD_DIR`                | `downloads` |
    /// | `TORRENT_DIR`                 | `torrents`  |
    /// | `MONITOR_POLL_INTERVAL_SECS`  | `10`        |
    /// | `MONITOR_MAX_UNREACHABLE`     | `10`        |
    /// | `SEARCH_LIMIT`                | `10`        |
    /// | `SEEDING_CHECK_INTERVAL_SECS` | `900`       |
    /// | `SEEDING_MIN_RATIO`           | `1.0`       |
    /// | `SEEDING_MIN_HOURS`           | `72`        |
    pub fn from_env() -> Self {
        let download_dir = std::env::var("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("downloads"));
        let torrent_dir = std::env::var("TORRENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("torrents"));

        let poll_interval_secs: u64 = std::env::var("MONITOR_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("MONITOR_POLL_INTERVAL_SECS must be a valid u64");
        let max_unreachable: u32 = std::env::var("MONITOR_MAX_UNREACHABLE")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("MONITOR_MAX_UNREACHABLE must be a valid u32");

        let search_limit: i64 = std::env::var("SEARCH_LIMIT")
            .unwrap_or_else(|_| DEFAULT_SEARCH_LIMIT.to_string())
            .parse()
            .expect("SEARCH_LIMIT must be a valid integer");

        let check_interval_secs: u64 = std::env::var("SEEDING_CHECK_INTERVAL_SECS")
            .unwrap_or_else(|_| "900".into())
            .parse()
            .expect("SEEDING_CHECK_INTERVAL_SECS must be a valid u64");
        let min_ratio: f64 = std::env::var("SEEDING_MIN_RATIO")
            .unwrap_or_else(|_| "1.0".into())
            .parse()
            .expect("SEEDING_MIN_RATIO must be a valid number");
        let min_hours: i64 = std::env::var("SEEDING_MIN_HOURS")
            .unwrap_or_else(|_| "72".into())
            .parse()
            .expect("SEEDING_MIN_HOURS must be a valid integer");

        Self {
            download_dir,
            torrent_dir,
            monitor: MonitorOptions {
                poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
                max_unreachable: max_unreachable.max(1),
            },
            search_limit: search_limit.clamp(1, MAX_SEARCH_LIMIT) as usize,
            seeding: SeedingPolicy {
                check_interval: Duration::from_secs(check_interval_secs.max(1)),
                min_ratio,
                min_seed_time: chrono::Duration::hours(min_hours),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_satisfied_by_ratio() {
        let policy = SeedingPolicy::default();
        let now = Utc::now();
        assert!(policy.is_satisfied(1.0, now, now));
        assert!(!policy.is_satisfied(0.99, now, now));
    }

    #[test]
    fn seeding_satisfied_by_time() {
        let policy = SeedingPolicy::default();
        let now = Utc::now();
        let started = now - chrono::Duration::hours(72);
        assert!(policy.is_satisfied(0.0, started, now));
        assert!(!policy.is_satisfied(0.0, started + chrono::Duration::minutes(1), now));
    }
}
