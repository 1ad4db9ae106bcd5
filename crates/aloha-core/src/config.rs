//! Storage configuration shared by every lifecycle component
//!
//! All persisted-state paths are derived in one place from the environment:
//!
//! - `VOLUME_PATH`: external volume root. When set, the database, the uploads
//!   tree and the auto-backup slot all live directly under it.
//! - `ALOHA_HOME`: in-repo base directory used when no volume is mounted
//!   (defaults to the working directory). Uploads live under `public/uploads`.
//! - `ALOHA_RETENTION_HOURS`: grace period before rejected applicants are purged (default: 72)
//! - `ALOHA_AUTO_BACKUP_AT`: daily auto-backup wall-clock time, `HH:MM` (default: 23:59)
//! - `ALOHA_UTC_OFFSET`: zone for the auto-backup time, `+HH:MM` (default: +08:00)

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use tracing::warn;

/// Database file name, both on disk and inside snapshot archives
pub const DB_FILE_NAME: &str = "aloha_database.db";

/// Auto-backup slot file name
pub const AUTO_BACKUP_FILE_NAME: &str = "aloha_auto_backup.db";

const DEFAULT_RETENTION_HOURS: i64 = 72;
const MAX_RETENTION_HOURS: i64 = 24 * 365 * 10;
const DEFAULT_AUTO_BACKUP_AT: &str = "23:59";
const DEFAULT_UTC_OFFSET: &str = "+08:00";

/// How long a rejected record survives after its last status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub grace_period: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::hours(DEFAULT_RETENTION_HOURS)
    }
}

impl RetentionPolicy {
    pub fn hours(hours: i64) -> Self {
        Self {
            grace_period: Duration::hours(hours),
        }
    }

    /// Records last modified at or before this instant are eligible for purge
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.grace_period
    }
}

/// When the daily auto-backup fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Local wall-clock time of the daily copy
    pub auto_backup_at: NaiveTime,
    /// Zone the wall-clock time is interpreted in
    pub utc_offset: FixedOffset,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            auto_backup_at: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            utc_offset: parse_utc_offset(DEFAULT_UTC_OFFSET).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl ScheduleConfig {
    /// Next instant strictly after `now` at which the daily auto-backup runs
    pub fn next_daily_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = now.with_timezone(&self.utc_offset).date_naive();
        let offset = Duration::seconds(i64::from(self.utc_offset.local_minus_utc()));

        let at_utc = |date: chrono::NaiveDate| {
            Utc.from_utc_datetime(&(date.and_time(self.auto_backup_at) - offset))
        };

        let today = at_utc(local_date);
        if today > now {
            today
        } else {
            at_utc(local_date + Duration::days(1))
        }
    }
}

/// Top of the next hour after `now` (retention sweep cadence)
pub fn next_hourly_run(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = (now.timestamp().div_euclid(3600) + 1) * 3600;
    Utc.timestamp_opt(next, 0)
        .single()
        .unwrap_or_else(|| now + Duration::hours(1))
}

/// Every filesystem location the lifecycle subsystem touches
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Primary database file
    pub db_path: PathBuf,
    /// Root of the uploaded asset tree
    pub uploads_dir: PathBuf,
    /// Fixed-path raw copy of the database, overwritten daily
    pub auto_backup_path: PathBuf,
    pub retention: RetentionPolicy,
    pub schedule: ScheduleConfig,
}

impl StorageConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup (environment in production)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let volume = lookup("VOLUME_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let mut config = match volume {
            Some(root) => Self::on_volume(root),
            None => {
                let base = lookup("ALOHA_HOME")
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                Self::in_repo(base)
            }
        };

        if let Some(raw) = lookup("ALOHA_RETENTION_HOURS") {
            match raw.trim().parse::<i64>() {
                Ok(hours) if (1..=MAX_RETENTION_HOURS).contains(&hours) => {
                    config.retention = RetentionPolicy::hours(hours);
                }
                _ => warn!(
                    "ALOHA_RETENTION_HOURS={:?} is invalid, using {} hours",
                    raw, DEFAULT_RETENTION_HOURS
                ),
            }
        }

        if let Some(raw) = lookup("ALOHA_AUTO_BACKUP_AT") {
            match NaiveTime::parse_from_str(raw.trim(), "%H:%M") {
                Ok(at) => config.schedule.auto_backup_at = at,
                Err(_) => warn!(
                    "ALOHA_AUTO_BACKUP_AT={:?} is invalid, using {}",
                    raw, DEFAULT_AUTO_BACKUP_AT
                ),
            }
        }

        if let Some(raw) = lookup("ALOHA_UTC_OFFSET") {
            match parse_utc_offset(&raw) {
                Some(offset) => config.schedule.utc_offset = offset,
                None => warn!(
                    "ALOHA_UTC_OFFSET={:?} is invalid, using {}",
                    raw, DEFAULT_UTC_OFFSET
                ),
            }
        }

        config
    }

    /// Layout used when an external volume is mounted
    pub fn on_volume(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            db_path: root.join(DB_FILE_NAME),
            uploads_dir: root.join("uploads"),
            auto_backup_path: root.join(AUTO_BACKUP_FILE_NAME),
            retention: RetentionPolicy::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    /// Layout used for a checkout without a volume
    pub fn in_repo(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            db_path: base.join(DB_FILE_NAME),
            uploads_dir: base.join("public").join("uploads"),
            auto_backup_path: base.join(AUTO_BACKUP_FILE_NAME),
            retention: RetentionPolicy::default(),
            schedule: ScheduleConfig::default(),
        }
    }

    /// Alias of [`StorageConfig::on_volume`] for tests and tooling
    pub fn under(root: impl AsRef<Path>) -> Self {
        Self::on_volume(root)
    }

    /// Directory holding the database file (staging happens here)
    pub fn db_dir(&self) -> PathBuf {
        match self.db_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Parse `+HH:MM` / `-HH:MM` / `Z` into a fixed offset
fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => (1, raw),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };

    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
