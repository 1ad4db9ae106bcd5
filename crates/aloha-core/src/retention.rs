//! Retention sweeper
//!
//! Purges applicants that have sat in `Rejected` past the grace period,
//! together with their uploads. Assets go first, then the row; a failed asset
//! delete does not keep the row alive (the file is orphaned instead).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assets::{AssetDeletion, AssetStore};
use crate::config::RetentionPolicy;
use crate::db::DatabaseHandle;
use crate::error::{Error, Result};

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records deleted
    pub purged: usize,
    /// Asset deletions that failed (files now orphaned)
    pub asset_failures: usize,
    /// Records whose row could not be deleted; retried next run
    pub record_failures: usize,
}

pub struct RetentionSweeper {
    handle: DatabaseHandle,
    assets: AssetStore,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(handle: DatabaseHandle, assets: AssetStore, policy: RetentionPolicy) -> Self {
        Self {
            handle,
            assets,
            policy,
        }
    }

    /// Run one sweep as of `now`
    ///
    /// Records last modified at or before `now - grace_period` are purged.
    /// Returns an error only if the candidate query itself fails.
    pub fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let db = match self.handle.get() {
            Ok(db) => db,
            Err(Error::DatabaseClosed) => {
                info!("Database closed (restore in progress), retention sweep skipped");
                return Ok(SweepReport::default());
            }
            Err(e) => return Err(e),
        };

        let cutoff = self.policy.cutoff(now);
        let candidates = db.list_purgeable_applicants(cutoff)?;
        debug!(
            "Retention sweep: {} candidate(s) rejected on or before {}",
            candidates.len(),
            cutoff
        );

        let mut report = SweepReport::default();
        for applicant in candidates {
            for reference in applicant.asset_references() {
                if self.assets.delete(reference) == AssetDeletion::Failed {
                    report.asset_failures += 1;
                }
            }

            match db.delete_applicant(applicant.id) {
                Ok(true) => report.purged += 1,
                Ok(false) => debug!("Applicant {} already gone", applicant.id),
                Err(e) => {
                    warn!("Failed to purge applicant {}: {}", applicant.id, e);
                    report.record_failures += 1;
                }
            }
        }

        if report.purged > 0 || report.record_failures > 0 {
            info!(
                "Retention sweep purged {} applicant(s) ({} asset failures, {} record failures)",
                report.purged, report.asset_failures, report.record_failures
            );
        }

        Ok(report)
    }
}
