//! Fleet termination.
//!
//! Two entry points with different reach:
//!
//! - [`terminate_recorded`] kills exactly the pids an ownership ledger says
//!   this tool launched, skipping pids that are gone or were reused by an
//!   unrelated process.
//! - [`terminate_by_name`] is the broad sweep: every process whose listing
//!   line contains the signature is killed, whoever started it. It works
//!   without any ledger, which makes it the recovery path when the ledger
//!   was lost.
//!
//! Both are best effort: one failed kill is logged and the rest proceed.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, info_span, warn};

use crate::models::session::OwnershipRecord;
use crate::persistence::ownership::{read_ledger, rewrite_ledger};
use crate::process::ProcessTable;
use crate::{AppError, Result};

/// Outcome counts of a signature sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Listing lines that matched and carried a pid.
    pub matched: usize,
    /// Kill requests the OS accepted.
    pub killed: usize,
    /// Kill requests that failed.
    pub failed: usize,
}

/// Outcome of stopping the processes recorded in a ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Recorded processes that were killed.
    pub killed: usize,
    /// Recorded processes no longer running.
    pub gone: usize,
    /// Records whose pid is running but whose command line lacks the
    /// signature: either the pid was reused or the signature does not
    /// describe the configured executable. Left alive and still owned.
    pub unverified: Vec<OwnershipRecord>,
    /// Records whose kill failed; they are still owned.
    pub failed: Vec<OwnershipRecord>,
}

impl StopReport {
    /// Records that stay in the ledger after this stop.
    #[must_use]
    pub fn retained(&self) -> Vec<OwnershipRecord> {
        self.unverified.iter().chain(&self.failed).cloned().collect()
    }
}

/// Kill every process whose listing line contains `signature`.
///
/// The controller's own process is never killed, even though its command
/// line may contain the signature.
///
/// # Errors
///
/// Returns `AppError::Config` for an empty signature and propagates
/// listing failures. Individual kill failures are counted, not returned.
pub fn terminate_by_name(table: &impl ProcessTable, signature: &str) -> Result<SweepReport> {
    let span = info_span!("terminate_by_name", signature);
    let _guard = span.enter();

    if signature.trim().is_empty() {
        return Err(AppError::Config(
            "refusing to sweep with an empty process signature".into(),
        ));
    }

    let own_pid = std::process::id();
    let mut report = SweepReport::default();

    for line in table.list()?.iter().filter(|line| line.contains(signature)) {
        let Some(pid) = table.parse_pid(line) else {
            warn!(line = line.trim(), "matching process line has no pid");
            continue;
        };
        if pid == own_pid {
            continue;
        }

        report.matched += 1;
        match table.kill(pid) {
            Ok(()) => {
                info!(pid, "killed process");
                report.killed += 1;
            }
            Err(err) => {
                warn!(pid, %err, "failed to kill process");
                report.failed += 1;
            }
        }
    }

    info!(
        matched = report.matched,
        killed = report.killed,
        failed = report.failed,
        "signature sweep finished"
    );
    Ok(report)
}

/// Kill the processes listed in an ownership ledger.
///
/// A recorded pid is only killed while it still appears in the process
/// listing and, when `signature` is non-empty, its line still contains the
/// signature. A listed pid without the signature is reported in
/// [`StopReport::unverified`] and left running.
///
/// # Errors
///
/// Propagates listing failures. Individual kill failures end up in
/// [`StopReport::failed`].
pub fn terminate_recorded(
    table: &impl ProcessTable,
    records: &[OwnershipRecord],
    signature: &str,
) -> Result<StopReport> {
    let span = info_span!("terminate_recorded", records = records.len());
    let _guard = span.enter();

    let lines = table.list()?;
    let live: HashMap<u32, &str> = lines
        .iter()
        .filter_map(|line| table.parse_pid(line).map(|pid| (pid, line.as_str())))
        .collect();

    let mut report = StopReport::default();
    for record in records {
        let line = record.pid.and_then(|pid| live.get(&pid).map(|line| (pid, *line)));
        let pid = match line {
            Some((pid, line)) if signature.is_empty() || line.contains(signature) => pid,
            Some((pid, _)) => {
                warn!(
                    user = %record.user,
                    pid,
                    signature,
                    "recorded pid is running without the signature; left alone"
                );
                report.unverified.push(record.clone());
                continue;
            }
            None => {
                debug!(user = %record.user, pid = ?record.pid, "session already gone");
                report.gone += 1;
                continue;
            }
        };

        match table.kill(pid) {
            Ok(()) => {
                info!(user = %record.user, port = record.port, pid, "stopped session");
                report.killed += 1;
            }
            Err(err) => {
                warn!(user = %record.user, pid, %err, "failed to stop session");
                report.failed.push(record.clone());
            }
        }
    }

    info!(
        killed = report.killed,
        gone = report.gone,
        unverified = report.unverified.len(),
        failed = report.failed.len(),
        "recorded sessions stopped"
    );
    Ok(report)
}

/// Stop every session in the ledger at `ledger_path` and prune it.
///
/// Afterwards the ledger holds only the records still owned: kill failures
/// and live pids that could not be verified against `signature`.
///
/// # Errors
///
/// Returns `AppError::Registry` if the ledger cannot be read or rewritten
/// and propagates listing failures.
pub fn stop_recorded(
    table: &impl ProcessTable,
    ledger_path: &Path,
    signature: &str,
) -> Result<StopReport> {
    let records = read_ledger(ledger_path)?;
    if records.is_empty() {
        return Ok(StopReport::default());
    }

    let report = terminate_recorded(table, &records, signature)?;
    rewrite_ledger(ledger_path, &report.retained())?;
    Ok(report)
}
