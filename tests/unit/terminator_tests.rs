//! Signature sweep and ledger-driven stop against a scripted process table.

use std::cell::RefCell;
use std::collections::HashSet;

use chrono::Utc;
use notebook_fleet::models::session::OwnershipRecord;
use notebook_fleet::orchestrator::terminator::{
    stop_recorded, terminate_by_name, terminate_recorded, StopReport,
};
use notebook_fleet::persistence::ownership::{read_ledger, OwnershipLedger};
use notebook_fleet::process::{PidPattern, ProcessTable};
use notebook_fleet::{AppError, Result};

const SIGNATURE: &str = "jupyter-notebook";

/// In-memory `ps` listing that records kill requests.
struct FakeTable {
    lines: Vec<String>,
    refuse: HashSet<u32>,
    killed: RefCell<Vec<u32>>,
    pattern: PidPattern,
}

impl FakeTable {
    fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| (*l).to_owned()).collect(),
            refuse: HashSet::new(),
            killed: RefCell::new(Vec::new()),
            pattern: PidPattern::ps().expect("pattern"),
        }
    }

    fn refusing(mut self, pid: u32) -> Self {
        self.refuse.insert(pid);
        self
    }

    fn killed(&self) -> Vec<u32> {
        self.killed.borrow().clone()
    }
}

impl ProcessTable for FakeTable {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.lines.clone())
    }

    fn parse_pid(&self, line: &str) -> Option<u32> {
        self.pattern.extract(line)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        if self.refuse.contains(&pid) {
            return Err(AppError::Termination(format!("kill {pid}: EPERM")));
        }
        self.killed.borrow_mut().push(pid);
        Ok(())
    }
}

struct BrokenTable;

impl ProcessTable for BrokenTable {
    fn list(&self) -> Result<Vec<String>> {
        Err(AppError::Io("failed to list processes: ps not found".into()))
    }

    fn parse_pid(&self, _line: &str) -> Option<u32> {
        None
    }

    fn kill(&self, _pid: u32) -> Result<()> {
        Ok(())
    }
}

fn listing() -> Vec<&'static str> {
    vec![
        "    1 /sbin/init",
        "  310 /usr/bin/python3 /usr/local/bin/jupyter-notebook --port=8000",
        "  311 /usr/bin/python3 /usr/local/bin/jupyter-notebook --port=8001",
        "  400 vim notes.txt",
        "  312 /usr/bin/python3 /usr/local/bin/jupyter-notebook --port=8002",
        "  500 bash",
    ]
}

fn record(user: &str, port: u16, pid: Option<u32>) -> OwnershipRecord {
    OwnershipRecord {
        run_id: "run-1".into(),
        user: user.into(),
        port,
        pid,
        launched_at: Utc::now(),
    }
}

#[test]
fn sweep_kills_exactly_matching_processes() {
    let table = FakeTable::new(&listing());

    let report = terminate_by_name(&table, SIGNATURE).expect("sweep");

    assert_eq!(report.matched, 3);
    assert_eq!(report.killed, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(table.killed(), vec![310, 311, 312]);
}

#[test]
fn sweep_with_no_matches_kills_nothing() {
    let table = FakeTable::new(&["    1 /sbin/init", "  400 vim notes.txt"]);

    let report = terminate_by_name(&table, SIGNATURE).expect("sweep");

    assert_eq!(report.matched, 0);
    assert!(table.killed().is_empty());
}

#[test]
fn sweep_continues_past_failed_kill() {
    let table = FakeTable::new(&listing()).refusing(311);

    let report = terminate_by_name(&table, SIGNATURE).expect("sweep");

    assert_eq!(report.matched, 3);
    assert_eq!(report.killed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(table.killed(), vec![310, 312]);
}

#[test]
fn sweep_skips_lines_without_pid() {
    let table = FakeTable::new(&["jupyter-notebook (zombie)", "  77 jupyter-notebook"]);

    let report = terminate_by_name(&table, SIGNATURE).expect("sweep");

    assert_eq!(report.matched, 1);
    assert_eq!(table.killed(), vec![77]);
}

#[test]
fn sweep_never_kills_the_controller() {
    let own = std::process::id();
    let own_line = format!("{own} notebook-fleet sweep --signature jupyter-notebook");
    let table = FakeTable::new(&[own_line.as_str(), "  310 jupyter-notebook --port=8000"]);

    let report = terminate_by_name(&table, SIGNATURE).expect("sweep");

    assert_eq!(report.matched, 1);
    assert_eq!(table.killed(), vec![310]);
}

#[test]
fn empty_signature_is_rejected() {
    let table = FakeTable::new(&listing());

    for signature in ["", "   "] {
        let err = terminate_by_name(&table, signature).expect_err("empty signature");
        assert!(matches!(err, AppError::Config(_)));
    }
    assert!(table.killed().is_empty());
}

#[test]
fn listing_failure_propagates() {
    let err = terminate_by_name(&BrokenTable, SIGNATURE).expect_err("no listing");
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn stop_kills_live_recorded_sessions() {
    let table = FakeTable::new(&listing());
    let records = [
        record("user1", 8000, Some(310)),
        record("user3", 8002, Some(312)),
    ];

    let report = terminate_recorded(&table, &records, SIGNATURE).expect("stop");

    assert_eq!(report.killed, 2);
    assert_eq!(report.gone, 0);
    assert!(report.failed.is_empty());
    // 311 was not ours.
    assert_eq!(table.killed(), vec![310, 312]);
}

#[test]
fn stop_counts_exited_sessions_as_gone() {
    let table = FakeTable::new(&listing());
    let records = [record("user1", 8000, Some(9999)), record("user2", 8001, None)];

    let report = terminate_recorded(&table, &records, SIGNATURE).expect("stop");

    assert_eq!(report.killed, 0);
    assert_eq!(report.gone, 2);
    assert!(table.killed().is_empty());
}

#[test]
fn stop_leaves_reused_pid_alone() {
    let table = FakeTable::new(&listing());
    // pid 400 is now an editor, not a notebook session.
    let records = [record("user1", 8000, Some(400))];

    let report = terminate_recorded(&table, &records, SIGNATURE).expect("stop");

    assert_eq!(report.gone, 0);
    assert_eq!(report.unverified, vec![records[0].clone()]);
    assert_eq!(report.retained(), vec![records[0].clone()]);
    assert!(table.killed().is_empty());
}

#[test]
fn stop_without_signature_trusts_the_ledger() {
    let table = FakeTable::new(&listing());
    let records = [record("user1", 8000, Some(400))];

    let report = terminate_recorded(&table, &records, "").expect("stop");

    assert_eq!(report.killed, 1);
    assert_eq!(table.killed(), vec![400]);
}

#[test]
fn stop_reports_failed_records() {
    let table = FakeTable::new(&listing()).refusing(311);
    let records = [
        record("user1", 8000, Some(310)),
        record("user2", 8001, Some(311)),
    ];

    let report = terminate_recorded(&table, &records, SIGNATURE).expect("stop");

    assert_eq!(report.killed, 1);
    assert_eq!(report.failed, vec![records[1].clone()]);
}

#[test]
fn stop_keeps_only_still_owned_records_in_ledger() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("owners.jsonl");
    let records = [
        record("user1", 8000, Some(310)),
        record("user2", 8001, Some(9999)),
        record("user3", 8002, Some(400)),
        record("user4", 8003, Some(311)),
    ];
    let mut ledger = OwnershipLedger::open(&path).expect("open");
    for record in &records {
        ledger.append(record).expect("append");
    }
    drop(ledger);
    let table = FakeTable::new(&listing()).refusing(311);

    let report = stop_recorded(&table, &path, SIGNATURE).expect("stop");

    assert_eq!(report.killed, 1);
    assert_eq!(report.gone, 1);
    assert_eq!(table.killed(), vec![310]);
    let users: Vec<String> = read_ledger(&path)
        .expect("read")
        .into_iter()
        .map(|r| r.user)
        .collect();
    assert_eq!(users, vec!["user3", "user4"]);
}

#[test]
fn stop_with_missing_ledger_does_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("owners.jsonl");
    let table = FakeTable::new(&listing());

    let report = stop_recorded(&table, &path, SIGNATURE).expect("stop");

    assert_eq!(report, StopReport::default());
    assert!(table.killed().is_empty());
    assert!(!path.exists());
}
