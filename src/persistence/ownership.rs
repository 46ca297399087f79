//! JSONL ownership ledger.
//!
//! Records which process each launch run started, one JSON object per
//! line, so a later `stop` can terminate exactly those processes. The
//! ledger is appended across runs and pruned by `stop`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::models::session::OwnershipRecord;
use crate::{AppError, Result};

/// Append-only writer over the ledger file.
#[derive(Debug)]
pub struct OwnershipLedger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl OwnershipLedger {
    /// Open the ledger for appending, creating it and its parent directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Registry(format!("cannot create {}: {err}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| {
                AppError::Registry(format!("failed to open ledger {}: {err}", path.display()))
            })?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Append one record and flush it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` on serialization or write failure.
    pub fn append(&mut self, record: &OwnershipRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|err| {
                AppError::Registry(format!("ledger write {}: {err}", self.path.display()))
            })
    }
}

/// Read every record in the ledger; a missing ledger is empty.
///
/// Unparseable lines (for example a line cut short by a crash) are skipped
/// with a warning.
///
/// # Errors
///
/// Returns `AppError::Registry` if the file exists but cannot be read.
pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<OwnershipRecord>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(AppError::Registry(format!(
                "failed to open ledger {}: {err}",
                path.display()
            )))
        }
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|err| {
            AppError::Registry(format!("ledger read {}: {err}", path.display()))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OwnershipRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(line = index + 1, %err, "skipping malformed ledger line"),
        }
    }
    Ok(records)
}

/// Replace the ledger contents with `records`.
///
/// # Errors
///
/// Returns `AppError::Registry` if the file cannot be rewritten.
pub fn rewrite_ledger(path: impl AsRef<Path>, records: &[OwnershipRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| {
        AppError::Registry(format!("failed to rewrite ledger {}: {err}", path.display()))
    })?;
    let mut writer = BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(writer, "{line}").map_err(|err| {
            AppError::Registry(format!("ledger write {}: {err}", path.display()))
        })?;
    }
    writer
        .flush()
        .map_err(|err| AppError::Registry(format!("ledger write {}: {err}", path.display())))
}
