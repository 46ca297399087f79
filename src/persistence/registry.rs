//! Session table writer (`User,Token,URL`).
//!
//! The table is the artifact handed to operators. Every appended row is
//! flushed before `append` returns, so a run that dies halfway still leaves
//! a readable table listing exactly the sessions launched so far.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use csv::{Reader, Writer, WriterBuilder};

use crate::models::session::SessionRecord;
use crate::{AppError, Result};

/// Column names of the session table.
pub const HEADER: [&str; 3] = ["User", "Token", "URL"];

/// Append-once CSV table of launched sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl SessionRegistry {
    /// Create or truncate the table at `path` and write the header.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the file cannot be created or written.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Registry(format!("cannot create {}: {err}", parent.display()))
            })?;
        }

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|err| AppError::Registry(format!("cannot open {}: {err}", path.display())))?;
        writer.write_record(HEADER)?;
        writer
            .flush()
            .map_err(|err| AppError::Registry(format!("flush {}: {err}", path.display())))?;

        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    /// Write one row and flush it to disk.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the row cannot be written.
    pub fn append(&mut self, record: &SessionRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer
            .flush()
            .map_err(|err| AppError::Registry(format!("flush {}: {err}", self.path.display())))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of data rows written so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Location of the table.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the table.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Registry` if the final flush fails.
    pub fn close(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|err| AppError::Registry(format!("flush {}: {err}", self.path.display())))
    }
}

/// Read a session table back.
///
/// # Errors
///
/// Returns `AppError::Registry` if the file is missing or malformed.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<SessionRecord>> {
    let path = path.as_ref();
    let mut reader = Reader::from_path(path)
        .map_err(|err| AppError::Registry(format!("cannot open {}: {err}", path.display())))?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<SessionRecord>, _>>()?;
    Ok(records)
}
