//! Metadata-preserving copy primitives.

use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::ProvisionReport;
use crate::{AppError, Result};

/// Recursively copy `src` into the not-yet-existing `dst`.
pub(super) fn copy_tree(src: &Path, dst: &Path, report: &mut ProvisionReport) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            AppError::Provision(format!("cannot walk {}: {err}", src.display()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| AppError::Provision(format!("unexpected walk entry: {err}")))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| {
                AppError::Provision(format!("cannot create {}: {err}", target.display()))
            })?;
            report.dirs_created += 1;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
            report.files_copied += 1;
        } else {
            debug!(path = %entry.path().display(), "skipping special file in template");
        }
    }
    Ok(())
}

/// Copy one file's content and permissions, then its timestamps.
///
/// Timestamp preservation is best effort.
pub(super) fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|err| {
        AppError::Provision(format!(
            "cannot copy {} to {}: {err}",
            src.display(),
            dst.display()
        ))
    })?;

    let preserved = fs::metadata(src).and_then(|meta| preserve_times(&meta, dst));
    if let Err(err) = preserved {
        warn!(path = %dst.display(), %err, "could not preserve file times");
    }
    debug!(path = %dst.display(), "copied");
    Ok(())
}

fn preserve_times(meta: &Metadata, dst: &Path) -> io::Result<()> {
    let mut times = FileTimes::new().set_modified(meta.modified()?);
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    // Unix only needs ownership to set times; Windows needs a write handle.
    let file = if cfg!(windows) {
        OpenOptions::new().write(true).open(dst)?
    } else {
        File::open(dst)?
    };
    file.set_times(times)
}
