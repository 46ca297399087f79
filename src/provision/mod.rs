//! Workspace provisioning from a template directory.
//!
//! A missing workspace receives a full recursive copy of the template. An
//! existing workspace is synced additively: at each directory level, names
//! present only in the template are copied in, and recursion continues only
//! into names that are directories on both sides. Nothing that already
//! exists in a workspace is overwritten or removed, so user edits survive
//! any number of re-provisioning runs. The flip side is that template
//! updates to files a user already has are never propagated.

mod copy;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::{AppError, Result};

/// What a provisioning call changed on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// The workspace did not exist and was created from scratch.
    pub created: bool,
    /// Regular files copied from the template.
    pub files_copied: usize,
    /// Directories created in the workspace.
    pub dirs_created: usize,
}

impl ProvisionReport {
    /// Whether the call left the workspace untouched.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        !self.created && self.files_copied == 0 && self.dirs_created == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Other,
}

/// Materialize `workspace_dir` from `template_dir`.
///
/// Safe to call repeatedly; a second call on an unchanged template reports
/// no changes.
///
/// # Errors
///
/// Returns `AppError::Provision` if the template is missing or unreadable,
/// if `workspace_dir` exists but is not a directory, or if any copy fails.
pub fn provision(template_dir: &Path, workspace_dir: &Path) -> Result<ProvisionReport> {
    let template_meta = fs::metadata(template_dir).map_err(|err| {
        AppError::Provision(format!(
            "template {} unreadable: {err}",
            template_dir.display()
        ))
    })?;
    if !template_meta.is_dir() {
        return Err(AppError::Provision(format!(
            "template {} is not a directory",
            template_dir.display()
        )));
    }

    let mut report = ProvisionReport::default();
    match fs::metadata(workspace_dir) {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            copy::copy_tree(template_dir, workspace_dir, &mut report)?;
            report.created = true;
        }
        Err(err) => {
            return Err(AppError::Provision(format!(
                "workspace {} unreadable: {err}",
                workspace_dir.display()
            )));
        }
        Ok(meta) if meta.is_dir() => sync_level(template_dir, workspace_dir, &mut report)?,
        Ok(_) => {
            return Err(AppError::Provision(format!(
                "workspace {} exists but is not a directory",
                workspace_dir.display()
            )));
        }
    }

    Ok(report)
}

fn sync_level(template: &Path, workspace: &Path, report: &mut ProvisionReport) -> Result<()> {
    let template_entries = entries(template)?;
    let workspace_entries = entries(workspace)?;

    for (name, kind) in &template_entries {
        let src = template.join(name);
        let dst = workspace.join(name);
        match (kind, workspace_entries.get(name)) {
            (EntryKind::Dir, None) => copy::copy_tree(&src, &dst, report)?,
            (EntryKind::File, None) => {
                copy::copy_file(&src, &dst)?;
                report.files_copied += 1;
            }
            (EntryKind::Dir, Some(EntryKind::Dir)) => sync_level(&src, &dst, report)?,
            (EntryKind::Other, None) => {
                debug!(path = %src.display(), "skipping special file in template");
            }
            (_, Some(_)) => {}
        }
    }

    Ok(())
}

/// Names in `dir` with the kind of what they resolve to.
fn entries(dir: &Path) -> Result<BTreeMap<OsString, EntryKind>> {
    let read = fs::read_dir(dir)
        .map_err(|err| AppError::Provision(format!("cannot list {}: {err}", dir.display())))?;

    let mut out = BTreeMap::new();
    for entry in read {
        let entry = entry
            .map_err(|err| AppError::Provision(format!("cannot list {}: {err}", dir.display())))?;
        // Follow symlinks; a dangling link still occupies its name.
        let kind = match fs::metadata(entry.path()) {
            Ok(meta) if meta.is_dir() => EntryKind::Dir,
            Ok(meta) if meta.is_file() => EntryKind::File,
            _ => EntryKind::Other,
        };
        out.insert(entry.file_name(), kind);
    }
    Ok(out)
}
