use super::{Step, TaskContext, display_name};
use crate::classify::classify;
use crate::config::DateBasis;
use crate::crypto::stream::discard;
use crate::error::{ArrangeError, PathContext, Result};
use crate::naming::resolve_in_dir;
use crate::request::{OrganizeBy, OrganizeParams};
use chrono::{DateTime, Local};
use filetime::FileTime;
use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

pub const BY_TYPE_DIR: &str = "Organized by Type";
pub const BY_DATE_DIR: &str = "Organized by Date";

#[derive(Debug, Clone)]
pub struct OrganizeJob {
    organize_by: OrganizeBy,
    root: PathBuf,
    date_basis: DateBasis,
    remove_originals: bool,
}

impl OrganizeJob {
    /// Pick the destination root and create the top-level folders.
    ///
    /// Without an explicit root the first entry's parent is used.
    pub fn prepare(
        params: &OrganizeParams,
        entries: &[PathBuf],
        date_basis: DateBasis,
        remove_originals: bool,
    ) -> Result<Self> {
        let root = match &params.destination_root {
            Some(r) => r.clone(),
            None => entries
                .first()
                .and_then(|e| e.parent())
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let job = Self {
            organize_by: params.organize_by,
            root,
            date_basis,
            remove_originals,
        };
        fs::create_dir_all(&job.root).at(&job.root)?;
        if job.organize_by.by_type() {
            let p = job.type_root();
            fs::create_dir_all(&p).at(&p)?;
        }
        if job.organize_by.by_date() {
            let p = job.date_root();
            fs::create_dir_all(&p).at(&p)?;
        }
        Ok(job)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn type_root(&self) -> PathBuf {
        self.root.join(BY_TYPE_DIR)
    }

    fn date_root(&self) -> PathBuf {
        self.root.join(BY_DATE_DIR)
    }

    fn timestamp(&self, entry: &Path, meta: &Metadata) -> Result<SystemTime> {
        match self.date_basis {
            DateBasis::Modified => meta.modified(),
            DateBasis::Created => meta.created(),
        }
        .at(entry)
    }

    pub fn execute(&self, entry: &Path, cx: &TaskContext<'_>) -> Result<Step> {
        let meta = fs::metadata(entry).at(entry)?;
        let name = display_name(entry);
        if meta.is_dir() {
            cx.status(format!("Skipped folder: {name}"));
            return Ok(Step::Skipped);
        }
        let Some(file_name) = entry.file_name() else {
            return Err(ArrangeError::Format(format!(
                "{} has no file name",
                entry.display()
            )));
        };

        let mut last = None;
        if self.organize_by.by_type() {
            let dir = self.type_root().join(classify(entry).label());
            let dest = place(entry, &dir, file_name, &meta, cx)?;
            cx.status(format!("Copied to Type: {name}"));
            last = Some(dest);
        }
        if self.organize_by.by_date() {
            let dir = self.date_root().join(day_label(self.timestamp(entry, &meta)?));
            let dest = place(entry, &dir, file_name, &meta, cx)?;
            cx.status(format!("Copied to Date: {name}"));
            last = Some(dest);
        }

        if self.remove_originals {
            fs::remove_file(entry).at(entry)?;
            cx.status(format!("Removed original: {name}"));
        }
        // OrganizeBy always names at least one rule
        last.map(Step::Wrote)
            .ok_or_else(|| ArrangeError::Format("no organize rule selected".into()))
    }
}

/// `YYYY-MM-DD` in local time.
pub fn day_label(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d").to_string()
}

fn place(
    entry: &Path,
    dir: &Path,
    name: &OsStr,
    meta: &Metadata,
    cx: &TaskContext<'_>,
) -> Result<PathBuf> {
    // concurrent tasks may race to create the same folder; create_dir_all tolerates that
    fs::create_dir_all(dir).at(dir)?;
    let dest = resolve_in_dir(dir, name, Some(cx.claims));
    copy_preserving(entry, &dest, meta)?;
    debug!("copied {} -> {}", entry.display(), dest.display());
    Ok(dest)
}

/// Copy contents and permissions, then carry over access and modification times.
pub fn copy_preserving(src: &Path, dest: &Path, meta: &Metadata) -> Result<()> {
    if let Err(e) = fs::copy(src, dest) {
        discard(dest);
        return Err(ArrangeError::at(src, e));
    }
    let atime = FileTime::from_last_access_time(meta);
    let mtime = FileTime::from_last_modification_time(meta);
    filetime::set_file_times(dest, atime, mtime).at(dest)
}
