//! Task bodies. One [`Job`] is prepared per batch and executed once per entry.

pub mod crypt;
pub mod organize;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::event::EventSink;
use crate::naming::NameClaims;
use crate::request::{BatchRequest, Mode};
use std::path::{Path, PathBuf};

pub use crypt::CryptJob;
pub use organize::OrganizeJob;

/// What one entry turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Last output written for the entry.
    Wrote(PathBuf),
    Skipped,
}

/// Per-task view of batch-wide state.
pub struct TaskContext<'a> {
    pub claims: &'a NameClaims,
    pub sink: &'a dyn EventSink,
}

impl TaskContext<'_> {
    pub fn status(&self, text: String) {
        self.sink.status(text);
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone)]
pub enum Job {
    Organize(OrganizeJob),
    Crypt(CryptJob),
}

impl Job {
    /// Resolve batch-wide parameters once, before any task runs.
    pub fn prepare(request: &BatchRequest, config: &EngineConfig) -> Result<Self> {
        match &request.mode {
            Mode::Organize(params) => Ok(Job::Organize(OrganizeJob::prepare(
                params,
                &request.entries,
                config.date_basis,
                request.remove_originals,
            )?)),
            Mode::Crypt(direction, params) => Ok(Job::Crypt(CryptJob::new(
                *direction,
                params.password.clone(),
                request.remove_originals,
            ))),
        }
    }

    pub fn execute(&self, entry: &Path, cx: &TaskContext<'_>) -> Result<Step> {
        match self {
            Job::Organize(job) => job.execute(entry, cx),
            Job::Crypt(job) => job.execute(entry, cx),
        }
    }
}
