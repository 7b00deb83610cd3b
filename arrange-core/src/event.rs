use crate::error::ArrangeError;
use crate::request::Operation;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Entry or destination unreadable, missing, or not writable.
    Path,
    /// Wrong password or not one of our containers.
    Integrity,
    Other,
}

impl FailureKind {
    pub fn of(e: &ArrangeError) -> Self {
        match e {
            ArrangeError::Path { .. } | ArrangeError::Io(_) => FailureKind::Path,
            ArrangeError::Integrity => FailureKind::Integrity,
            _ => FailureKind::Other,
        }
    }
}

/// Result of one task. Every submitted task produces exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TaskOutcome {
    Done {
        source: PathBuf,
        destination: PathBuf,
    },
    /// Acknowledged without touching the filesystem (folders in organize mode).
    Skipped { source: PathBuf },
    Failed {
        source: PathBuf,
        kind: FailureKind,
        error: String,
    },
}

impl TaskOutcome {
    pub fn failed(source: PathBuf, e: &ArrangeError) -> Self {
        TaskOutcome::Failed {
            source,
            kind: FailureKind::of(e),
            error: e.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Ending {
    /// Every entry was submitted and has reported.
    Finished,
    /// Cancelled before all entries were submitted; in-flight tasks drained.
    Cancelled,
    /// The batch never ran (bad request, no worker pool).
    Aborted(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub operation: Operation,
    pub ending: Ending,
    pub total: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn new(operation: Operation, total: usize) -> Self {
        Self {
            operation,
            ending: Ending::Finished,
            total,
            submitted: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn aborted(operation: Operation, total: usize, e: &ArrangeError) -> Self {
        Self {
            ending: Ending::Aborted(e.to_string()),
            ..Self::new(operation, total)
        }
    }

    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Done { .. } => self.succeeded += 1,
            TaskOutcome::Skipped { .. } => self.skipped += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    pub fn was_cancelled(&self) -> bool {
        self.ending == Ending::Cancelled
    }

    /// "Ran to completion", not "zero failures".
    pub fn success(&self) -> bool {
        self.ending == Ending::Finished
    }

    pub fn message(&self) -> String {
        match &self.ending {
            Ending::Cancelled => "Operation cancelled".to_string(),
            Ending::Aborted(why) => format!("Error: {why}"),
            Ending::Finished => match self.operation {
                Operation::Organize => format!(
                    "Successfully processed {} of {} files",
                    self.succeeded, self.total
                ),
                Operation::Encrypt => format!(
                    "Successfully encrypted {} of {} files/folders",
                    self.succeeded, self.total
                ),
                Operation::Decrypt => format!(
                    "Successfully decrypted {} of {} files/folders",
                    self.succeeded, self.total
                ),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum BatchEvent {
    /// After every task, in completion order.
    Progress { completed: usize, total: usize },
    /// Human readable narration.
    Status { text: String },
    Outcome(TaskOutcome),
    /// Terminal; exactly once per batch.
    Completed(BatchSummary),
}

/// Consumer of batch events. Called from the dispatcher and from workers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BatchEvent);

    fn status(&self, text: String) {
        self.emit(BatchEvent::Status { text });
    }
}

impl EventSink for mpsc::Sender<BatchEvent> {
    fn emit(&self, event: BatchEvent) {
        // a consumer that hung up just stops listening
        let _ = self.send(event);
    }
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BatchEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_counts_every_kind() {
        let mut s = BatchSummary::new(Operation::Organize, 3);
        s.record(&TaskOutcome::Done {
            source: "a".into(),
            destination: "b".into(),
        });
        s.record(&TaskOutcome::Skipped { source: "d".into() });
        s.record(&TaskOutcome::failed("c".into(), &ArrangeError::Integrity));
        assert_eq!((s.succeeded, s.skipped, s.failed), (1, 1, 1));
        assert_eq!(s.completed(), 3);
        assert!(s.success());
        assert_eq!(s.message(), "Successfully processed 1 of 3 files");
    }

    #[test]
    fn failure_kinds() {
        let io = ArrangeError::at("x", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(FailureKind::of(&io), FailureKind::Path);
        assert_eq!(FailureKind::of(&ArrangeError::Integrity), FailureKind::Integrity);
        assert_eq!(
            FailureKind::of(&ArrangeError::Format("bad".into())),
            FailureKind::Other
        );
    }

    #[test]
    fn cancelled_and_aborted_messages() {
        let mut s = BatchSummary::new(Operation::Encrypt, 2);
        s.ending = Ending::Cancelled;
        assert!(s.was_cancelled() && !s.success());
        assert_eq!(s.message(), "Operation cancelled");

        let a = BatchSummary::aborted(
            Operation::Decrypt,
            2,
            &ArrangeError::InvalidRequest("password is empty".into()),
        );
        assert!(!a.success());
        assert_eq!(a.message(), "Error: Invalid request: password is empty");
    }
}
