//! Work dispatcher.
//!
//! Entries are handed to a bounded rayon pool one at a time; at most `W`
//! tasks are in flight, so a cancellation request takes effect at the next
//! free worker slot. Outcomes come back over a channel and are reported in
//! completion order.

use crate::config::EngineConfig;
use crate::error::{ArrangeError, Result};
use crate::event::{BatchEvent, BatchSummary, Ending, EventSink, TaskOutcome};
use crate::naming::NameClaims;
use crate::pipeline::{Job, Step, TaskContext, display_name};
use crate::request::BatchRequest;
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Shared stop request. Setting it twice is harmless.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State every task of one batch sees.
struct Shared {
    job: Job,
    claims: NameClaims,
    sink: Arc<dyn EventSink>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Shared {
    fn run_one(&self, entry: &Path) -> TaskOutcome {
        debug!("task start: {}", entry.display());
        let cx = TaskContext {
            claims: &self.claims,
            sink: self.sink.as_ref(),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| self.job.execute(entry, &cx))) {
            Ok(Ok(Step::Wrote(destination))) => TaskOutcome::Done {
                source: entry.to_path_buf(),
                destination,
            },
            Ok(Ok(Step::Skipped)) => TaskOutcome::Skipped {
                source: entry.to_path_buf(),
            },
            Ok(Err(e)) => TaskOutcome::failed(entry.to_path_buf(), &e),
            Err(payload) => TaskOutcome::failed(
                entry.to_path_buf(),
                &ArrangeError::TaskPanicked(panic_message(payload)),
            ),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn abort(
        &self,
        request: &BatchRequest,
        sink: &dyn EventSink,
        e: &ArrangeError,
    ) -> BatchSummary {
        warn!("batch aborted: {e}");
        let summary = BatchSummary::aborted(request.mode.operation(), request.len(), e);
        sink.emit(BatchEvent::Completed(summary.clone()));
        summary
    }

    /// Run `request` to completion on the calling thread.
    ///
    /// Per-entry failures never end the batch. An invalid request ends it
    /// before any task starts with an aborted summary; only a worker pool
    /// that cannot be built is returned as `Err`. Either way exactly one
    /// `Completed` event is emitted.
    pub fn run(
        &self,
        request: &BatchRequest,
        cancel: &CancellationFlag,
        sink: Arc<dyn EventSink>,
    ) -> Result<BatchSummary> {
        let operation = request.mode.operation();
        let total = request.len();
        let workers = self.config.workers();
        info!("{:?} batch: {} entries, {} workers", operation, total, workers);

        let job = match request.validate().and_then(|_| Job::prepare(request, &self.config)) {
            Ok(job) => job,
            Err(e) => return Ok(self.abort(request, sink.as_ref(), &e)),
        };
        let pool = match ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("arrange-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                let e = ArrangeError::from(e);
                self.abort(request, sink.as_ref(), &e);
                return Err(e);
            }
        };

        let shared = Arc::new(Shared {
            job,
            claims: NameClaims::new(),
            sink: Arc::clone(&sink),
        });
        let (tx, rx) = mpsc::channel::<TaskOutcome>();
        let mut summary = BatchSummary::new(operation, total);
        let mut in_flight = 0usize;
        let mut stopped = false;

        loop {
            while !stopped && in_flight < workers {
                let Some(entry) = request.entries.get(summary.submitted) else {
                    break;
                };
                if cancel.is_cancelled() {
                    info!("cancelled after {} of {} submissions", summary.submitted, total);
                    summary.ending = Ending::Cancelled;
                    stopped = true;
                    break;
                }
                let shared = Arc::clone(&shared);
                let tx = tx.clone();
                let entry = entry.clone();
                pool.spawn(move || {
                    let outcome = shared.run_one(&entry);
                    // the dispatcher only hangs up after draining every task
                    let _ = tx.send(outcome);
                });
                summary.submitted += 1;
                in_flight += 1;
            }
            if in_flight == 0 {
                break;
            }

            let Ok(outcome) = rx.recv() else {
                warn!("{} tasks never reported", in_flight);
                break;
            };
            in_flight -= 1;
            summary.record(&outcome);
            if let TaskOutcome::Failed { source, error, .. } = &outcome {
                warn!("{} failed: {}", source.display(), error);
                sink.status(format!("Error: {} - {}", display_name(source), error));
            }
            sink.emit(BatchEvent::Outcome(outcome));
            sink.emit(BatchEvent::Progress {
                completed: summary.completed(),
                total,
            });
        }

        info!(
            "batch finished: {} succeeded, {} skipped, {} failed of {}",
            summary.succeeded, summary.skipped, summary.failed, total
        );
        sink.emit(BatchEvent::Completed(summary.clone()));
        Ok(summary)
    }

    /// Run `request` on a background thread; events arrive on the handle.
    pub fn spawn(&self, request: BatchRequest) -> Result<BatchHandle> {
        let (tx, events) = mpsc::channel::<BatchEvent>();
        let cancel = CancellationFlag::new();
        let flag = cancel.clone();
        let this = self.clone();
        let join = thread::Builder::new()
            .name("arrange-dispatch".into())
            .spawn(move || {
                let sink: Arc<dyn EventSink> = Arc::new(tx);
                this.run(&request, &flag, sink)
            })
            .map_err(|e| ArrangeError::ResourceExhausted(e.to_string()))?;
        Ok(BatchHandle {
            events,
            cancel,
            join,
        })
    }
}

/// A batch running in the background.
pub struct BatchHandle {
    events: mpsc::Receiver<BatchEvent>,
    cancel: CancellationFlag,
    join: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    /// Ends after `Completed` once every task has let go of its sender.
    pub fn events(&self) -> &mpsc::Receiver<BatchEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn wait(self) -> Result<BatchSummary> {
        self.join
            .join()
            .map_err(|p| ArrangeError::TaskPanicked(panic_message(p)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NullSink;
    use crate::request::{OrganizeBy, OrganizeParams, Password};
    use std::fs;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<BatchEvent>>);

    impl EventSink for Collect {
        fn emit(&self, event: BatchEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn flag_is_idempotent() {
        let f = CancellationFlag::new();
        assert!(!f.is_cancelled());
        f.cancel();
        f.cancel();
        assert!(f.clone().is_cancelled());
    }

    #[test]
    fn invalid_request_completes_once_without_tasks() {
        let sink = Arc::new(Collect::default());
        let req = BatchRequest::encrypt(vec!["x".into()], Password::new(""));
        let summary = Dispatcher::default()
            .run(&req, &CancellationFlag::new(), sink.clone())
            .unwrap();
        assert!(matches!(summary.ending, Ending::Aborted(_)));
        assert_eq!(summary.submitted, 0);
        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BatchEvent::Completed(_)));
    }

    #[test]
    fn cancelled_before_start_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("a.txt");
        fs::write(&f, b"a").unwrap();
        let req = BatchRequest::organize(
            vec![f],
            OrganizeParams {
                organize_by: OrganizeBy::ByType,
                destination_root: None,
            },
        );
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let summary = Dispatcher::default()
            .run(&req, &cancel, Arc::new(NullSink))
            .unwrap();
        assert!(summary.was_cancelled());
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.message(), "Operation cancelled");
    }

    #[test]
    fn progress_counts_up_to_total() {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<_> = (0..4)
            .map(|i| {
                let p = dir.path().join(format!("f{i}.txt"));
                fs::write(&p, b"x").unwrap();
                p
            })
            .collect();
        let req = BatchRequest::encrypt(entries, Password::new("pw"));
        let sink = Arc::new(Collect::default());
        let summary = Dispatcher::new(EngineConfig {
            max_workers: Some(2),
            ..Default::default()
        })
        .run(&req, &CancellationFlag::new(), sink.clone())
        .unwrap();
        assert_eq!(summary.succeeded, 4);

        let progress: Vec<_> = sink
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { completed, total } => Some((*completed, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    }

    #[test]
    fn panics_become_failed_outcomes() {
        let msg = panic_message(Box::new("boom"));
        assert_eq!(msg, "boom");
        let msg = panic_message(Box::new(String::from("bang")));
        assert_eq!(msg, "bang");
    }
}
