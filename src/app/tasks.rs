use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::{TaskKind, TaskReport};

/// Runs each user operation on its own worker thread and reports every completion on one
/// channel. At most one task of a given kind is in flight at a time.
#[derive(Clone)]
pub struct TaskRunner {
    in_flight: Arc<Mutex<HashSet<TaskKind>>>,
    reports: Sender<TaskReport>,
}

pub struct TaskHandle<T> {
    trace_id: String,
    join: JoinHandle<Result<T, AppError>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the worker finishes.
    pub fn wait(self) -> Result<T, AppError> {
        let trace_id = self.trace_id;
        self.join
            .join()
            .unwrap_or_else(|_| Err(AppError::system("Worker thread panicked", trace_id)))
    }
}

struct InFlight {
    set: Arc<Mutex<HashSet<TaskKind>>>,
    kind: TaskKind,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

impl TaskRunner {
    pub fn new() -> (Self, Receiver<TaskReport>) {
        let (reports, receiver) = mpsc::channel();
        (
            Self {
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                reports,
            },
            receiver,
        )
    }

    pub fn submit<T, F>(&self, kind: TaskKind, trace_id: String, op: F) -> Result<TaskHandle<T>, AppError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AppError> + Send + 'static,
    {
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(kind) {
                return Err(AppError::busy(
                    format!("{kind:?} is already running"),
                    trace_id,
                ));
            }
        }
        let guard = InFlight {
            set: Arc::clone(&self.in_flight),
            kind,
        };

        let reports = self.reports.clone();
        let worker_trace = trace_id.clone();
        let spawned = thread::Builder::new()
            .name(format!("task-{kind:?}").to_lowercase())
            .spawn(move || {
                let started_at = Utc::now();
                let result = catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|_| {
                    Err(AppError::system("Operation panicked", worker_trace.clone()))
                });
                drop(guard);

                let report = TaskReport {
                    kind,
                    trace_id: worker_trace.clone(),
                    started_at,
                    finished_at: Utc::now(),
                    error: result.as_ref().err().cloned(),
                };
                match &report.error {
                    None => info!(trace_id = %worker_trace, kind = ?kind, "task finished"),
                    Some(err) => warn!(trace_id = %worker_trace, kind = ?kind, error = %err, "task failed"),
                }
                let _ = reports.send(report);
                result
            });

        match spawned {
            Ok(join) => Ok(TaskHandle {
                trace_id,
                join,
            }),
            Err(err) => Err(AppError::system(format!("Failed to start worker: {err}"), trace_id)),
        }
    }
}
