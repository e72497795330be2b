//! # Concurrency Coordinator Module
//!
//! Gestione della concorrenza condivisa da tutti i task di ottimizzazione.
//!
//! ## Responsabilità:
//! - Contatore globale dei task in esecuzione (`AtomicUsize`)
//! - `TaskGuard`: registra l'inizio di un task e ne garantisce la fine al drop,
//!   anche su errore o panic, così il contatore torna sempre a zero
//! - Pool limitato di slot di lavoro (semaforo) per non saturare le risorse
//!   su cartelle con moltissimi file
//! - `DirectoryBatch`: barriera per cartella che attende tutti i task emessi
//!
//! ## Esempio:
//! ```ignore
//! let coordinator = ConcurrencyCoordinator::new(4, reporter);
//! let permit = coordinator.acquire_slot().await?;
//! let guard = coordinator.start();
//! // ... lavoro ...
//! drop(guard); // "Files left: N"
//! ```

use crate::error::OptimizeError;
use crate::optimizer::task_optimizer::TaskOutcome;
use crate::progress::{ProgressEvent, Reporter};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Tracks in-flight tasks process-wide and hands out worker slots
pub struct ConcurrencyCoordinator {
    in_flight: AtomicUsize,
    // Serializes finishes so "Files left" lines come out in decrement order
    finish_lock: Mutex<()>,
    slots: Arc<Semaphore>,
    workers: usize,
    reporter: Reporter,
}

impl ConcurrencyCoordinator {
    pub fn new(workers: usize, reporter: Reporter) -> Arc<Self> {
        let workers = workers.max(1);
        debug!("Concurrency: {} worker slots", workers);

        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            finish_lock: Mutex::new(()),
            slots: Arc::new(Semaphore::new(workers)),
            workers,
            reporter,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Waits for a free worker slot; the slot is released when the permit drops
    pub async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        Ok(self.slots.clone().acquire_owned().await?)
    }

    /// Registers a running task; the returned guard finishes it on drop
    pub fn start(self: &Arc<Self>) -> TaskGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            coordinator: Arc::clone(self),
        }
    }

    fn finish(&self) {
        let _serial = self.finish_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.reporter.emit(ProgressEvent::FilesLeft {
            remaining: previous.saturating_sub(1),
        });
    }

    /// Number of tasks currently executing
    pub fn current(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Registrazione di un task in esecuzione
pub struct TaskGuard {
    coordinator: Arc<ConcurrencyCoordinator>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.coordinator.finish();
    }
}

/// Tasks issued while visiting one directory, plus the barrier waiting on them
#[derive(Default)]
pub struct DirectoryBatch {
    tasks: Vec<(PathBuf, JoinHandle<TaskOutcome>)>,
}

impl DirectoryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: PathBuf, handle: JoinHandle<TaskOutcome>) {
        self.tasks.push((source, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Blocks until every task of the batch has terminated.
    ///
    /// A task that panicked is reported as a failed outcome for its file.
    pub async fn wait(self) -> Vec<TaskOutcome> {
        let (sources, handles): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        sources
            .into_iter()
            .zip(results)
            .map(|(source, result)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task for {} aborted: {}", source.display(), e);
                    TaskOutcome::aborted(source, OptimizeError::TaskAborted(e.to_string()))
                }
            })
            .collect()
    }
}
