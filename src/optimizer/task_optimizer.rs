//! # Task Optimizer Module
//!
//! Worker per l'ottimizzazione di singoli file.
//! Separato dall'orchestratore principale per maggiore modularità.
//!
//! ## Ciclo di vita di un task:
//! `Created → Running → {Replaced | Unchanged | Failed}`
//!
//! 1. Legge la dimensione dell'originale
//! 2. Si registra come in esecuzione presso il coordinatore
//! 3. Legge il documento e lo passa al trasformatore (thread bloccante)
//! 4. Scrive il candidato `optimized_<nome>` accanto all'originale
//! 5. Se il candidato è strettamente più piccolo lo promuove con un rename
//!    atomico, altrimenti lo cancella
//! 6. Il `TaskGuard` chiude la registrazione su ogni percorso di uscita

use crate::{
    error::OptimizeError,
    file_manager::FileManager,
    optimizer::{coordinator::ConcurrencyCoordinator, path_resolver::PathResolver},
    progress::{ProgressEvent, Reporter},
    transformer::DocumentTransformer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, warn};

/// Stato di un task di ottimizzazione
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    /// Candidate was smaller and now holds the original's name
    Replaced,
    /// Candidate was not smaller and has been deleted
    Unchanged,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Replaced | Self::Unchanged | Self::Failed)
    }
}

/// Final result of a task, returned through the directory barrier
#[derive(Debug)]
pub struct TaskOutcome {
    pub path: PathBuf,
    pub original_size: Option<u64>,
    pub candidate_size: Option<u64>,
    pub state: TaskState,
    pub error: Option<OptimizeError>,
}

impl TaskOutcome {
    /// Outcome for a task that never returned one of its own
    pub fn aborted(path: PathBuf, error: OptimizeError) -> Self {
        Self {
            path,
            original_size: None,
            candidate_size: None,
            state: TaskState::Failed,
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == TaskState::Failed
    }
}

/// Unit of work wrapping one file
#[derive(Debug)]
pub struct FileTask {
    source: PathBuf,
    candidate: PathBuf,
    original_size: Option<u64>,
    candidate_size: Option<u64>,
    state: TaskState,
}

impl FileTask {
    /// Crea un task per il file indicato
    pub fn new(source: PathBuf) -> Result<Self, OptimizeError> {
        let candidate = PathResolver::candidate_path(&source)?;
        Ok(Self {
            source,
            candidate,
            original_size: None,
            candidate_size: None,
            state: TaskState::Created,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn candidate(&self) -> &Path {
        &self.candidate
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Runs the task to a terminal state. Never fails: errors end up in the
    /// outcome and are reported as `FileFailed` events.
    pub async fn run(
        mut self,
        transformer: Arc<dyn DocumentTransformer>,
        coordinator: Arc<ConcurrencyCoordinator>,
        reporter: Reporter,
    ) -> TaskOutcome {
        match FileManager::file_size(&self.source).await {
            Ok(size) => {
                self.original_size = Some(size);
                let _guard = coordinator.start();
                self.state = TaskState::Running;
                debug!("Optimizing {} ({})", self.source.display(), FileManager::format_size(size));

                let result = self.execute(transformer, size).await;
                // _guard drops after the outcome has been reported
                self.finish(result, &reporter).await
            }
            Err(source) => {
                let error = OptimizeError::SizeQuery {
                    path: self.source.clone(),
                    source,
                };
                self.finish(Err(error), &reporter).await
            }
        }
    }

    /// Read, transform, write the candidate and apply the swap decision
    async fn execute(
        &mut self,
        transformer: Arc<dyn DocumentTransformer>,
        original_size: u64,
    ) -> Result<TaskState, OptimizeError> {
        let input = fs::read(&self.source)
            .await
            .map_err(|e| OptimizeError::io("read", &self.source, e))?;

        let optimized = tokio::task::spawn_blocking(move || transformer.transform(&input))
            .await
            .map_err(|e| OptimizeError::TaskAborted(e.to_string()))??;

        fs::write(&self.candidate, &optimized)
            .await
            .map_err(|e| OptimizeError::io("write", &self.candidate, e))?;

        let candidate_size = FileManager::file_size(&self.candidate)
            .await
            .map_err(|source| OptimizeError::SizeQuery {
                path: self.candidate.clone(),
                source,
            })?;
        self.candidate_size = Some(candidate_size);

        debug!(
            "Should replace? {} (candidate: {}, original: {})",
            candidate_size < original_size,
            candidate_size,
            original_size
        );

        if candidate_size < original_size {
            FileManager::promote(&self.candidate, &self.source)
                .await
                .map_err(|e| OptimizeError::io("rename", &self.candidate, e))?;
            Ok(TaskState::Replaced)
        } else {
            FileManager::discard(&self.candidate)
                .await
                .map_err(|e| OptimizeError::io("delete", &self.candidate, e))?;
            Ok(TaskState::Unchanged)
        }
    }

    /// Records the terminal state and reports it
    async fn finish(
        &mut self,
        result: Result<TaskState, OptimizeError>,
        reporter: &Reporter,
    ) -> TaskOutcome {
        let error = match result {
            Ok(state) => {
                self.state = state;
                let original_size = self.original_size.unwrap_or_default();
                let optimized_size = self.candidate_size.unwrap_or_default();
                let event = if state == TaskState::Replaced {
                    ProgressEvent::FileCompressed {
                        path: self.source.clone(),
                        original_size,
                        optimized_size,
                    }
                } else {
                    ProgressEvent::FileUnchanged {
                        path: self.source.clone(),
                        original_size,
                        optimized_size,
                    }
                };
                reporter.emit(event);
                None
            }
            Err(error) => {
                self.state = TaskState::Failed;
                self.remove_candidate().await;
                error!("Failed to optimize {}: {}", self.source.display(), error);
                reporter.emit(ProgressEvent::FileFailed {
                    path: self.source.clone(),
                    kind: error.kind().to_string(),
                    message: error.to_string(),
                });
                Some(error)
            }
        };

        TaskOutcome {
            path: self.source.clone(),
            original_size: self.original_size,
            candidate_size: self.candidate_size,
            state: self.state,
            error,
        }
    }

    /// Nessun candidato deve sopravvivere a un task terminato
    async fn remove_candidate(&self) {
        if !fs::try_exists(&self.candidate).await.unwrap_or(false) {
            return;
        }
        if let Err(e) = FileManager::discard(&self.candidate).await {
            warn!("Cannot remove candidate {}: {}", self.candidate.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingSink;
    use tempfile::TempDir;

    /// Produces a fixed-size output made of a repeated byte
    struct FixedSize(usize);

    impl DocumentTransformer for FixedSize {
        fn transform(&self, _input: &[u8]) -> Result<Vec<u8>, OptimizeError> {
            Ok(vec![b'o'; self.0])
        }
    }

    struct Broken;

    impl DocumentTransformer for Broken {
        fn transform(&self, _input: &[u8]) -> Result<Vec<u8>, OptimizeError> {
            Err(OptimizeError::Transform("invalid file header".into()))
        }
    }

    struct Panicking;

    impl DocumentTransformer for Panicking {
        fn transform(&self, _input: &[u8]) -> Result<Vec<u8>, OptimizeError> {
            panic!("transformer exploded")
        }
    }

    /// Swaps the source for a directory mid-transform, so the final rename fails
    struct SourceReplacedByDir(PathBuf);

    impl DocumentTransformer for SourceReplacedByDir {
        fn transform(&self, _input: &[u8]) -> Result<Vec<u8>, OptimizeError> {
            std::fs::remove_file(&self.0).unwrap();
            std::fs::create_dir(&self.0).unwrap();
            std::fs::write(self.0.join("keep"), b"k").unwrap();
            Ok(vec![b'o'; 4])
        }
    }

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        sink: Arc<RecordingSink>,
        reporter: Reporter,
        coordinator: Arc<ConcurrencyCoordinator>,
    }

    fn fixture(size: usize) -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.pdf");
        std::fs::write(&source, vec![b'x'; size]).unwrap();

        let sink = Arc::new(RecordingSink::new());
        let reporter = Reporter::new(sink.clone());
        let coordinator = ConcurrencyCoordinator::new(2, reporter.clone());
        Fixture {
            _temp: temp,
            source,
            sink,
            reporter,
            coordinator,
        }
    }

    async fn run_with(fx: &Fixture, transformer: Arc<dyn DocumentTransformer>) -> TaskOutcome {
        let task = FileTask::new(fx.source.clone()).unwrap();
        assert_eq!(task.state(), TaskState::Created);
        assert_eq!(task.source(), fx.source.as_path());
        assert_eq!(task.candidate(), fx.source.with_file_name("optimized_a.pdf"));
        task.run(transformer, fx.coordinator.clone(), fx.reporter.clone())
            .await
    }

    #[tokio::test]
    async fn test_smaller_candidate_replaces_original() {
        let fx = fixture(1_000_000);
        let outcome = run_with(&fx, Arc::new(FixedSize(600_000))).await;

        assert_eq!(outcome.state, TaskState::Replaced);
        assert!(outcome.state.is_terminal());
        assert_eq!(outcome.original_size, Some(1_000_000));
        assert_eq!(outcome.candidate_size, Some(600_000));
        assert_eq!(std::fs::read(&fx.source).unwrap(), vec![b'o'; 600_000]);
        assert!(!fx.source.with_file_name("optimized_a.pdf").exists());
        assert_eq!(fx.coordinator.current(), 0);

        assert_eq!(
            fx.sink.events().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
            vec!["Compressed to 60.00% of file size: a.pdf", "Files left: 0"]
        );
    }

    #[tokio::test]
    async fn test_larger_candidate_is_discarded() {
        let fx = fixture(50_000);
        let outcome = run_with(&fx, Arc::new(FixedSize(52_000))).await;

        assert_eq!(outcome.state, TaskState::Unchanged);
        assert_eq!(std::fs::read(&fx.source).unwrap(), vec![b'x'; 50_000]);
        assert!(!fx.source.with_file_name("optimized_a.pdf").exists());
        assert_eq!(fx.sink.events()[0].to_string(), "Already compressed: a.pdf");
    }

    #[tokio::test]
    async fn test_equal_size_is_not_an_improvement() {
        let fx = fixture(1_000);
        let outcome = run_with(&fx, Arc::new(FixedSize(1_000))).await;

        assert_eq!(outcome.state, TaskState::Unchanged);
        assert_eq!(std::fs::read(&fx.source).unwrap(), vec![b'x'; 1_000]);
    }

    #[tokio::test]
    async fn test_transform_failure_keeps_original_and_releases_counter() {
        let fx = fixture(2_000);
        let leftover = fx.source.with_file_name("optimized_a.pdf");
        std::fs::write(&leftover, b"stale").unwrap();

        let outcome = run_with(&fx, Arc::new(Broken)).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("TransformError"));
        assert_eq!(std::fs::read(&fx.source).unwrap(), vec![b'x'; 2_000]);
        assert!(!leftover.exists());
        assert_eq!(fx.coordinator.current(), 0);

        let events = fx.sink.events();
        assert!(matches!(
            &events[0],
            ProgressEvent::FileFailed { kind, .. } if kind == "TransformError"
        ));
        assert_eq!(events[1], ProgressEvent::FilesLeft { remaining: 0 });
    }

    #[tokio::test]
    async fn test_transformer_panic_is_a_failure() {
        let fx = fixture(10);
        let outcome = run_with(&fx, Arc::new(Panicking)).await;

        assert_eq!(outcome.state, TaskState::Failed);
        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("TaskError"));
        assert_eq!(fx.coordinator.current(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_is_size_query_error() {
        let fx = fixture(10);
        std::fs::remove_file(&fx.source).unwrap();

        let outcome = run_with(&fx, Arc::new(FixedSize(1))).await;

        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("SizeQueryError"));
        assert_eq!(outcome.original_size, None);
        // never registered as running, so no "Files left" line
        assert_eq!(fx.sink.events().len(), 1);
        assert_eq!(fx.coordinator.current(), 0);
    }

    fn files_left_count(sink: &RecordingSink) -> usize {
        sink.events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::FilesLeft { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_candidate_write_failure_is_io_error() {
        let fx = fixture(3_000);
        // a non-empty directory where the candidate should go makes the write fail
        let blocker = fx.source.with_file_name("optimized_a.pdf");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("inside"), b"i").unwrap();

        let outcome = run_with(&fx, Arc::new(FixedSize(100))).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("IOError"));
        assert_eq!(outcome.candidate_size, None);
        assert_eq!(std::fs::read(&fx.source).unwrap(), vec![b'x'; 3_000]);
        assert!(!blocker.is_file());
        assert_eq!(std::fs::read(blocker.join("inside")).unwrap(), b"i");
        assert_eq!(fx.coordinator.current(), 0);
        assert_eq!(files_left_count(&fx.sink), 1);
        assert!(matches!(
            &fx.sink.events()[0],
            ProgressEvent::FileFailed { kind, .. } if kind == "IOError"
        ));
    }

    #[tokio::test]
    async fn test_promote_failure_removes_candidate() {
        let fx = fixture(3_000);
        let outcome = run_with(&fx, Arc::new(SourceReplacedByDir(fx.source.clone()))).await;

        assert_eq!(outcome.error.as_ref().map(|e| e.kind()), Some("IOError"));
        assert_eq!(outcome.candidate_size, Some(4));
        assert!(!fx.source.with_file_name("optimized_a.pdf").exists());
        assert_eq!(std::fs::read(fx.source.join("keep")).unwrap(), b"k");
        assert_eq!(fx.coordinator.current(), 0);
        assert_eq!(files_left_count(&fx.sink), 1);
    }
}
