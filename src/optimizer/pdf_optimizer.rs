//! # PDF Optimizer Main Orchestrator
//!
//! Orchestratore principale: visita le directory una alla volta, avvia un task
//! per ogni PDF della directory e attende la barriera prima di passare alla
//! directory successiva.

use crate::{
    config::Config,
    file_manager::FileManager,
    optimizer::{
        coordinator::{ConcurrencyCoordinator, DirectoryBatch},
        path_resolver::PathResolver,
        task_optimizer::{FileTask, TaskOutcome, TaskState},
    },
    pdf_processor::PdfProcessor,
    progress::{OptimizationStats, ProgressEvent, Reporter},
    transformer::DocumentTransformer,
};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A task that ended in the `Failed` state
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub path: PathBuf,
    pub kind: &'static str,
    pub message: String,
}

/// Aggregated result of a run, returned to the caller
#[derive(Debug, Default)]
pub struct RunReport {
    pub stats: OptimizationStats,
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    fn record(&mut self, outcome: TaskOutcome) {
        match outcome.state {
            TaskState::Replaced => self.stats.add_replaced(
                outcome.original_size.unwrap_or_default(),
                outcome.candidate_size.unwrap_or_default(),
            ),
            TaskState::Unchanged => {
                self.stats.add_unchanged(outcome.original_size.unwrap_or_default())
            }
            _ => {
                self.stats.add_error();
                let (kind, message) = match outcome.error {
                    Some(error) => (error.kind(), error.to_string()),
                    None => ("TaskError", "task ended without a result".to_string()),
                };
                self.failures.push(TaskFailure {
                    path: outcome.path,
                    kind,
                    message,
                });
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Orchestratore principale
pub struct PdfOptimizer {
    config: Config,
    transformer: Arc<dyn DocumentTransformer>,
    coordinator: Arc<ConcurrencyCoordinator>,
    reporter: Reporter,
}

impl PdfOptimizer {
    /// Crea l'ottimizzatore con il processore PDF di default
    pub fn new(config: Config) -> Result<Self> {
        let reporter = Reporter::for_config(&config);
        let transformer = Arc::new(PdfProcessor::new(config.image_quality));
        Self::with_transformer(config, transformer, reporter)
    }

    /// Crea l'ottimizzatore con un trasformatore e un reporter espliciti
    pub fn with_transformer(
        config: Config,
        transformer: Arc<dyn DocumentTransformer>,
        reporter: Reporter,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = ConcurrencyCoordinator::new(config.workers, reporter.clone());

        Ok(Self {
            config,
            transformer,
            coordinator,
            reporter,
        })
    }

    /// Number of tasks currently executing
    pub fn in_flight(&self) -> usize {
        self.coordinator.current()
    }

    /// Esegue il processo di ottimizzazione sull'albero radicato in `root`
    pub async fn run(&self, root: &Path) -> Result<RunReport> {
        if !root.is_dir() {
            return Err(anyhow::anyhow!("Not a directory: {}", root.display()));
        }

        let start_time = std::time::Instant::now();
        info!("Starting PDF optimization in: {}", root.display());
        info!(
            "Image quality: {} | Workers: {}",
            self.config.image_quality,
            self.coordinator.workers()
        );

        let mut report = RunReport::default();

        for dir in FileManager::directories(root) {
            let files = match FileManager::matching_files(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Skipping directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            if files.is_empty() {
                continue;
            }

            let relative_path = PathResolver::relative_display(root, &dir);
            self.reporter.emit(ProgressEvent::FolderStart {
                relative_path: relative_path.clone(),
                files: files.len(),
            });

            for outcome in self.process_directory(files).await? {
                report.record(outcome);
            }

            self.reporter
                .emit(ProgressEvent::FolderComplete { relative_path });
        }

        self.reporter.finish();
        self.print_final_stats(&report, start_time.elapsed().as_secs_f64());

        Ok(report)
    }

    /// Issues one task per file and waits on the directory barrier
    async fn process_directory(&self, files: Vec<PathBuf>) -> Result<Vec<TaskOutcome>> {
        let mut batch = DirectoryBatch::new();

        for source in files {
            let task = match FileTask::new(source.clone()) {
                Ok(task) => task,
                Err(e) => {
                    batch.push(source.clone(), tokio::spawn(async move {
                        TaskOutcome::aborted(source, e)
                    }));
                    continue;
                }
            };

            // Queue here until a worker slot frees up
            let permit = self.coordinator.acquire_slot().await?;
            let transformer = Arc::clone(&self.transformer);
            let coordinator = Arc::clone(&self.coordinator);
            let reporter = self.reporter.clone();

            debug!("Issuing task for {}", source.display());
            batch.push(
                source,
                tokio::spawn(async move {
                    let _permit = permit;
                    task.run(transformer, coordinator, reporter).await
                }),
            );
        }

        Ok(batch.wait().await)
    }

    /// Stampa statistiche finali
    fn print_final_stats(&self, report: &RunReport, duration: f64) {
        info!("=== Optimization Complete ===");
        info!("{}", report.stats.format_summary());
        info!("Duration: {:.2}s", duration);
        for failure in &report.failures {
            warn!("Failed: {} ({}): {}", failure.path.display(), failure.kind, failure.message);
        }
    }
}
