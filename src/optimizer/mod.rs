//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `pdf_optimizer`: Orchestratore principale e visita delle directory
//! - `task_optimizer`: Worker per singoli file e politica di swap
//! - `coordinator`: Contatore globale, slot di lavoro e barriera per cartella
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod coordinator;
pub mod path_resolver;
pub mod pdf_optimizer;
pub mod task_optimizer;

pub use coordinator::{ConcurrencyCoordinator, DirectoryBatch, TaskGuard};
pub use path_resolver::PathResolver;
pub use pdf_optimizer::{PdfOptimizer, RunReport, TaskFailure};
pub use task_optimizer::{FileTask, TaskOutcome, TaskState};
