//! # Progress Reporting and Statistics Module
//!
//! Questo modulo gestisce gli eventi di progresso e le statistiche di ottimizzazione.
//!
//! ## Responsabilità:
//! - Definisce `ProgressEvent`, un evento per ogni passaggio osservabile del run
//! - Rende gli eventi come testo su console o come JSON (una riga per evento)
//! - Spinner `indicatif` con la cartella in lavorazione
//! - Tracking statistiche cumulative del run (`OptimizationStats`)
//!
//! ## Componenti principali:
//! - `Reporter`: Handle clonabile condiviso da walker, task e coordinatore
//! - `ProgressSink`: Destinazione degli eventi (`ConsoleSink`, `JsonSink`, `RecordingSink`)
//! - `OptimizationStats`: Contatori e byte risparmiati
//!
//! ## Testo su console:
//! ```text
//! 5 files in folder: sub
//! Compressed to 60.00% of file size: a.pdf
//! Files left: 4
//! Already compressed: b.pdf
//! Files left: 3
//! Failed to optimize /docs/sub/c.pdf (TransformError): invalid file header
//! Files left: 2
//! Folder sub complete.
//! ```
//!
//! ## Esempio JSON:
//! ```json
//! {"type":"folder_start","relative_path":"sub","files":5}
//! ```

use crate::config::Config;
use crate::file_manager::FileManager;
use crate::optimizer::PathResolver;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tipo di evento di progresso
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// A folder with matching files is about to be processed
    #[serde(rename = "folder_start")]
    FolderStart { relative_path: String, files: usize },

    /// The candidate was smaller and replaced the original
    #[serde(rename = "file_compressed")]
    FileCompressed {
        path: PathBuf,
        original_size: u64,
        optimized_size: u64,
    },

    /// The candidate was not smaller; the original is untouched
    #[serde(rename = "file_unchanged")]
    FileUnchanged {
        path: PathBuf,
        original_size: u64,
        optimized_size: u64,
    },

    #[serde(rename = "file_failed")]
    FileFailed {
        path: PathBuf,
        kind: String,
        message: String,
    },

    /// Tasks still running across all folders after one finished
    #[serde(rename = "files_left")]
    FilesLeft { remaining: usize },

    #[serde(rename = "folder_complete")]
    FolderComplete { relative_path: String },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FolderStart {
                relative_path,
                files,
            } => write!(f, "{} files in folder: {}", files, relative_path),
            Self::FileCompressed {
                path,
                original_size,
                optimized_size,
            } => {
                let ratio = if *original_size > 0 {
                    *optimized_size as f64 / *original_size as f64 * 100.0
                } else {
                    0.0
                };
                write!(
                    f,
                    "Compressed to {:.2}% of file size: {}",
                    ratio,
                    PathResolver::display_name(path)
                )
            }
            Self::FileUnchanged { path, .. } => {
                write!(f, "Already compressed: {}", PathResolver::display_name(path))
            }
            Self::FileFailed {
                path,
                kind,
                message,
            } => write!(f, "Failed to optimize {} ({}): {}", path.display(), kind, message),
            Self::FilesLeft { remaining } => write!(f, "Files left: {}", remaining),
            Self::FolderComplete { relative_path } => {
                write!(f, "Folder {} complete.", relative_path)
            }
        }
    }
}

/// Destination of progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);

    /// Called once at the end of a run
    fn finish(&self) {}
}

/// Console output: one line per event, above a spinner showing the active folder
pub struct ConsoleSink {
    bar: ProgressBar,
}

impl ConsoleSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: &ProgressEvent) {
        // suspend() also prints when the spinner is hidden (stdout not a tty)
        self.bar.suspend(|| println!("{}", event));

        match event {
            ProgressEvent::FolderStart { relative_path, .. } => {
                self.bar.set_message(format!("Optimizing {}", relative_path));
            }
            ProgressEvent::FolderComplete { .. } => self.bar.set_message(""),
            _ => {}
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// JSON lines on stdout, for programmatic consumers
pub struct JsonSink;

impl ProgressSink for JsonSink {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            println!("{}", json);
        }
    }
}

/// Keeps every event in memory, in emission order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Handle clonabile verso il sink degli eventi
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ProgressSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    /// Sceglie console o JSON in base alla configurazione
    pub fn for_config(config: &Config) -> Self {
        if config.json_output {
            Self::new(Arc::new(JsonSink))
        } else {
            Self::new(Arc::new(ConsoleSink::new()))
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.sink.emit(&event);
    }

    pub fn finish(&self) {
        self.sink.finish();
    }
}

/// Statistics tracker for optimization results
#[derive(Debug, Default, Clone)]
pub struct OptimizationStats {
    pub files_processed: usize,
    pub files_replaced: usize,
    pub files_unchanged: usize,
    pub total_bytes_saved: u64,
    pub total_original_size: u64,
    pub errors: usize,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_replaced(&mut self, original_size: u64, new_size: u64) {
        self.files_processed += 1;
        self.files_replaced += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn add_unchanged(&mut self, original_size: u64) {
        self.files_processed += 1;
        self.files_unchanged += 1;
        self.total_original_size += original_size;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(
            self.total_original_size,
            self.total_original_size - self.total_bytes_saved,
        )
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Compressed: {} | Already compressed: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_replaced,
            self.files_unchanged,
            self.errors,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
