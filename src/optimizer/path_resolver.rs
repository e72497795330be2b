//! # Path Resolution Module
//!
//! Centralizza la logica di calcolo dei path: nome del candidato accanto
//! all'originale e path relativo delle cartelle per i messaggi di progresso.

use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use std::path::{Path, PathBuf};

/// Utility per calcolare i path in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Candidate path: same directory, `optimized_` + original file name
    pub fn candidate_path(source: &Path) -> Result<PathBuf, OptimizeError> {
        let file_name = source.file_name().ok_or_else(|| {
            OptimizeError::Validation(format!("Invalid file name: {}", source.display()))
        })?;

        Ok(source.with_file_name(FileManager::candidate_name(file_name)))
    }

    /// File name used in progress messages
    pub fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    /// Path of `dir` relative to `root`, `.` for the root itself
    pub fn relative_display(root: &Path, dir: &Path) -> String {
        match dir.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => dir.display().to_string(),
        }
    }
}
