//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery dei documenti.
//!
//! ## Responsabilità:
//! - Visita top-down delle directory (pre-order, ordinata per nome)
//! - Selezione dei file con estensione `.pdf` (suffisso esatto, case-sensitive)
//! - Riconoscimento dei candidati `optimized_*` rimasti da run interrotti
//! - Operazioni sui file usate dalla politica di swap
//! - Formattazione human-readable delle dimensioni
//!
//! ## Operazioni sui file:
//! - `directories()`: Directory da visitare, in ordine di attraversamento
//! - `matching_files()`: File da ottimizzare in una singola directory
//! - `file_size()`: Dimensione di un file su disco
//! - `promote()`: Rename atomico del candidato sopra l'originale
//! - `discard()`: Rimozione del candidato
//!
//! ## Sicurezza operazioni:
//! - Lo swap è un singolo rename nella stessa directory: in caso di crash resta
//!   l'originale intatto oppure un candidato orfano, mai una perdita di dati
//!
//! ## Esempio:
//! ```ignore
//! for dir in FileManager::directories(root) {
//!     let files = FileManager::matching_files(&dir)?;
//! }
//! ```

use anyhow::Result;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Suffix identifying the documents to optimize
pub const TARGET_EXTENSION: &str = ".pdf";

/// Prefix of the candidate file written beside each original
pub const CANDIDATE_PREFIX: &str = "optimized_";

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Directories under `root` (root included) in pre-order, siblings sorted by name.
    ///
    /// The walk is lazy: entries are read as the caller advances, so a
    /// directory's subtree is listed only after the caller is done with it.
    pub fn directories(root: &Path) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.into_path())
    }

    /// Matching files directly inside `dir`, sorted by name.
    ///
    /// Symlinks to regular files are listed like the files themselves.
    /// Leftover candidates whose original still exists are left out: the
    /// original's own task overwrites them.
    pub fn matching_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut targets = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !Self::is_file_entry(&entry) || !Self::is_target(entry.path()) {
                continue;
            }
            targets.push(entry.into_path());
        }

        // Names the sibling tasks will write their candidates to
        let candidate_names: HashSet<OsString> = targets
            .iter()
            .filter_map(|path| path.file_name())
            .map(Self::candidate_name)
            .collect();

        let files = targets
            .into_iter()
            .filter(|path| {
                let leftover = path
                    .file_name()
                    .is_some_and(|name| candidate_names.contains(name));
                if leftover {
                    debug!("Leftover candidate will be overwritten: {}", path.display());
                }
                !leftover
            })
            .collect();

        Ok(files)
    }

    fn is_file_entry(entry: &DirEntry) -> bool {
        entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
    }

    /// Check if a file name ends with the target extension (case-sensitive).
    ///
    /// Compares raw name bytes, so names that are not valid UTF-8 still match.
    pub fn is_target(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.as_encoded_bytes().ends_with(TARGET_EXTENSION.as_bytes()))
            .unwrap_or(false)
    }

    /// `optimized_` + `name`
    pub fn candidate_name(name: &OsStr) -> OsString {
        let mut candidate = OsString::from(CANDIDATE_PREFIX);
        candidate.push(name);
        candidate
    }

    /// Get the size of a file in bytes
    pub async fn file_size(path: &Path) -> std::io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Replace `original` with `candidate` in one rename.
    ///
    /// Both paths must live in the same directory.
    pub async fn promote(candidate: &Path, original: &Path) -> std::io::Result<()> {
        fs::rename(candidate, original).await
    }

    /// Remove a candidate file
    pub async fn discard(candidate: &Path) -> std::io::Result<()> {
        fs::remove_file(candidate).await
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::write(path, b"%PDF-1.4").unwrap();
    }

    #[test]
    fn test_is_target_is_case_sensitive() {
        assert!(FileManager::is_target(Path::new("/docs/a.pdf")));
        assert!(!FileManager::is_target(Path::new("/docs/a.PDF")));
        assert!(!FileManager::is_target(Path::new("/docs/a.pdf.bak")));
        assert!(!FileManager::is_target(Path::new("/docs/notes.txt")));
    }

    #[test]
    fn test_matching_files_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(&dir.join("b.pdf"));
        touch(&dir.join("a.pdf"));
        touch(&dir.join("c.PDF"));
        touch(&dir.join("readme.txt"));
        std::fs::create_dir(dir.join("nested.pdf")).unwrap();
        touch(&dir.join("nested.pdf").join("inner.pdf"));

        let files = FileManager::matching_files(dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_leftover_candidates_are_skipped_only_with_original() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(&dir.join("a.pdf"));
        touch(&dir.join("optimized_a.pdf"));
        touch(&dir.join("optimized_lonely.pdf"));

        let files = FileManager::matching_files(dir).unwrap();
        assert_eq!(files, vec![dir.join("a.pdf"), dir.join("optimized_lonely.pdf")]);
    }

    #[test]
    fn test_leftover_chain_keeps_only_the_original() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        touch(&dir.join("a.pdf"));
        touch(&dir.join("optimized_a.pdf"));
        touch(&dir.join("optimized_optimized_a.pdf"));

        let files = FileManager::matching_files(dir).unwrap();
        assert_eq!(files, vec![dir.join("a.pdf")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_matched() {
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let name = OsStr::from_bytes(b"r\xe9sum\xe9.pdf");
        touch(&dir.join(name));
        touch(&dir.join(FileManager::candidate_name(name)));

        assert!(FileManager::is_target(&dir.join(name)));
        let files = FileManager::matching_files(dir).unwrap();
        assert_eq!(files, vec![dir.join(name)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_listed() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let elsewhere = TempDir::new().unwrap();
        let target = elsewhere.path().join("real.pdf");
        touch(&target);
        std::os::unix::fs::symlink(&target, dir.join("link.pdf")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("gone.pdf"), dir.join("dangling.pdf")).unwrap();

        let files = FileManager::matching_files(dir).unwrap();
        assert_eq!(files, vec![dir.join("link.pdf")]);
    }

    #[test]
    fn test_directories_pre_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::create_dir_all(root.join("a").join("deep")).unwrap();
        touch(&root.join("a").join("x.pdf"));

        let dirs: Vec<_> = FileManager::directories(root).collect();
        assert_eq!(
            dirs,
            vec![
                root.to_path_buf(),
                root.join("a"),
                root.join("a").join("deep"),
                root.join("b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_promote_replaces_original() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join("a.pdf");
        let candidate = temp.path().join("optimized_a.pdf");
        std::fs::write(&original, vec![0u8; 100]).unwrap();
        std::fs::write(&candidate, vec![1u8; 40]).unwrap();

        FileManager::promote(&candidate, &original).await.unwrap();

        assert!(!candidate.exists());
        assert_eq!(FileManager::file_size(&original).await.unwrap(), 40);
        assert_eq!(std::fs::read(&original).unwrap(), vec![1u8; 40]);
    }

    #[tokio::test]
    async fn test_file_size_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(FileManager::file_size(&temp.path().join("gone.pdf")).await.is_err());
    }

    #[test]
    fn test_format_size_and_reduction() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(1024 * 1024), "1.00 MB");
        assert_eq!(FileManager::calculate_reduction(1000, 600), 40.0);
        assert_eq!(FileManager::calculate_reduction(0, 10), 0.0);
    }
}
