//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare gli errori di un singolo task
//! - Fornisce messaggi di errore descrittivi con il path coinvolto
//! - Integra con `thiserror` per automatic error conversion
//! - Espone `kind()` per il report dei fallimenti (path + tipo errore)
//!
//! ## Categorie di errori:
//! - `SizeQuery`: Il file sparisce o non è accessibile quando se ne legge la dimensione
//! - `Transform`: Il documento è corrotto o non supportato dal trasformatore
//! - `Io`: Errori di lettura, scrittura, cancellazione o rename
//! - `TaskAborted`: Il task è terminato in modo anomalo (panic)
//! - `Validation`: Errori di validazione input e configurazione
//!
//! ## Esempio:
//! ```ignore
//! let size = tokio::fs::metadata(&path).await
//!     .map_err(|source| OptimizeError::SizeQuery { path: path.clone(), source })?
//!     .len();
//! ```

use std::path::PathBuf;

/// Custom error types for PDF optimization tasks
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("Cannot query size of {path}: {source}")]
    SizeQuery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("IO error while trying to {op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task aborted: {0}")]
    TaskAborted(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl OptimizeError {
    /// Costruisce un errore di I/O legato a un'operazione su un path
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Short name of the error category, used in failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SizeQuery { .. } => "SizeQueryError",
            Self::Transform(_) => "TransformError",
            Self::Io { .. } => "IOError",
            Self::TaskAborted(_) => "TaskError",
            Self::Validation(_) => "ValidationError",
        }
    }
}

impl From<lopdf::Error> for OptimizeError {
    fn from(err: lopdf::Error) -> Self {
        Self::Transform(err.to_string())
    }
}
