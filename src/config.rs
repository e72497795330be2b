//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri di ottimizzazione
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `image_quality`: Qualità JPEG delle immagini incorporate (1-100, default: 75)
//! - `workers`: Numero massimo di file elaborati in parallelo (default: core disponibili)
//! - `json_output`: Emette eventi di progresso come JSON (default: false)
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     image_quality: 60,
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Quality used when re-encoding embedded JPEG images
pub const DEFAULT_IMAGE_QUALITY: u8 = 75;

/// Configuration for PDF optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JPEG quality for embedded images (1-100)
    pub image_quality: u8,
    /// Number of files optimized at the same time
    pub workers: usize,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_quality: DEFAULT_IMAGE_QUALITY,
            workers: default_workers(),
            json_output: false,
        }
    }
}

/// Worker di default: uno per core disponibile
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.image_quality == 0 || self.image_quality > 100 {
            return Err(anyhow::anyhow!("Image quality must be between 1 and 100"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Ok(())
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pdf-optimizer").join("config.json"))
    }

    /// Loads an explicitly requested file, which must exist. Without one,
    /// the default location is used when present, otherwise the defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path).await,
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
