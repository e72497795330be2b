//! # Space PDF Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per i task
//! - `file_manager`: Visita delle directory e operazioni sui file
//! - `transformer`: Trait di confine verso il trasformatore dei documenti
//! - `pdf_processor`: Trasformatore PDF di default (immagini, content stream, deduplicazione)
//! - `optimizer`: Orchestratore, task per file, coordinamento della concorrenza
//! - `progress`: Eventi di progresso e statistiche
//!
//! ## Utilizzo:
//! ```ignore
//! use space_pdf_optimizer::{Config, PdfOptimizer};
//!
//! let optimizer = PdfOptimizer::new(Config::default())?;
//! let report = optimizer.run(&path).await?;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod optimizer;
pub mod pdf_processor;
pub mod progress;
pub mod transformer;

pub use config::Config;
pub use error::OptimizeError;
pub use optimizer::{PdfOptimizer, RunReport};
pub use pdf_processor::PdfProcessor;
pub use transformer::DocumentTransformer;
