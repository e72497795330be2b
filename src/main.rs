//! # Space PDF Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file JSON + override da CLI)
//! - Avvio dell'optimizer e codice di uscita
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (directory, quality, workers, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica la configurazione e applica gli override
//! 4. Ottimizza l'albero di directory
//! 5. Esce con codice non-zero se almeno un file è fallito
//!
//! ## Esempio di utilizzo:
//! ```bash
//! pdf-optimizer /path/to/docs --quality 75 --workers 8 --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use space_pdf_optimizer::{Config, PdfOptimizer};

#[derive(Parser)]
#[command(name = "pdf-optimizer")]
#[command(about = "Shrink PDF files in place, keeping only smaller results")]
struct Args {
    /// Directory to scan (defaults to the current directory)
    directory: Option<PathBuf>,

    /// JPEG quality for embedded images (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Number of files optimized in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Emit progress as JSON lines
    #[arg(long)]
    json: bool,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` when some files could not be optimized
async fn run() -> Result<bool> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load(args.config.as_deref()).await?;
    if let Some(quality) = args.quality {
        config.image_quality = quality;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.json_output |= args.json;

    let directory = match args.directory {
        Some(directory) => directory,
        None => std::env::current_dir()?,
    };
    if !directory.is_dir() {
        return Err(anyhow::anyhow!("Directory does not exist: {}", directory.display()));
    }

    let optimizer = PdfOptimizer::new(config)?;
    let report = optimizer.run(&directory).await?;

    Ok(!report.has_failures())
}
