//! # Document Transformer Boundary
//!
//! Confine verso il componente che riduce la dimensione dei documenti.
//! L'orchestrazione conosce solo questo trait: byte in ingresso, byte
//! ottimizzati in uscita. L'implementazione di default è
//! [`PdfProcessor`](crate::pdf_processor::PdfProcessor).

use crate::error::OptimizeError;

/// Turns the raw bytes of a document into the bytes of an equivalent,
/// usually smaller, document.
///
/// Implementations are called from blocking worker threads and must be
/// shareable across them. Malformed or unsupported input is reported as
/// [`OptimizeError::Transform`].
pub trait DocumentTransformer: Send + Sync {
    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, OptimizeError>;
}
