//! Error types for the edgequake-statement library.
//!
//! Every failure in this crate is fatal for the run: there is no partial
//! result, no retry and no resumption. [`StatementError`] is therefore the
//! only error type, returned as `Err(StatementError)` from every public
//! entry point.
//!
//! A document that the classifier rejects is **not** an error. It is a normal
//! termination reported as [`crate::output::Outcome::Rejected`].

use crate::model::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-statement library.
#[derive(Debug, Error)]
pub enum StatementError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a file path nor an HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Rasterizer errors ─────────────────────────────────────────────────
    /// The external rasterizer is missing, exited non-zero or produced
    /// output that could not be used.
    #[error("Rasterizer '{tool}' failed: {detail}\nInstall poppler-utils or pass --rasterizer <PATH>.")]
    ExternalToolFailure { tool: String, detail: String },

    /// The external rasterizer did not finish within the configured timeout.
    #[error("Rasterizer '{tool}' timed out after {secs}s")]
    RasterizerTimeout { tool: String, secs: u64 },

    // ── PDF text errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library for text extraction.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// Rendered images and extracted texts disagree on the page layout.
    #[error("Page mismatch: {images} rendered images vs {texts} text pages ({detail})")]
    PageCountMismatch {
        images: usize,
        texts: usize,
        detail: String,
    },

    // ── Inference errors ──────────────────────────────────────────────────
    /// The inference reply did not match the schema requested for `stage`.
    #[error("{stage} response does not match its schema: {detail}")]
    SchemaValidationFailure { stage: Stage, detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error during {stage}: {message}")]
    LlmApiError { stage: Stage, message: String },

    /// The LLM API call did not return in time.
    #[error("{stage} request timed out after {secs}s")]
    ApiTimeout { stage: Stage, secs: u64 },

    // ── Ledger errors ─────────────────────────────────────────────────────
    /// A ledger mixes currencies; summing the raw values would be meaningless.
    #[error("Ledger mixes currencies: expected {expected}, found {found} ({location})")]
    MixedCurrency {
        expected: String,
        found: String,
        location: String,
    },

    /// A ledger's amounts are too large to sum exactly.
    #[error("Ledger amounts overflow the decimal range ({location})")]
    BalanceOverflow { location: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StatementError {
    pub(crate) fn tool_failure(tool: &str, detail: impl Into<String>) -> Self {
        StatementError::ExternalToolFailure {
            tool: tool.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn schema(stage: Stage, detail: impl Into<String>) -> Self {
        StatementError::SchemaValidationFailure {
            stage,
            detail: detail.into(),
        }
    }
}
