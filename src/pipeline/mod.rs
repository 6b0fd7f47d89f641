//! Pipeline stages for statement analysis.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ encode ─┐
//!    └────▶ text ─────────────────┴▶ Document ──▶ llm (×4) ──▶ reconcile
//! (path/URL)  (pdftoppm)  (base64)      (pdfium)               (Decimal)
//! ```
//!
//! 1. [`input`]     — canonicalise the user-supplied path or URL to a local PDF
//! 2. [`rasterize`] — run the external rasterizer in a per-call scratch area
//! 3. [`encode`]    — check each PNG and wrap it as base64
//! 4. [`text`]      — per-page text layer via pdfium, on a blocking thread
//! 5. [`llm`]       — the structured inference boundary
//! 6. [`reconcile`] — recompute the extracted ledger locally

pub mod encode;
pub mod input;
pub mod llm;
pub mod rasterize;
pub mod reconcile;
pub mod text;
