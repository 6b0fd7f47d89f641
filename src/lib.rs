//! # edgequake-statement
//!
//! Check PDF bank statements with Vision Language Models.
//!
//! Each page is rasterised to PNG by an external tool (`pdftoppm`), its text
//! layer is read with pdfium, and the pages are sent to a VLM through four
//! structured requests. The extracted ledger is then recomputed locally with
//! exact decimal arithmetic.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Load       pdftoppm → PNG pages  ∥  pdfium → page text
//!  ├─ 3. Classify   is this a bank statement? (gate: likelihood ≥ 70)
//!  ├─ 4. Identify   account holder name and address
//!  ├─ 5. Ledger     balances + transactions, reconciled locally
//!  └─ 6. Fraud      concerns with severities and a likelihood score
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_statement::{analyze, AnalysisConfig, Outcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = AnalysisConfig::default();
//!     let report = analyze("statement.pdf", &config).await?;
//!     if report.outcome == Outcome::Rejected {
//!         println!("not a bank statement");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a model
//!
//! [`analyze_document`] takes any [`StructuredInference`], so the whole
//! pipeline can run against canned replies.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `stmtcheck` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, analyze_document, analyze_sync, analyze_with, inspect, load_document};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::StatementError;
pub use model::{
    BalanceCheck, Direction, Document, Ledger, MonetaryAmount, Page, PageImage, PageText, Stage,
    Transaction,
};
pub use output::{
    AccountHolder, AnalysisReport, AnalysisStats, Classification, Concern, FraudAssessment,
    LedgerExtraction, Outcome, Reconciliation, Severity,
};
pub use pipeline::llm::{InferenceRequest, LlmInference, StructuredInference};
pub use pipeline::rasterize::{rasterize_pages, RasterizerOptions};
pub use pipeline::reconcile::{compute_closing_balance, reconcile, LedgerEntry};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
