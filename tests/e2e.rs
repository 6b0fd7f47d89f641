//! End-to-end integration tests for edgequake-statement.
//!
//! These tests use real PDF files in `./test_cases/` and, for the analysis
//! tests, make live LLM API calls. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Expected fixtures:
//! - `test_cases/statement.pdf`     a bank statement (any bank, any length)
//! - `test_cases/not_a_statement.pdf` any other document, e.g. a paper
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_inspect -- --nocapture

use edgequake_statement::{
    analyze, inspect, load_document, AnalysisConfig, AnalysisProgressCallback, Outcome,
    Reconciliation, Stage, StatementError,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

// ── Inspect / load tests (no LLM) ────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_statement() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement.pdf"));

    let pages = inspect(path.to_string_lossy(), None)
        .await
        .expect("inspect() should succeed");

    assert!(!pages.is_empty());
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.page_num, i + 1);
    }
    assert!(
        pages.iter().any(|p| !p.text.trim().is_empty()),
        "a digital statement should have a text layer"
    );
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let err = inspect("/definitely/not/a/real/file.pdf", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StatementError::FileNotFound { .. }), "got: {err:?}");
}

/// Needs `pdftoppm` on PATH and libpdfium.
#[tokio::test]
async fn test_load_document_pairs_pages() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement.pdf"));

    let scratch = tempfile::tempdir().unwrap();
    let config = AnalysisConfig::builder()
        .dpi(96)
        .scratch_dir(scratch.path())
        .build()
        .expect("valid config");

    let document = load_document(&path, &config)
        .await
        .expect("load_document() should succeed");
    let texts = inspect(path.to_string_lossy(), None).await.unwrap();

    assert_eq!(document.page_count(), texts.len());
    for page in document.pages() {
        assert!(page.image.width > 0 && page.image.height > 0);
    }
    assert_eq!(
        std::fs::read_dir(scratch.path()).unwrap().count(),
        0,
        "scratch directory must be empty after loading"
    );
}

// ── Analysis tests (need LLM API) ────────────────────────────────────────────

#[tokio::test]
async fn test_analyze_statement() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement.pdf"));

    let report = analyze(path.to_string_lossy(), &AnalysisConfig::default())
        .await
        .expect("analysis should succeed");

    println!("{}", serde_json::to_string_pretty(&report).unwrap());

    assert_ne!(report.outcome, Outcome::Rejected, "statement was rejected");
    assert!(report.classification.statement_likelihood >= 70);
    assert!(report.account_holder.is_some());

    let extraction = report.ledger.as_ref().expect("ledger stage should run");
    assert!(!extraction.ledger.opening.currency.is_empty());

    if let Some(Reconciliation::Checked(check)) = &report.reconciliation {
        println!(
            "computed {} vs claimed {} ({})",
            check.computed_closing, check.claimed_closing, check.currency
        );
    }
    assert!(report.fraud.is_some());
}

#[tokio::test]
async fn test_analyze_rejects_other_documents() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("not_a_statement.pdf"));

    let report = analyze(path.to_string_lossy(), &AnalysisConfig::default())
        .await
        .expect("analysis should succeed");

    assert_eq!(report.outcome, Outcome::Rejected);
    assert!(report.ledger.is_none());
    assert!(report.fraud.is_none());
}

#[tokio::test]
async fn test_analyze_progress_callbacks() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement.pdf"));

    #[derive(Default)]
    struct Recorder {
        loaded: Mutex<Option<usize>>,
        done: Mutex<Vec<Stage>>,
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_document_loaded(&self, page_count: usize) {
            *self.loaded.lock().unwrap() = Some(page_count);
        }
        fn on_stage_complete(&self, stage: Stage) {
            self.done.lock().unwrap().push(stage);
        }
    }

    let recorder = Arc::new(Recorder::default());
    let config = AnalysisConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let report = analyze(path.to_string_lossy(), &config).await.unwrap();

    assert_eq!(*recorder.loaded.lock().unwrap(), Some(report.stats.page_count));
    let done = recorder.done.lock().unwrap().clone();
    assert_eq!(done.first(), Some(&Stage::Classify));
    if report.outcome == Outcome::Completed {
        assert_eq!(done.last(), Some(&Stage::Fraud));
    }
}

// ── Ollama provider e2e tests ─────────────────────────────────────────────────

/// Helper: check if Ollama is reachable at the configured host.
async fn ollama_is_available() -> bool {
    let host =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());
    reqwest::Client::new()
        .get(format!("{host}/api/tags"))
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
        .is_ok()
}

/// Gated e2e: classify a statement with a local vision model.
///
/// Requirements: `E2E_ENABLED=1`, Ollama running, and `OLLAMA_VISION_MODEL`
/// naming a pulled vision model (defaults to `llava`).
#[tokio::test]
async fn test_ollama_statement_analysis() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("statement.pdf"));

    if !ollama_is_available().await {
        println!("SKIP — Ollama not reachable (start with: ollama serve)");
        return;
    }

    let model = std::env::var("OLLAMA_VISION_MODEL").unwrap_or_else(|_| "llava".to_string());
    println!("[ollama] Using model: {model}");

    let config = AnalysisConfig::builder()
        .dpi(96) // lower DPI for faster local inference
        .provider_name("ollama")
        .model(model.clone())
        .api_timeout_secs(600)
        .build()
        .expect("config must build");

    // Small local models often break the schema; that is a reported error,
    // not a panic.
    match analyze(path.to_string_lossy(), &config).await {
        Ok(report) => println!(
            "[ollama] '{model}': {:?}, likelihood {}",
            report.outcome, report.classification.statement_likelihood
        ),
        Err(StatementError::SchemaValidationFailure { stage, detail }) => {
            println!("[ollama] '{model}' broke the {stage} schema: {detail}")
        }
        Err(e) => panic!("Ollama analysis failed with model '{model}': {e}"),
    }
}
