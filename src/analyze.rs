//! Statement analysis entry points.
//!
//! ```text
//! classify ──(likelihood < threshold)──▶ Rejected
//!    │
//!    ▼
//! account holder ──▶ ledger ──▶ local reconcile
//!                                  │
//!              (invalid && halt_on_invalid_ledger) ──▶ LedgerInvalid
//!                                  │
//!                                  ▼
//!                               fraud ──▶ Completed
//! ```
//!
//! Stages run strictly one after another; each one's reply is validated
//! before the next request is sent. Any error ends the run.

use crate::config::AnalysisConfig;
use crate::error::StatementError;
use crate::model::{Document, PageText, Stage};
use crate::output::{
    AccountHolder, AnalysisReport, AnalysisStats, Classification, FraudAssessment,
    LedgerExtraction, Outcome, Reconciliation,
};
use crate::pipeline::llm::{InferenceRequest, LlmInference, StructuredInference};
use crate::pipeline::{input, rasterize, reconcile, text};
use crate::progress::AnalysisProgressCallback;
use crate::{prompts, schema};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Analyse a PDF bank statement from a local path or URL.
///
/// Resolves the LLM provider from the config or the environment, then runs
/// [`analyze_with`].
///
/// # Errors
/// Every failure is fatal; see [`StatementError`]. A document the
/// classifier rejects is **not** an error: it returns `Ok` with
/// [`Outcome::Rejected`].
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, StatementError> {
    let provider = resolve_provider(config)?;
    let service = LlmInference::new(
        provider,
        config.temperature,
        config.max_tokens,
        Duration::from_secs(config.api_timeout_secs),
    );
    analyze_with(input_str, &service, config).await
}

/// Like [`analyze`], with an explicit inference service.
pub async fn analyze_with(
    input_str: impl AsRef<str>,
    service: &dyn StructuredInference,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, StatementError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;

    // ── Step 2: Rasterise + extract text ─────────────────────────────────
    let load_start = Instant::now();
    let document = load_document(resolved.path(), config).await?;
    let load_duration_ms = load_start.elapsed().as_millis() as u64;
    if let Some(cb) = config.progress_callback.as_deref() {
        cb.on_document_loaded(document.page_count());
    }

    // ── Step 3: Inference stages ─────────────────────────────────────────
    let mut report = analyze_document(&document, service, config).await?;

    report.source = PathBuf::from(input_str);
    report.stats.load_duration_ms = load_duration_ms;
    report.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Analysis complete: {:?} after {}ms",
        report.outcome, report.stats.total_duration_ms
    );
    Ok(report)
}

/// Rasterise a local PDF and extract its text, side by side.
///
/// The two halves share nothing; if either fails the other is cancelled,
/// which also tears down the rasterizer's scratch area and process.
pub async fn load_document(
    pdf_path: &Path,
    config: &AnalysisConfig,
) -> Result<Document, StatementError> {
    let options = config.rasterizer_options();
    let (images, texts) = tokio::try_join!(
        rasterize::rasterize_pages(pdf_path, &options),
        text::extract_page_texts(pdf_path, config.password.as_deref()),
    )?;
    debug!("Loaded {} images, {} text pages", images.len(), texts.len());
    Document::assemble(pdf_path, images, texts)
}

/// Extract per-page text only. Needs neither the rasterizer nor an API key.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<Vec<PageText>, StatementError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    text::extract_page_texts(resolved.path(), password).await
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, StatementError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| StatementError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

/// Run the four inference stages against an already-loaded document.
pub async fn analyze_document(
    document: &Document,
    service: &dyn StructuredInference,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, StatementError> {
    let start = Instant::now();
    let cb = config.progress_callback.as_deref();

    let mut report = AnalysisReport {
        source: document.path().to_path_buf(),
        outcome: Outcome::Rejected,
        classification: tracked(
            cb,
            Stage::Classify,
            classify(service, document, config.acceptance_threshold),
        )
        .await?,
        account_holder: None,
        ledger: None,
        reconciliation: None,
        fraud: None,
        stats: AnalysisStats {
            page_count: document.page_count(),
            ..Default::default()
        },
    };

    let finish = |mut report: AnalysisReport, outcome: Outcome| {
        report.outcome = outcome;
        report.stats.inference_duration_ms = start.elapsed().as_millis() as u64;
        report.stats.total_duration_ms = report.stats.inference_duration_ms;
        report
    };

    if !report.classification.accepted {
        info!(
            "Not a bank statement (likelihood {} < {})",
            report.classification.statement_likelihood, config.acceptance_threshold
        );
        return Ok(finish(report, Outcome::Rejected));
    }
    info!(
        "Accepted as bank statement (likelihood {})",
        report.classification.statement_likelihood
    );

    report.account_holder =
        Some(tracked(cb, Stage::AccountHolder, extract_account_holder(service, document)).await?);

    let ledger = tracked(cb, Stage::Ledger, extract_ledger(service, document)).await?;
    let reconciliation = cross_check(&ledger);
    let ledger_valid = ledger.valid;
    report.ledger = Some(ledger);
    report.reconciliation = Some(reconciliation);

    if !ledger_valid {
        warn!("Ledger flagged invalid by the service");
        if config.halt_on_invalid_ledger {
            return Ok(finish(report, Outcome::LedgerInvalid));
        }
    }

    report.fraud = Some(tracked(cb, Stage::Fraud, assess_fraud(service, document)).await?);

    Ok(finish(report, Outcome::Completed))
}

// ── Stages ───────────────────────────────────────────────────────────────

/// Stage 1: decide whether the document is a bank statement.
pub async fn classify(
    service: &dyn StructuredInference,
    document: &Document,
    threshold: u8,
) -> Result<Classification, StatementError> {
    let reply = service
        .infer(request(Stage::Classify, String::new(), document))
        .await?;
    schema::decode_classification(reply, threshold)
}

/// Stage 2: account holder name and address.
pub async fn extract_account_holder(
    service: &dyn StructuredInference,
    document: &Document,
) -> Result<AccountHolder, StatementError> {
    let reply = service
        .infer(request(Stage::AccountHolder, String::new(), document))
        .await?;
    schema::decode_account_holder(reply)
}

/// Stage 3: balances and transactions.
pub async fn extract_ledger(
    service: &dyn StructuredInference,
    document: &Document,
) -> Result<LedgerExtraction, StatementError> {
    let reply = service
        .infer(request(Stage::Ledger, String::new(), document))
        .await?;
    schema::decode_ledger(reply)
}

/// Stage 4: fraud signals from the images and each page's text layer.
pub async fn assess_fraud(
    service: &dyn StructuredInference,
    document: &Document,
) -> Result<FraudAssessment, StatementError> {
    let page_texts = document
        .pages()
        .iter()
        .map(|p| prompts::page_text_block(p.page_num, &p.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let text = format!("Extracted page text:\n\n{page_texts}\n\nImages:");

    let reply = service.infer(request(Stage::Fraud, text, document)).await?;
    schema::decode_fraud(reply)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn request(stage: Stage, text: String, document: &Document) -> InferenceRequest {
    InferenceRequest {
        stage,
        system: prompts::system_prompt(stage).to_string(),
        text,
        images: document.images().into_iter().cloned().collect(),
        schema: schema::schema_for(stage),
    }
}

/// Recompute the ledger locally. A ledger that cannot be summed is reported,
/// not fatal: the service's own verdict is still available.
fn cross_check(extraction: &LedgerExtraction) -> Reconciliation {
    match reconcile::reconcile(&extraction.ledger) {
        Ok(check) => {
            if !check.matches {
                warn!(
                    "Local reconciliation differs from statement: computed {} vs claimed {} {}",
                    check.computed_closing, check.claimed_closing, check.currency
                );
            }
            if check.matches != extraction.balances_equal {
                warn!(
                    "Service says balances_equal={}, local check says {}",
                    extraction.balances_equal, check.matches
                );
            }
            Reconciliation::Checked(check)
        }
        Err(e) => {
            warn!("Ledger not reconciled: {}", e);
            Reconciliation::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

async fn tracked<T, F>(
    cb: Option<&dyn AnalysisProgressCallback>,
    stage: Stage,
    fut: F,
) -> Result<T, StatementError>
where
    F: Future<Output = Result<T, StatementError>>,
{
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    let result = fut.await;
    if let Some(cb) = cb {
        match &result {
            Ok(_) => cb.on_stage_complete(stage),
            Err(e) => cb.on_stage_error(stage, &e.to_string()),
        }
    }
    result
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, StatementError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StatementError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider` — used as-is
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. OpenAI when `OPENAI_API_KEY` is set, else `ProviderFactory::from_env`
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, StatementError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StatementError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
