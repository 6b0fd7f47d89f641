//! Pipeline integration tests against a canned inference service.
//!
//! No rasterizer, pdfium or API key is needed: documents are assembled
//! in memory and every stage's reply comes from a fixture.

use async_trait::async_trait;
use edgequake_statement::{
    analyze_document, AnalysisConfig, AnalysisProgressCallback, Document, InferenceRequest,
    Outcome, PageImage, PageText, Reconciliation, Severity, Stage, StatementError,
    StructuredInference,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers each stage from a fixed table and records what it was asked.
#[derive(Default)]
struct CannedService {
    replies: HashMap<Stage, Value>,
    seen: Mutex<Vec<InferenceRequest>>,
}

impl CannedService {
    fn with(mut self, stage: Stage, reply: Value) -> Self {
        self.replies.insert(stage, reply);
        self
    }

    fn stages(&self) -> Vec<Stage> {
        self.seen.lock().unwrap().iter().map(|r| r.stage).collect()
    }

    fn request(&self, stage: Stage) -> InferenceRequest {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.stage == stage)
            .cloned()
            .unwrap_or_else(|| panic!("no {stage} request was sent"))
    }
}

#[async_trait]
impl StructuredInference for CannedService {
    async fn infer(&self, request: InferenceRequest) -> Result<Value, StatementError> {
        let stage = request.stage;
        self.seen.lock().unwrap().push(request);
        self.replies
            .get(&stage)
            .cloned()
            .ok_or_else(|| StatementError::LlmApiError {
                stage,
                message: "no canned reply".into(),
            })
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl AnalysisProgressCallback for RecordingProgress {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start {}", stage.as_str()));
    }
    fn on_stage_complete(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("done {}", stage.as_str()));
    }
    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.events.lock().unwrap().push(format!("error {}", stage.as_str()));
    }
}

fn document(pages: usize) -> Document {
    let images = (1..=pages)
        .map(|n| PageImage {
            page_num: n,
            base64: "iVBORw0KGgo=".into(),
            width: 10,
            height: 14,
        })
        .collect();
    let texts = (1..=pages)
        .map(|n| PageText {
            page_num: n,
            text: format!("Statement page {n} text"),
        })
        .collect();
    Document::assemble("statement.pdf", images, texts).unwrap()
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn classify(likelihood: u32) -> Value {
    json!({
        "document_analysis": "Two pages with a bank logo and a table of dated amounts.",
        "statement_thoughts": "Sort code, account number and running balance are present.",
        "concluding_thoughts": "This looks like a bank statement.",
        "statement_likelihood": likelihood,
    })
}

fn holder() -> Value {
    json!({
        "document_analysis": "Name and address printed top left of page 1.",
        "name_found": true,
        "name": "Jane Doe",
        "address_found": true,
        "address": "1 High Street, London",
    })
}

fn ledger(closing: &str, balances_equal: bool, missing_information: bool) -> Value {
    json!({
        "currency": "GBP",
        "currency_symbol": "£",
        "opening_balance": "1000.00",
        "closing_balance_on_statement": closing,
        "closing_balance_calculated": "1050.00",
        "transactions": [
            {
                "date": "2024-03-01",
                "description": "Salary",
                "amount": "100.00",
                "direction": "incoming",
                "currency": ""
            },
            {
                "date": "2024-03-02",
                "description": "Groceries",
                "amount": "50.00",
                "direction": "outgoing",
                "currency": ""
            }
        ],
        "balances_equal": balances_equal,
        "missing_information": missing_information,
    })
}

fn fraud() -> Value {
    json!({
        "analysis": "Fonts are consistent; one balance looks edited.",
        "concerns": [
            { "description": "Balance on page 2 uses a different font", "severity": "medium" },
            { "description": "Logo is slightly blurred", "severity": "low" }
        ],
        "fraud_likelihood": 25,
    })
}

fn full_service(ledger_reply: Value) -> CannedService {
    CannedService::default()
        .with(Stage::Classify, classify(92))
        .with(Stage::AccountHolder, holder())
        .with(Stage::Ledger, ledger_reply)
        .with(Stage::Fraud, fraud())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn completed_run_reports_every_stage() {
    let service = full_service(ledger("1050.00", true, false));
    let report = analyze_document(&document(2), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(
        service.stages(),
        vec![Stage::Classify, Stage::AccountHolder, Stage::Ledger, Stage::Fraud]
    );
    assert!(report.classification.accepted);
    assert_eq!(report.classification.statement_likelihood, 92);

    let holder = report.account_holder.as_ref().unwrap();
    assert_eq!(holder.name.as_deref(), Some("Jane Doe"));
    assert_eq!(holder.address.as_deref(), Some("1 High Street, London"));

    let extraction = report.ledger.as_ref().unwrap();
    assert!(extraction.valid);
    assert_eq!(extraction.ledger.transactions.len(), 2);

    match report.reconciliation.as_ref().unwrap() {
        Reconciliation::Checked(check) => {
            assert_eq!(check.computed_closing, d("1050.00"));
            assert!(check.matches);
        }
        other => panic!("expected a checked reconciliation, got {other:?}"),
    }
    assert_eq!(report.ledger_consistent(), Some(true));

    let fraud = report.fraud.as_ref().unwrap();
    assert_eq!(fraud.fraud_likelihood, 25);
    assert_eq!(fraud.highest_severity(), Some(Severity::Medium));
    assert_eq!(report.stats.page_count, 2);
}

#[tokio::test]
async fn rejected_document_stops_after_classification() {
    let service = full_service(ledger("1050.00", true, false)).with(Stage::Classify, classify(40));
    let report = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Rejected);
    assert_eq!(service.stages(), vec![Stage::Classify]);
    assert!(!report.classification.accepted);
    assert!(report.account_holder.is_none());
    assert!(report.ledger.is_none());
    assert!(report.fraud.is_none());
}

#[tokio::test]
async fn threshold_comes_from_config() {
    let config = AnalysisConfig::builder()
        .acceptance_threshold(95)
        .build()
        .unwrap();
    let service = full_service(ledger("1050.00", true, false));
    let report = analyze_document(&document(1), &service, &config).await.unwrap();
    assert_eq!(report.outcome, Outcome::Rejected);
}

#[tokio::test]
async fn invalid_ledger_still_gets_fraud_assessment_by_default() {
    let service = full_service(ledger("1050.00", false, true));
    let report = analyze_document(&document(2), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Completed);
    assert!(!report.ledger.as_ref().unwrap().valid);
    assert!(report.fraud.is_some());
    assert_eq!(service.stages().len(), 4);
}

#[tokio::test]
async fn halt_on_invalid_ledger_skips_fraud() {
    let config = AnalysisConfig::builder()
        .halt_on_invalid_ledger(true)
        .build()
        .unwrap();
    let service = full_service(ledger("1050.00", false, false));
    let report = analyze_document(&document(2), &service, &config).await.unwrap();

    assert_eq!(report.outcome, Outcome::LedgerInvalid);
    assert!(report.fraud.is_none());
    assert!(report.reconciliation.is_some());
    assert!(!service.stages().contains(&Stage::Fraud));
}

#[tokio::test]
async fn local_reconciliation_catches_a_wrong_closing_balance() {
    // The service claims the balances agree; the arithmetic says otherwise.
    let service = full_service(ledger("1100.00", true, false));
    let report = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    match report.reconciliation.as_ref().unwrap() {
        Reconciliation::Checked(check) => {
            assert!(!check.matches);
            assert_eq!(check.difference, d("50.00"));
        }
        other => panic!("expected a checked reconciliation, got {other:?}"),
    }
    assert!(report.ledger.as_ref().unwrap().valid);
    assert_eq!(report.ledger_consistent(), Some(false));
}

#[tokio::test]
async fn mixed_currency_ledger_is_reported_not_fatal() {
    let mut reply = ledger("1050.00", true, false);
    reply["transactions"][1]["currency"] = json!("EUR");
    let service = full_service(reply);
    let report = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    assert!(matches!(
        report.reconciliation,
        Some(Reconciliation::Unavailable { .. })
    ));
    assert_eq!(report.outcome, Outcome::Completed);
}

#[tokio::test]
async fn overflowing_ledger_is_reported_not_fatal() {
    let mut reply = ledger("1050.00", true, false);
    reply["opening_balance"] = json!("79228162514264337593543950335");
    let service = full_service(reply);
    let report = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    match report.reconciliation.as_ref().unwrap() {
        Reconciliation::Unavailable { reason } => {
            assert!(reason.contains("overflow"), "got: {reason}")
        }
        other => panic!("expected an unavailable reconciliation, got {other:?}"),
    }
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.ledger_consistent(), Some(false));
}

#[tokio::test]
async fn malformed_reply_names_the_stage() {
    let service = full_service(json!({ "opening_balance": "1.00" }));
    let err = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap_err();

    assert!(
        matches!(err, StatementError::SchemaValidationFailure { stage: Stage::Ledger, .. }),
        "got: {err:?}"
    );
    assert!(!service.stages().contains(&Stage::Fraud));
}

#[tokio::test]
async fn service_error_ends_the_run() {
    let service = CannedService::default()
        .with(Stage::Classify, classify(90))
        .with(Stage::AccountHolder, holder());
    let err = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StatementError::LlmApiError { stage: Stage::Ledger, .. }));
}

#[tokio::test]
async fn every_request_carries_all_pages_in_order() {
    let service = full_service(ledger("1050.00", true, false));
    analyze_document(&document(3), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    for request in service.seen.lock().unwrap().iter() {
        let pages: Vec<usize> = request.images.iter().map(|i| i.page_num).collect();
        assert_eq!(pages, vec![1, 2, 3], "{}", request.stage);
        assert!(!request.system.is_empty());
        assert_eq!(request.schema["additionalProperties"], json!(false));
    }
}

#[tokio::test]
async fn fraud_request_includes_page_text() {
    let service = full_service(ledger("1050.00", true, false));
    analyze_document(&document(2), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    let request = service.request(Stage::Fraud);
    let first = request.text.find("--- Page 1 ---").expect("page 1 block");
    let second = request.text.find("--- Page 2 ---").expect("page 2 block");
    assert!(first < second);
    assert!(request.text.contains("Statement page 2 text"));
    assert!(service.request(Stage::Classify).text.is_empty());
}

#[tokio::test]
async fn progress_callback_sees_each_stage() {
    let progress = Arc::new(RecordingProgress::default());
    let config = AnalysisConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let service = full_service(ledger("1050.00", true, false)).with(Stage::Classify, classify(10));

    analyze_document(&document(1), &service, &config).await.unwrap();

    let events = progress.events.lock().unwrap().clone();
    assert_eq!(events, vec!["start is_statement", "done is_statement"]);
}

#[tokio::test]
async fn report_serialises_to_json() {
    let service = full_service(ledger("1050.00", true, false));
    let report = analyze_document(&document(1), &service, &AnalysisConfig::default())
        .await
        .unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["outcome"], "completed");
    assert_eq!(value["reconciliation"]["status"], "checked");
    assert_eq!(value["fraud"]["concerns"][0]["severity"], "medium");
}

#[test]
fn noop_callback_is_send_sync() {
    use edgequake_statement::NoopProgressCallback;

    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();

    let cb: Arc<dyn AnalysisProgressCallback> = Arc::new(NoopProgressCallback);
    cb.on_stage_error(Stage::Ledger, "an error");
}
