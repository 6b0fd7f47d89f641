//! Results of an analysis run.
//!
//! Everything here is `Serialize` so the CLI's `--json` mode can print a
//! whole [`AnalysisReport`] as-is.

use crate::model::{BalanceCheck, Ledger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stage 1: is this document a bank statement?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub document_analysis: String,
    pub statement_thoughts: String,
    pub concluding_thoughts: String,
    /// 0–100, rounded from the service's score.
    pub statement_likelihood: u8,
    /// The unrounded score was `>= threshold`.
    pub accepted: bool,
}

/// Stage 2: who the statement belongs to. `None` means "not found".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountHolder {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Stage 3: the ledger plus the service's own consistency verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerExtraction {
    pub ledger: Ledger,
    /// Closing balance as calculated by the service.
    pub service_calculated_closing: rust_decimal::Decimal,
    /// Service says the stated and calculated closing balances agree.
    pub balances_equal: bool,
    /// Service says information was missing from the document.
    pub missing_information: bool,
    /// `balances_equal && !missing_information`.
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// One discrete fraud signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concern {
    pub description: String,
    pub severity: Severity,
}

/// Stage 4: fraud signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub analysis: String,
    pub concerns: Vec<Concern>,
    /// 0–100.
    pub fraud_likelihood: u8,
}

impl FraudAssessment {
    pub fn highest_severity(&self) -> Option<Severity> {
        self.concerns.iter().map(|c| c.severity).max()
    }
}

/// Local recomputation of the extracted ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reconciliation {
    Checked(BalanceCheck),
    /// The ledger could not be summed, e.g. because it mixes currencies.
    Unavailable { reason: String },
}

impl Reconciliation {
    pub fn matches(&self) -> Option<bool> {
        match self {
            Reconciliation::Checked(check) => Some(check.matches),
            Reconciliation::Unavailable { .. } => None,
        }
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Classification likelihood was below the threshold.
    Rejected,
    /// The ledger was invalid and `halt_on_invalid_ledger` stopped the run.
    LedgerInvalid,
    /// All stages ran.
    Completed,
}

/// Timing for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub page_count: usize,
    pub load_duration_ms: u64,
    pub inference_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a run produced. Stages that did not run are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source: PathBuf,
    pub outcome: Outcome,
    pub classification: Classification,
    pub account_holder: Option<AccountHolder>,
    pub ledger: Option<LedgerExtraction>,
    pub reconciliation: Option<Reconciliation>,
    pub fraud: Option<FraudAssessment>,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    /// The service's verdict and the local recomputation both say the ledger
    /// is consistent. `None` until stage 3 has run.
    pub fn ledger_consistent(&self) -> Option<bool> {
        let ledger = self.ledger.as_ref()?;
        let local = self
            .reconciliation
            .as_ref()
            .and_then(Reconciliation::matches)
            .unwrap_or(false);
        Some(ledger.valid && local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MonetaryAmount;
    use rust_decimal::Decimal;

    fn concern(severity: Severity) -> Concern {
        Concern {
            description: "x".into(),
            severity,
        }
    }

    fn report(valid: bool, reconciliation: Option<Reconciliation>) -> AnalysisReport {
        let gbp = |v: i64| MonetaryAmount::new("GBP", "£", Decimal::new(v, 2));
        AnalysisReport {
            source: PathBuf::from("s.pdf"),
            outcome: Outcome::Completed,
            classification: Classification {
                document_analysis: String::new(),
                statement_thoughts: String::new(),
                concluding_thoughts: String::new(),
                statement_likelihood: 90,
                accepted: true,
            },
            account_holder: None,
            ledger: Some(LedgerExtraction {
                ledger: Ledger {
                    opening: gbp(100),
                    closing: gbp(100),
                    transactions: vec![],
                },
                service_calculated_closing: Decimal::new(100, 2),
                balances_equal: valid,
                missing_information: false,
                valid,
            }),
            reconciliation,
            fraud: None,
            stats: AnalysisStats::default(),
        }
    }

    fn check(matches: bool) -> Reconciliation {
        Reconciliation::Checked(BalanceCheck {
            currency: "GBP".into(),
            opening: Decimal::ONE,
            computed_closing: Decimal::ONE,
            claimed_closing: Decimal::ONE,
            difference: Decimal::ZERO,
            matches,
        })
    }

    #[test]
    fn highest_severity_orders_high_above_low() {
        let fraud = FraudAssessment {
            analysis: String::new(),
            concerns: vec![concern(Severity::Low), concern(Severity::High), concern(Severity::Medium)],
            fraud_likelihood: 40,
        };
        assert_eq!(fraud.highest_severity(), Some(Severity::High));

        let clean = FraudAssessment {
            concerns: vec![],
            ..fraud
        };
        assert_eq!(clean.highest_severity(), None);
    }

    #[test]
    fn ledger_consistency_needs_both_verdicts() {
        assert_eq!(report(true, Some(check(true))).ledger_consistent(), Some(true));
        assert_eq!(report(false, Some(check(true))).ledger_consistent(), Some(false));
        assert_eq!(report(true, Some(check(false))).ledger_consistent(), Some(false));
        let unavailable = Reconciliation::Unavailable {
            reason: "mixed currencies".into(),
        };
        assert_eq!(report(true, Some(unavailable)).ledger_consistent(), Some(false));
    }

    #[test]
    fn no_ledger_means_unknown() {
        let mut r = report(true, None);
        r.ledger = None;
        assert_eq!(r.ledger_consistent(), None);
    }

    #[test]
    fn reconciliation_is_tagged() {
        let v = serde_json::to_value(Reconciliation::Unavailable {
            reason: "r".into(),
        })
        .unwrap();
        assert_eq!(v["status"], "unavailable");
        assert_eq!(v["reason"], "r");
    }
}
