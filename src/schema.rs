//! Response schemas for the four inference stages.
//!
//! Each stage has a JSON Schema sent with the request and a serde type the
//! reply is decoded into. Decoding and range checks both happen here; any
//! failure becomes [`StatementError::SchemaValidationFailure`] naming the
//! stage. The wire types are then turned into the domain types in
//! [`crate::output`].

use crate::error::StatementError;
use crate::model::{Direction, Ledger, MonetaryAmount, Stage, Transaction};
use crate::output::{AccountHolder, Classification, Concern, FraudAssessment, LedgerExtraction, Severity};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// JSON Schema for `stage`'s reply.
pub fn schema_for(stage: Stage) -> Value {
    match stage {
        Stage::Classify => object(json!({
            "document_analysis": text("What the images contain, image by image."),
            "statement_thoughts": text("For each image, how it supports or contradicts the theory that the images form a bank statement."),
            "concluding_thoughts": text("Overall conclusion: is this a bank statement?"),
            "statement_likelihood": number("How likely this is a bank statement, 0-100."),
        })),
        Stage::AccountHolder => object(json!({
            "document_analysis": text("Section-by-section search for the account holder's name and address."),
            "name_found": boolean("Whether the account holder's name was found."),
            "name": text("The account holder's name, or an empty string."),
            "address_found": boolean("Whether the account holder's address was found."),
            "address": text("The account holder's address, or an empty string."),
        })),
        Stage::Ledger => object(json!({
            "currency": text("ISO 4217 code of the account currency, e.g. GBP."),
            "currency_symbol": text("Currency symbol as printed, e.g. £."),
            "opening_balance": amount("Opening balance according to the statement."),
            "closing_balance_on_statement": amount("Closing balance according to the statement."),
            "closing_balance_calculated": amount("Opening balance plus incoming minus outgoing transactions."),
            "transactions": {
                "type": "array",
                "items": object(json!({
                    "date": text("Transaction date as printed."),
                    "description": text("Transaction description, or an empty string."),
                    "amount": amount("Unsigned transaction amount."),
                    "direction": {
                        "type": "string",
                        "enum": ["incoming", "outgoing"],
                        "description": "incoming if money entered the account, outgoing if it left."
                    },
                    "currency": text("ISO 4217 code if different from the account currency, else empty."),
                })),
            },
            "balances_equal": boolean("Whether the stated and calculated closing balances are equal."),
            "missing_information": boolean("Whether any information needed for the ledger is missing."),
        })),
        Stage::Fraud => object(json!({
            "analysis": text("Free-text analysis of signs of tampering or fabrication."),
            "concerns": {
                "type": "array",
                "items": object(json!({
                    "description": text("One specific concern."),
                    "severity": {
                        "type": "string",
                        "enum": ["low", "medium", "high"]
                    },
                })),
            },
            "fraud_likelihood": number("How likely the document is fraudulent, 0-100."),
        })),
    }
}

fn object(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn text(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn number(description: &str) -> Value {
    json!({ "type": "number", "description": description })
}

fn boolean(description: &str) -> Value {
    json!({ "type": "boolean", "description": description })
}

fn amount(description: &str) -> Value {
    json!({
        "type": "string",
        "description": format!("{description} Decimal string without symbol or thousands separators, e.g. \"1234.56\"."),
    })
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ClassifyReply {
    document_analysis: String,
    statement_thoughts: String,
    concluding_thoughts: String,
    statement_likelihood: f64,
}

#[derive(Debug, Deserialize)]
struct AccountHolderReply {
    #[allow(dead_code)]
    document_analysis: String,
    name_found: bool,
    #[serde(default)]
    name: String,
    address_found: bool,
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct LedgerReply {
    currency: String,
    #[serde(default)]
    currency_symbol: String,
    opening_balance: Decimal,
    closing_balance_on_statement: Decimal,
    closing_balance_calculated: Decimal,
    transactions: Vec<TransactionReply>,
    balances_equal: bool,
    missing_information: bool,
}

#[derive(Debug, Deserialize)]
struct TransactionReply {
    date: String,
    #[serde(default)]
    description: Option<String>,
    amount: Decimal,
    direction: Direction,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FraudReply {
    analysis: String,
    concerns: Vec<ConcernReply>,
    fraud_likelihood: f64,
}

#[derive(Debug, Deserialize)]
struct ConcernReply {
    description: String,
    severity: Severity,
}

// ── Decoding ─────────────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(stage: Stage, value: Value) -> Result<T, StatementError> {
    serde_json::from_value(value).map_err(|e| StatementError::schema(stage, e.to_string()))
}

fn percentage(stage: Stage, field: &str, value: f64) -> Result<u8, StatementError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(StatementError::schema(
            stage,
            format!("{field} must be within 0-100, got {value}"),
        ));
    }
    Ok(value.round() as u8)
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Decode a stage-1 reply; `accepted` is `likelihood >= threshold`.
pub fn decode_classification(value: Value, threshold: u8) -> Result<Classification, StatementError> {
    let reply: ClassifyReply = decode(Stage::Classify, value)?;
    let likelihood = percentage(Stage::Classify, "statement_likelihood", reply.statement_likelihood)?;
    // Gate on the raw score; the rounded one is for display only.
    let accepted = reply.statement_likelihood >= f64::from(threshold);
    Ok(Classification {
        document_analysis: reply.document_analysis,
        statement_thoughts: reply.statement_thoughts,
        concluding_thoughts: reply.concluding_thoughts,
        statement_likelihood: likelihood,
        accepted,
    })
}

/// Decode a stage-2 reply. A field is `None` when its `*_found` flag is
/// false or its value is blank.
pub fn decode_account_holder(value: Value) -> Result<AccountHolder, StatementError> {
    let reply: AccountHolderReply = decode(Stage::AccountHolder, value)?;
    Ok(AccountHolder {
        name: reply.name_found.then_some(reply.name).and_then(non_blank),
        address: reply.address_found.then_some(reply.address).and_then(non_blank),
    })
}

/// Decode a stage-3 reply into a ledger.
///
/// A negative amount marked `outgoing` is read as its absolute value; a
/// negative amount marked `incoming` contradicts itself and is rejected.
pub fn decode_ledger(value: Value) -> Result<LedgerExtraction, StatementError> {
    let reply: LedgerReply = decode(Stage::Ledger, value)?;
    let currency = reply.currency.trim().to_string();
    let symbol = reply.currency_symbol.trim().to_string();
    let money = |value: Decimal| MonetaryAmount::new(currency.clone(), symbol.clone(), value);

    let mut transactions = Vec::with_capacity(reply.transactions.len());
    for (i, tx) in reply.transactions.into_iter().enumerate() {
        if tx.amount.is_sign_negative() && !tx.amount.is_zero() && tx.direction == Direction::Incoming {
            return Err(StatementError::schema(
                Stage::Ledger,
                format!("transaction {} is incoming with negative amount {}", i + 1, tx.amount),
            ));
        }
        let tx_currency = tx
            .currency
            .and_then(non_blank)
            .unwrap_or_else(|| currency.clone());
        transactions.push(Transaction {
            date: tx.date,
            amount: MonetaryAmount::new(tx_currency, symbol.clone(), tx.amount.abs()),
            direction: tx.direction,
            description: tx.description.and_then(non_blank),
            details: None,
        });
    }

    Ok(LedgerExtraction {
        ledger: Ledger {
            opening: money(reply.opening_balance),
            closing: money(reply.closing_balance_on_statement),
            transactions,
        },
        service_calculated_closing: reply.closing_balance_calculated,
        balances_equal: reply.balances_equal,
        missing_information: reply.missing_information,
        valid: reply.balances_equal && !reply.missing_information,
    })
}

/// Decode a stage-4 reply.
pub fn decode_fraud(value: Value) -> Result<FraudAssessment, StatementError> {
    let reply: FraudReply = decode(Stage::Fraud, value)?;
    Ok(FraudAssessment {
        analysis: reply.analysis,
        concerns: reply
            .concerns
            .into_iter()
            .map(|c| Concern {
                description: c.description,
                severity: c.severity,
            })
            .collect(),
        fraud_likelihood: percentage(Stage::Fraud, "fraud_likelihood", reply.fraud_likelihood)?,
    })
}
