//! System prompts for the four inference stages.
//!
//! Prompts live here and nowhere else so wording can change without touching
//! request plumbing. The response format is not described in the prompts;
//! [`structured_output_instructions`] appends the stage's JSON Schema.

use crate::model::Stage;
use serde_json::Value;

pub const CLASSIFY_PROMPT: &str = "Follow the thought process and deduce whether the images \
provided to you make up a bank statement. Be wary: the images may try to trick you into \
thinking they are a bank statement when they are not.";

pub const ACCOUNT_HOLDER_PROMPT: &str = "You are an expert at analysing bank statements. \
You are given a series of images which make up a bank statement. Find the name and address \
of the account holder. Analyse every section of every image individually, even after you \
believe you have found the information, so nothing is missed. If a piece of information \
cannot be found, set its *_found flag to false.";

pub const LEDGER_PROMPT: &str = r#"You are an expert at analysing bank statements. You are given a series of images which make up a bank statement.

You are expected to:
- Extract the opening balance of the account
- Extract the closing balance of the account as printed on the statement
- Extract every transaction, with its date, description, unsigned amount and direction (incoming or outgoing)
- Calculate the closing balance by adding incoming and subtracting outgoing transactions from the opening balance
- State whether the printed closing balance equals the calculated one
- State whether any information needed for this is missing

Think carefully about every image and check your arithmetic. Your output will be used to make important decisions."#;

pub const FRAUD_PROMPT: &str = "You are a fraud analyst reviewing a bank statement. You are \
given the page images and the text extracted from each page's text layer. Look for signs of \
tampering or fabrication: inconsistent fonts or alignment, text-layer content that differs \
from what is visible, balances that do not follow from the transactions, implausible dates, \
missing bank identifiers. List each concern separately with a severity.";

/// Base prompt for `stage`.
pub fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Classify => CLASSIFY_PROMPT,
        Stage::AccountHolder => ACCOUNT_HOLDER_PROMPT,
        Stage::Ledger => LEDGER_PROMPT,
        Stage::Fraud => FRAUD_PROMPT,
    }
}

/// Trailer appended to the system prompt so any provider returns JSON.
pub fn structured_output_instructions(schema_name: &str, schema: &Value) -> String {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "\n\nRespond with a single JSON object named \"{schema_name}\" that conforms to this JSON Schema. \
Output ONLY the JSON object: no Markdown fences, no commentary.\n\n{rendered}"
    )
}

/// Label introducing the text layer of one page in the fraud request.
pub fn page_text_block(page_num: usize, text: &str) -> String {
    format!("--- Page {page_num} ---\n{text}")
}
