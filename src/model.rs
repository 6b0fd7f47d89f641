//! Domain types: documents, pages, money and ledgers.
//!
//! A [`Document`] is immutable once assembled. Its pages pair a rendered
//! [`PageImage`] with the page's extracted text, and the pairing is checked
//! at construction so image order and text order can never drift apart.

use crate::error::StatementError;
use edgequake_llm::ImageData;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ── Pages ────────────────────────────────────────────────────────────────

/// One rasterised page, held in memory as a base64 PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed physical page number.
    pub page_num: usize,
    /// Base64 (standard alphabet) PNG payload.
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Self-contained `data:` URL for embedding the page in a request.
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }

    /// Convert to the provider-neutral image attachment.
    ///
    /// `detail: "high"` keeps fine print (amounts, dates) legible to
    /// tiling vision models.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), "image/png").with_detail("high")
    }
}

/// Plain text extracted from one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed physical page number.
    pub page_num: usize,
    pub text: String,
}

/// A page of a [`Document`]: its image and its text.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_num: usize,
    pub image: PageImage,
    pub text: String,
}

/// An input PDF split into pages. Built with [`Document::assemble`].
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    pages: Vec<Page>,
}

impl Document {
    /// Pair rendered images with extracted texts, page by page.
    ///
    /// Both sequences must be in ascending page order starting at 1 and
    /// agree on every page number; anything else is a
    /// [`StatementError::PageCountMismatch`].
    pub fn assemble(
        path: impl Into<PathBuf>,
        images: Vec<PageImage>,
        texts: Vec<PageText>,
    ) -> Result<Self, StatementError> {
        let mismatch = |detail: String| StatementError::PageCountMismatch {
            images: images.len(),
            texts: texts.len(),
            detail,
        };

        if images.len() != texts.len() {
            return Err(mismatch("page counts differ".into()));
        }
        if images.is_empty() {
            return Err(mismatch("document has no pages".into()));
        }

        for (i, (image, text)) in images.iter().zip(&texts).enumerate() {
            let expected = i + 1;
            if image.page_num != expected || text.page_num != expected {
                return Err(mismatch(format!(
                    "position {expected}: image page {}, text page {}",
                    image.page_num, text.page_num
                )));
            }
        }

        let pages = images
            .into_iter()
            .zip(texts)
            .map(|(image, text)| Page {
                page_num: image.page_num,
                image,
                text: text.text,
            })
            .collect();

        Ok(Self {
            path: path.into(),
            pages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page images in physical order.
    pub fn images(&self) -> Vec<&PageImage> {
        self.pages.iter().map(|p| &p.image).collect()
    }
}

// ── Money ────────────────────────────────────────────────────────────────

/// A monetary value as printed on a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryAmount {
    /// ISO 4217 code, e.g. `GBP`.
    pub currency: String,
    /// Display symbol, e.g. `£`.
    #[serde(default)]
    pub symbol: String,
    pub value: Decimal,
}

impl MonetaryAmount {
    pub fn new(currency: impl Into<String>, symbol: impl Into<String>, value: Decimal) -> Self {
        Self {
            currency: currency.into(),
            symbol: symbol.into(),
            value,
        }
    }
}

impl fmt::Display for MonetaryAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.symbol.is_empty() {
            write!(f, "{} {}", self.value, self.currency)
        } else {
            write!(f, "{}{} ({})", self.symbol, self.value, self.currency)
        }
    }
}

/// Whether money entered or left the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One dated ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: String,
    /// Unsigned amount; the sign comes from `direction`.
    pub amount: MonetaryAmount,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Opening and closing balances plus the transactions between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub opening: MonetaryAmount,
    /// Closing balance as claimed by the document.
    pub closing: MonetaryAmount,
    pub transactions: Vec<Transaction>,
}

/// Result of recomputing a ledger locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub currency: String,
    pub opening: Decimal,
    pub computed_closing: Decimal,
    pub claimed_closing: Decimal,
    /// `claimed_closing - computed_closing`.
    pub difference: Decimal,
    pub matches: bool,
}

// ── Stages ───────────────────────────────────────────────────────────────

/// The four inference requests, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    AccountHolder,
    Ledger,
    Fraud,
}

impl Stage {
    /// Stable identifier, also used as the schema name.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Classify => "is_statement",
            Stage::AccountHolder => "account_holder",
            Stage::Ledger => "ledger",
            Stage::Fraud => "fraud_assessment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Classify => "document classification",
            Stage::AccountHolder => "account holder extraction",
            Stage::Ledger => "ledger extraction",
            Stage::Fraud => "fraud assessment",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(page_num: usize) -> PageImage {
        PageImage {
            page_num,
            base64: "iVBORw0KGgo=".into(),
            width: 1,
            height: 1,
        }
    }

    fn text(page_num: usize) -> PageText {
        PageText {
            page_num,
            text: format!("page {page_num}"),
        }
    }

    #[test]
    fn data_url_has_png_prefix() {
        assert_eq!(image(1).data_url(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn assemble_pairs_pages_in_order() {
        let doc = Document::assemble(
            "a.pdf",
            vec![image(1), image(2), image(3)],
            vec![text(1), text(2), text(3)],
        )
        .unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.pages()[2].text, "page 3");
        assert_eq!(doc.pages()[2].image.page_num, 3);
    }

    #[test]
    fn assemble_keeps_double_digit_pages_in_order() {
        let doc = Document::assemble(
            "a.pdf",
            (1..=12).map(image).collect(),
            (1..=12).map(text).collect(),
        )
        .unwrap();
        let order: Vec<usize> = doc.pages().iter().map(|p| p.page_num).collect();
        assert_eq!(order, (1..=12).collect::<Vec<_>>());
        assert_eq!(doc.pages()[9].text, "page 10");
        assert_eq!(doc.pages()[11].image.page_num, 12);
    }

    #[test]
    fn assemble_rejects_lexicographic_order() {
        // 1, 10, 11, 12, 2, ... is what a string sort of file names gives.
        let mut names: Vec<String> = (1..=12).map(|n| n.to_string()).collect();
        names.sort();
        let images = names.iter().map(|n| image(n.parse().unwrap())).collect();
        let err = Document::assemble("a.pdf", images, (1..=12).map(text).collect()).unwrap_err();
        assert!(err.to_string().contains("position 2"), "got: {err}");
    }

    #[test]
    fn assemble_rejects_count_mismatch() {
        let err = Document::assemble("a.pdf", vec![image(1), image(2)], vec![text(1)]).unwrap_err();
        assert!(matches!(
            err,
            StatementError::PageCountMismatch { images: 2, texts: 1, .. }
        ));
    }

    #[test]
    fn assemble_rejects_page_number_mismatch() {
        let err = Document::assemble("a.pdf", vec![image(1), image(2)], vec![text(1), text(3)])
            .unwrap_err();
        assert!(err.to_string().contains("position 2"), "got: {err}");
    }

    #[test]
    fn assemble_rejects_empty_document() {
        assert!(Document::assemble("a.pdf", vec![], vec![]).is_err());
    }

    #[test]
    fn direction_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Incoming).unwrap(), "\"incoming\"");
        let d: Direction = serde_json::from_str("\"outgoing\"").unwrap();
        assert_eq!(d, Direction::Outgoing);
    }
}
