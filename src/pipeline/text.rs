//! Per-page plain-text extraction via pdfium.
//!
//! Independent of rasterisation: it reads the PDF's text layer rather than
//! the rendered pixels, so the two can run side by side. Page numbers come
//! from the document's own page order and start at 1, the same numbering the
//! rasterizer uses, which is what [`crate::model::Document::assemble`]
//! checks.
//!
//! pdfium keeps thread-local state and blocks, so all calls go through
//! `spawn_blocking`.

use crate::error::StatementError;
use crate::model::PageText;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extract each page's text, one entry per page in physical order.
///
/// A page's entry is its text segments in extraction order joined by `\n`.
/// Image-only pages yield an empty string, not an error.
pub async fn extract_page_texts(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<PageText>, StatementError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_page_texts_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| StatementError::Internal(format!("Text extraction task panicked: {}", e)))?
}

fn extract_page_texts_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<PageText>, StatementError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let mut texts = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let text = page.text().map_err(|e| StatementError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("page {}: {:?}", page_num, e),
        })?;

        let fragments: Vec<String> = text.segments().iter().map(|s| s.text()).collect();
        debug!("Page {}: {} text segments", page_num, fragments.len());

        texts.push(PageText {
            page_num,
            text: fragments.join("\n"),
        });
    }

    info!("Extracted text from {} pages", texts.len());
    Ok(texts)
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` (a library file or the directory holding
/// it) first, then the system library.
fn bind_pdfium() -> Result<Pdfium, StatementError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            let path = PathBuf::from(p);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(lib)
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| StatementError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, StatementError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                StatementError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                StatementError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            StatementError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}
