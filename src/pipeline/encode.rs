//! Image encoding: rasterizer PNG bytes → base64 [`PageImage`].
//!
//! The rasterizer already writes PNG, so nothing is re-encoded. The header
//! is decoded once to learn the dimensions and to catch truncated or
//! non-PNG output before it reaches an API request.

use crate::model::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Wrap a page's PNG bytes as a [`PageImage`].
pub fn encode_png(page_num: usize, bytes: &[u8]) -> Result<PageImage, image::ImageError> {
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png)
        .into_dimensions()?;

    let base64 = STANDARD.encode(bytes);
    debug!(
        "Encoded page {} ({}x{} px) → {} bytes base64",
        page_num,
        width,
        height,
        base64.len()
    );

    Ok(PageImage {
        page_num,
        base64,
        width,
        height,
    })
}
