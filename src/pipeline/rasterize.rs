//! PDF rasterisation through an external command-line tool.
//!
//! ```text
//! <binary> -png -r <dpi> <input.pdf> <scratch>/page-<token>
//!   └──▶ <scratch>/page-<token>-1.png, page-<token>-2.png, ...
//! ```
//!
//! `pdftoppm` (poppler-utils) is the default binary. Any tool that accepts the
//! same arguments and writes `<prefix>-<N>.png` files works, which is how the
//! tests substitute a fake.
//!
//! ## Scratch files
//!
//! Every call gets its own token, so concurrent calls sharing one scratch
//! directory never see each other's files. Each PNG is deleted right after
//! it is read, and [`ScratchArea`] removes whatever is left when it is
//! dropped, on every exit path including timeouts.

use crate::error::StatementError;
use crate::model::PageImage;
use crate::pipeline::encode;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default rasterizer binary.
pub const DEFAULT_RASTERIZER: &str = "pdftoppm";

/// Knobs for [`rasterize_pages`].
#[derive(Debug, Clone)]
pub struct RasterizerOptions {
    /// Binary name (looked up on `PATH`) or path.
    pub binary: PathBuf,
    pub dpi: u32,
    pub timeout: Duration,
    /// Directory for the intermediate PNG files.
    pub scratch_dir: PathBuf,
}

impl Default for RasterizerOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_RASTERIZER),
            dpi: 150,
            timeout: Duration::from_secs(60),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

// ── Scratch area ─────────────────────────────────────────────────────────

static NEXT_CALL: AtomicU64 = AtomicU64::new(0);

/// Per-call scratch namespace inside a shared directory.
///
/// Owns the file prefix `page-<token>`; dropping it deletes every file that
/// carries the token.
#[derive(Debug)]
pub struct ScratchArea {
    dir: PathBuf,
    token: String,
}

impl ScratchArea {
    /// Reserve a fresh token in `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let token = format!(
            "{}-{}-{}",
            std::process::id(),
            NEXT_CALL.fetch_add(1, Ordering::Relaxed),
            nanos
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            token,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Output prefix handed to the rasterizer.
    pub fn prefix(&self) -> PathBuf {
        self.dir.join(format!("page-{}", self.token))
    }

    /// Files produced for this token, sorted by page number.
    ///
    /// Other files in the directory, including other tokens' pages, are
    /// ignored. Names are parsed numerically so `-10` sorts after `-9` and
    /// zero-padded names (`-01`) are handled the same way.
    pub fn page_files(&self) -> std::io::Result<Vec<(usize, PathBuf)>> {
        let own_prefix = self.file_prefix();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&own_prefix) else {
                continue;
            };
            if let Some(caps) = RE_PAGE_SUFFIX.captures(rest) {
                if let Ok(n) = caps[1].parse::<usize>() {
                    files.push((n, entry.path()));
                }
            }
        }

        files.sort_by_key(|(n, _)| *n);
        Ok(files)
    }

    /// Prefix shared by every file the rasterizer writes for this token.
    fn file_prefix(&self) -> String {
        format!("page-{}-", self.token)
    }

    fn leftovers(&self) -> Vec<PathBuf> {
        let own_prefix = self.file_prefix();
        match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.file_name()
                        .to_str()
                        .is_some_and(|n| n.starts_with(&own_prefix))
                })
                .map(|e| e.path())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        for path in self.leftovers() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed scratch file {}", path.display()),
                Err(e) => warn!("Could not remove scratch file {}: {}", path.display(), e),
            }
        }
    }
}

static RE_PAGE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.png$").unwrap());

// ── Rasterisation ────────────────────────────────────────────────────────

/// Rasterise every page of `pdf_path` into an in-memory PNG, in page order.
///
/// # Errors
/// - [`StatementError::FileNotFound`] if `pdf_path` does not exist (checked
///   before anything is spawned)
/// - [`StatementError::RasterizerTimeout`] if the tool runs past `timeout`
/// - [`StatementError::ExternalToolFailure`] if the tool is missing, exits
///   non-zero, produces no pages, or produces unreadable PNGs
pub async fn rasterize_pages(
    pdf_path: &Path,
    options: &RasterizerOptions,
) -> Result<Vec<PageImage>, StatementError> {
    if !pdf_path.exists() {
        return Err(StatementError::FileNotFound {
            path: pdf_path.to_path_buf(),
        });
    }

    let tool = options.binary.display().to_string();
    let scratch = ScratchArea::new(&options.scratch_dir).map_err(|e| {
        StatementError::tool_failure(
            &tool,
            format!(
                "cannot use scratch directory {}: {}",
                options.scratch_dir.display(),
                e
            ),
        )
    })?;

    info!(
        "Rasterising {} at {} DPI (token {})",
        pdf_path.display(),
        options.dpi,
        scratch.token()
    );

    run_rasterizer(pdf_path, &scratch, options).await?;

    let files = scratch
        .page_files()
        .map_err(|e| StatementError::tool_failure(&tool, format!("cannot list output: {e}")))?;

    if files.is_empty() {
        return Err(StatementError::tool_failure(&tool, "no page images were produced"));
    }

    let mut pages = Vec::with_capacity(files.len());
    let mut last_suffix: Option<usize> = None;

    for (position, (suffix, path)) in files.into_iter().enumerate() {
        if last_suffix == Some(suffix) {
            return Err(StatementError::tool_failure(
                &tool,
                format!("page {suffix} was produced twice"),
            ));
        }
        last_suffix = Some(suffix);

        let page_num = position + 1;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            StatementError::tool_failure(&tool, format!("cannot read {}: {}", path.display(), e))
        })?;
        // Consumed: the bytes live in memory from here on.
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Could not remove {}: {}", path.display(), e);
        }

        let image = encode::encode_png(page_num, &bytes).map_err(|e| {
            StatementError::tool_failure(&tool, format!("page {page_num} is not a valid PNG: {e}"))
        })?;
        pages.push(image);
    }

    info!("Rasterised {} pages", pages.len());
    Ok(pages)
}

async fn run_rasterizer(
    pdf_path: &Path,
    scratch: &ScratchArea,
    options: &RasterizerOptions,
) -> Result<(), StatementError> {
    let tool = options.binary.display().to_string();

    let child = Command::new(&options.binary)
        .arg("-png")
        .arg("-r")
        .arg(options.dpi.to_string())
        .arg(pdf_path)
        .arg(scratch.prefix())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| StatementError::tool_failure(&tool, format!("cannot start: {e}")))?;

    let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
        Ok(result) => {
            result.map_err(|e| StatementError::tool_failure(&tool, format!("wait failed: {e}")))?
        }
        // Dropping the future drops the child, which kills it.
        Err(_) => {
            return Err(StatementError::RasterizerTimeout {
                tool,
                secs: options.timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StatementError::tool_failure(
            &tool,
            format!("exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    debug!("{} finished: {}", tool, output.status);
    Ok(())
}
