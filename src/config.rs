//! Configuration for statement analysis.
//!
//! Every knob lives in [`AnalysisConfig`], built via
//! [`AnalysisConfigBuilder`]. The provider is part of the config rather than
//! a global, so tests and embedders can inject their own.

use crate::error::StatementError;
use crate::pipeline::rasterize::{RasterizerOptions, DEFAULT_RASTERIZER};
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a statement analysis run.
///
/// # Example
/// ```rust
/// use edgequake_statement::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .dpi(200)
///     .acceptance_threshold(80)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Rasterisation DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Rasterizer binary. Default: `pdftoppm`.
    pub rasterizer: PathBuf,

    /// Wall-clock limit for the rasterizer process in seconds. Default: 60.
    pub rasterizer_timeout_secs: u64,

    /// Directory for intermediate page images. Default: the OS temp dir.
    pub scratch_dir: PathBuf,

    /// Minimum classification likelihood (0–100) to accept a document as a
    /// bank statement. Inclusive. Default: 70.
    pub acceptance_threshold: u8,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens per structured reply. Default: 4096.
    ///
    /// Ledger extraction on a long statement is the largest reply; 4096
    /// covers a few hundred transactions.
    pub max_tokens: usize,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents (text extraction).
    pub password: Option<String>,

    /// Skip fraud assessment when the ledger does not reconcile. Default: false.
    ///
    /// Off by default: an inconsistent ledger is reported and the fraud
    /// assessment still runs, since it is the stage most likely to explain
    /// the inconsistency.
    pub halt_on_invalid_ledger: bool,

    /// Optional stage-level progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            rasterizer: PathBuf::from(DEFAULT_RASTERIZER),
            rasterizer_timeout_secs: 60,
            scratch_dir: std::env::temp_dir(),
            acceptance_threshold: 70,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            halt_on_invalid_ledger: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("dpi", &self.dpi)
            .field("rasterizer", &self.rasterizer)
            .field("rasterizer_timeout_secs", &self.rasterizer_timeout_secs)
            .field("scratch_dir", &self.scratch_dir)
            .field("acceptance_threshold", &self.acceptance_threshold)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("halt_on_invalid_ledger", &self.halt_on_invalid_ledger)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Rasterizer settings derived from this config.
    pub fn rasterizer_options(&self) -> RasterizerOptions {
        RasterizerOptions {
            binary: self.rasterizer.clone(),
            dpi: self.dpi,
            timeout: Duration::from_secs(self.rasterizer_timeout_secs),
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnalysisConfigBuilder").field(&self.config).finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn rasterizer(mut self, binary: impl Into<PathBuf>) -> Self {
        self.config.rasterizer = binary.into();
        self
    }

    pub fn rasterizer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.rasterizer_timeout_secs = secs;
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn acceptance_threshold(mut self, threshold: u8) -> Self {
        self.config.acceptance_threshold = threshold.min(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn halt_on_invalid_ledger(mut self, v: bool) -> Self {
        self.config.halt_on_invalid_ledger = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, StatementError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(StatementError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.rasterizer_timeout_secs == 0 {
            return Err(StatementError::InvalidConfig(
                "Rasterizer timeout must be ≥ 1s".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(StatementError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if c.max_tokens == 0 {
            return Err(StatementError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.rasterizer.as_os_str().is_empty() {
            return Err(StatementError::InvalidConfig(
                "Rasterizer binary must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
