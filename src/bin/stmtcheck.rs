//! CLI binary for edgequake-statement.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` and prints the report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_statement::{
    analyze, inspect, AnalysisConfig, AnalysisProgressCallback, AnalysisReport, Outcome,
    ProgressCallback, Reconciliation, Severity, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that names the stage in flight and logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Loading");
        bar.set_message("Rasterising PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_document_loaded(&self, page_count: usize) {
        self.bar
            .println(format!("  {} Loaded {page_count} pages", green("✓")));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix("Analysing");
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage) {
        self.bar.println(format!("  {} {}", green("✓"), stage));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {}  {}", red("✗"), stage, red(&msg)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a statement
  stmtcheck statements/march.pdf

  # JSON report
  stmtcheck --json statements/march.pdf > report.json

  # Use a specific model
  stmtcheck --provider openai --model gpt-4o statement.pdf

  # Stop before fraud assessment when the ledger does not add up
  stmtcheck --halt-on-invalid-ledger statement.pdf

  # Print each page's text layer (no API key needed)
  stmtcheck --inspect-only statement.pdf

EXIT STATUS:
  0  analysis completed (or stopped on an invalid ledger)
  1  error
  2  document rejected: not a bank statement

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory) for text extraction

REQUIREMENTS:
  pdftoppm (poppler-utils) on PATH, or --rasterizer <PATH>
  libpdfium installed system-wide, or PDFIUM_LIB_PATH
"#;

/// Check PDF bank statements with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "stmtcheck",
    version,
    about = "Check PDF bank statements with Vision LLMs",
    long_about = "Rasterise a PDF bank statement, ask a Vision Language Model whether it is a \
statement, extract the account holder and the ledger, reconcile the balances locally, and \
assess signs of fraud.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// LLM model ID (e.g. gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "STMTCHECK_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Rasterizer binary (pdftoppm-compatible).
    #[arg(long, env = "STMTCHECK_RASTERIZER", default_value = "pdftoppm")]
    rasterizer: PathBuf,

    /// Rasterizer timeout in seconds.
    #[arg(long, env = "STMTCHECK_RASTERIZER_TIMEOUT", default_value_t = 60)]
    rasterizer_timeout: u64,

    /// Directory for intermediate page images (default: OS temp dir).
    #[arg(long, env = "STMTCHECK_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Minimum statement likelihood (0–100) to accept the document.
    #[arg(long, env = "STMTCHECK_THRESHOLD", default_value_t = 70,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: u8,

    /// Skip fraud assessment when the ledger is invalid.
    #[arg(long, env = "STMTCHECK_HALT_ON_INVALID_LEDGER")]
    halt_on_invalid_ledger: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "STMTCHECK_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per request.
    #[arg(long, env = "STMTCHECK_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "STMTCHECK_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-request LLM timeout in seconds.
    #[arg(long, env = "STMTCHECK_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "STMTCHECK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the full report as JSON.
    #[arg(long, env = "STMTCHECK_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "STMTCHECK_NO_PROGRESS")]
    no_progress: bool,

    /// Print each page's extracted text only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STMTCHECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "STMTCHECK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; INFO logs would only
    // scroll it away.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, show_progress: bool) -> Result<ExitCode> {
    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let pages = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&pages).context("Failed to serialise pages")?
            );
        } else {
            for page in &pages {
                println!("{}", bold(&format!("── Page {} ──", page.page_num)));
                println!("{}", page.text);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = spinner
        .clone()
        .map(|s| s as Arc<dyn AnalysisProgressCallback>);

    let config = build_config(cli, progress_cb)?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let result = analyze(&cli.input, &config).await;
    if let Some(ref s) = spinner {
        s.bar.finish_and_clear();
    }
    let report = result.context("Analysis failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else {
        print_report(&report);
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "{}",
            dim(&format!(
                "{} pages  {}ms load  {}ms inference  {}ms total",
                report.stats.page_count,
                report.stats.load_duration_ms,
                report.stats.inference_duration_ms,
                report.stats.total_duration_ms
            ))
        );
    }

    Ok(match report.outcome {
        Outcome::Rejected => ExitCode::from(2),
        Outcome::LedgerInvalid | Outcome::Completed => ExitCode::SUCCESS,
    })
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .dpi(cli.dpi)
        .rasterizer(cli.rasterizer.clone())
        .rasterizer_timeout_secs(cli.rasterizer_timeout)
        .acceptance_threshold(cli.threshold)
        .halt_on_invalid_ledger(cli.halt_on_invalid_ledger)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_report(report: &AnalysisReport) {
    let c = &report.classification;
    if !c.accepted {
        println!(
            "{} Document is not a statement (likelihood {}%)",
            red("✘"),
            c.statement_likelihood
        );
        println!("{}", dim(&c.concluding_thoughts));
        return;
    }
    println!(
        "{} Document is a statement (likelihood {}%)",
        green("✔"),
        c.statement_likelihood
    );

    if let Some(ref holder) = report.account_holder {
        println!();
        println!("{}    {}", bold("Name:"), holder.name.as_deref().unwrap_or("—"));
        println!("{} {}", bold("Address:"), holder.address.as_deref().unwrap_or("—"));
    }

    if let Some(ref extraction) = report.ledger {
        let ledger = &extraction.ledger;
        println!();
        if extraction.valid {
            println!("{} Transaction details are valid", green("✔"));
        } else {
            println!("{} Transaction details are not valid", yellow("⚠"));
            if extraction.missing_information {
                println!("  {}", dim("the model reported missing information"));
            }
        }
        println!("{}      {}", bold("Opening balance:"), ledger.opening);
        println!("{}   {}", bold("Closing (statement):"), ledger.closing);
        println!(
            "{}    {}",
            bold("Closing (model calc):"),
            extraction.service_calculated_closing
        );

        match report.reconciliation {
            Some(Reconciliation::Checked(ref check)) => {
                let mark = if check.matches { green("✔") } else { red("✘") };
                println!(
                    "{}    {} {}  {}",
                    bold("Closing (recomputed):"),
                    check.computed_closing,
                    check.currency,
                    mark
                );
                if !check.matches {
                    println!("  difference: {}", red(&check.difference.to_string()));
                }
            }
            Some(Reconciliation::Unavailable { ref reason }) => {
                println!("{} {}", bold("Reconciliation:"), yellow(reason));
            }
            None => {}
        }

        println!("{} {}", bold("Transactions:"), ledger.transactions.len());
        for tx in &ledger.transactions {
            let sign = match tx.direction {
                edgequake_statement::Direction::Incoming => green("+"),
                edgequake_statement::Direction::Outgoing => red("-"),
            };
            println!(
                "  {:<12} {}{:>12}  {}",
                tx.date,
                sign,
                tx.amount.value,
                tx.description.as_deref().unwrap_or("")
            );
        }
    }

    if report.outcome == Outcome::LedgerInvalid {
        println!();
        println!("{}", yellow("Fraud assessment skipped: ledger is invalid."));
    }

    if let Some(ref fraud) = report.fraud {
        println!();
        println!("{} {}%", bold("Fraud likelihood:"), fraud.fraud_likelihood);
        for concern in &fraud.concerns {
            let tag = match concern.severity {
                Severity::High => red("high"),
                Severity::Medium => yellow("medium"),
                Severity::Low => dim("low"),
            };
            println!("  [{}] {}", tag, concern.description);
        }
        if !fraud.analysis.is_empty() {
            println!();
            println!("{}", fraud.analysis);
        }
    }
}
