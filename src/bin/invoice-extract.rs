//! CLI binary for invoice-extract.
//!
//! A thin shim over the library crate that maps CLI flags to `ClientConfig`
//! and `ExtractorConfig`, runs one extraction and prints the response JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice_extract::config::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_PROVIDER};
use invoice_extract::{
    CapabilityTable, ClientConfig, ExtractError, Extractor, ExtractorConfig, Mode, ModelSelection,
    OcrOptions, RasterOptions, TesseractCli,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Vision model on page images (default)
  invoice-extract invoice.pdf

  # OCR + text model
  invoice-extract --mode ocr scan.jpg

  # Compare both strategies with different models
  invoice-extract --mode both --model-ocr openai/gpt-4o-mini \
      --model-llm google/gemini-2.5-flash invoice.pdf

  # Route a model through the raw HTTP transport
  echo '{"exact": {"qwen/qwen2.5-vl-72b-instruct": "http"}}' > caps.json
  invoice-extract --capabilities caps.json --model-llm qwen/qwen2.5-vl-72b-instruct invoice.pdf

EXIT STATUS:
  0  extraction ran (strategy failures are reported inside the JSON)
  1  configuration or internal error
  2  invalid request: unknown mode, missing or unreadable file

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY        Bearer key for the HTTP transport and OpenRouter
  INVOICE_EXTRACT_BASE_URL  OpenAI-compatible base URL (default OpenRouter)
  INVOICE_EXTRACT_PROVIDER  edgequake-llm provider name (default openrouter)
  PDFIUM_LIB_PATH           Path to an existing libpdfium — skips auto-download
  PDFIUM_AUTO_CACHE_DIR     Override the default pdfium cache directory
  RUST_LOG                  Log filter, overrides --verbose / --quiet
"#;

/// Extract structured fields from invoices and trade documents.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract structured fields from invoices and trade documents",
    long_about = "Extract parties, countries, commodities and transport details from a PDF or \
image of a trade document, either by sending page images to a multimodal model (llm) or by \
running OCR and structuring the text with a language model (ocr), or both.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image file.
    input: PathBuf,

    /// Strategy: llm, ocr or both.
    #[arg(long, env = "INVOICE_EXTRACT_MODE", default_value = "llm")]
    mode: String,

    /// Text model that structures OCR output.
    #[arg(long, env = "INVOICE_EXTRACT_OCR_MODEL", default_value = DEFAULT_MODEL)]
    model_ocr: String,

    /// Multimodal model that reads page images.
    #[arg(long, env = "INVOICE_EXTRACT_LLM_MODEL", default_value = DEFAULT_MODEL)]
    model_llm: String,

    /// Maximum pages sent to the multimodal model.
    #[arg(long, env = "INVOICE_EXTRACT_MAX_PAGES", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..=50))]
    max_pages: u32,

    /// Rendering DPI for the multimodal strategy (72–600).
    #[arg(long, env = "INVOICE_EXTRACT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Rendering DPI for OCR (72–600).
    #[arg(long, env = "INVOICE_EXTRACT_OCR_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    ocr_dpi: u32,

    /// Model call timeout in seconds.
    #[arg(long, env = "INVOICE_EXTRACT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// OpenAI-compatible base URL for the HTTP transport.
    #[arg(long, env = "INVOICE_EXTRACT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// edgequake-llm provider used by the unified transport.
    #[arg(long, env = "INVOICE_EXTRACT_PROVIDER", default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// Bearer key for the HTTP transport.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Sampling temperature. Provider default when unset.
    #[arg(long, env = "INVOICE_EXTRACT_TEMPERATURE")]
    temperature: Option<f32>,

    /// Maximum completion tokens. Provider default when unset.
    #[arg(long, env = "INVOICE_EXTRACT_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// JSON file mapping models to transports (see --help).
    #[arg(long, env = "INVOICE_EXTRACT_CAPABILITIES")]
    capabilities: Option<PathBuf>,

    /// tesseract executable.
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    tesseract: PathBuf,

    /// OCR language pack(s), e.g. eng or eng+fra.
    #[arg(long, env = "INVOICE_EXTRACT_LANG", default_value = "eng")]
    lang: String,

    /// Print JSON on one line instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "INVOICE_EXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let client_error = e
                .downcast_ref::<ExtractError>()
                .is_some_and(ExtractError::is_client_error);
            ExitCode::from(if client_error { 2 } else { 1 })
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Reject a bad mode before touching the network or the file system.
    let mode: Mode = cli.mode.parse()?;

    ensure_pdfium(cli.quiet)?;

    let client = Arc::new(build_client(&cli)?);
    let extractor = Extractor::new(client, build_extractor_config(&cli))?;
    let models = ModelSelection {
        ocr_model: cli.model_ocr.clone(),
        llm_model: cli.model_llm.clone(),
    };

    let spinner = (!cli.quiet).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER_TICKS),
        );
        bar.set_prefix("Extracting");
        bar.set_message(format!("{} ({mode})", cli.input.display()));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let result = extractor.extract(&cli.input, mode, &models).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let response = result?;

    let json = if cli.compact {
        serde_json::to_string(&response)
    } else {
        serde_json::to_string_pretty(&response)
    }
    .context("Failed to serialize response")?;
    println!("{json}");
    Ok(())
}

fn build_client(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .base_url(&cli.base_url)
        .provider_name(&cli.provider)
        .timeout(Duration::from_secs(cli.timeout))
        .title("invoice-extract");

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref path) = cli.capabilities {
        let table = CapabilityTable::from_json_file(path)
            .with_context(|| format!("Failed to load capability table {}", path.display()))?;
        builder = builder.capabilities(table);
    }

    Ok(builder.build()?)
}

fn build_extractor_config(cli: &Cli) -> ExtractorConfig {
    ExtractorConfig {
        raster: RasterOptions {
            max_pages: cli.max_pages as usize,
            dpi: cli.dpi,
            ..Default::default()
        },
        ocr: OcrOptions { dpi: cli.ocr_dpi },
        tesseract: TesseractCli::new(&cli.tesseract).with_language(&cli.lang),
    }
}

/// Download pdfium (~30 MB) on first run; later runs only check the cache.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}
