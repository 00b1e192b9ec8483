//! End-to-end tests against a live model backend.
//!
//! These use real documents in `./test_cases/` and make paid API calls.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 OPENROUTER_API_KEY=sk-or-... cargo test --test e2e -- --nocapture
//!
//! The OCR tests also need `tesseract` on `PATH`.

use invoice_extract::{
    ClientConfig, ExtractionResponse, Extractor, ExtractorConfig, Mode, ModelSelection,
    SingleResponse,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no document at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if std::env::var("OPENROUTER_API_KEY").is_err() {
            println!("SKIP — OPENROUTER_API_KEY not set");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_extractor() -> Extractor {
    let client = ClientConfig::from_env().expect("client config");
    Extractor::new(Arc::new(client), ExtractorConfig::default()).expect("extractor")
}

/// Assert a successful result has the fields every invoice carries.
fn assert_invoice(resp: &SingleResponse, context: &str) {
    let invoice = resp
        .structured_data
        .invoice()
        .unwrap_or_else(|| panic!("[{context}] extraction failed: {:?}", resp.structured_data));

    let parties = invoice.parties.as_deref().unwrap_or_default();
    assert!(!parties.is_empty(), "[{context}] no parties extracted");
    assert!(
        parties.iter().any(|p| p.party_name.is_some()),
        "[{context}] parties without names"
    );

    let usage = resp.usage.unwrap_or_else(|| panic!("[{context}] no usage reported"));
    assert!(usage.prompt_tokens > 0);

    println!(
        "[{context}] ✓  {} parties, {} tokens",
        parties.len(),
        usage.total_tokens
    );
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_llm_invoice_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));

    let resp = live_extractor()
        .extract(&path, Mode::Llm, &ModelSelection::default())
        .await
        .expect("extract");

    let ExtractionResponse::Single(single) = resp else {
        panic!("expected single response");
    };
    assert_invoice(&single, "llm/invoice.pdf");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_both_invoice_image() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.jpg"));

    let resp = live_extractor()
        .extract(&path, Mode::Both, &ModelSelection::default())
        .await
        .expect("extract");

    let json = serde_json::to_string_pretty(&resp).expect("serialize");
    println!("{json}");

    let ExtractionResponse::Combined(combined) = resp else {
        panic!("expected combined response");
    };
    assert_invoice(&combined.llm, "both/llm");
    // OCR quality depends on the local tesseract install; only check shape.
    assert_eq!(combined.ocr.model, ModelSelection::default().ocr_model);
}
