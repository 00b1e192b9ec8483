//! Integration tests for the extraction orchestrator.
//!
//! The model backend and the OCR engine are replaced by in-process fakes, so
//! these run offline. Tests that need the pdfium library are `#[ignore]`d;
//! run them with `cargo test --test extraction -- --ignored` (the library is
//! downloaded on first use).

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use invoice_extract::{
    rasterize, ChatReply, ChatRequest, ChatTransport, ContentPart, ExtractError,
    ExtractionOutcome, ExtractionResponse, ExtractionStrategy, Extractor, ExtractorConfig, Method,
    Mode, ModelSelection, OcrEngine, OcrError, OcrOptions, RasterOptions, RasterizationError,
    StrategyResult, TransportError, UsageMetadata,
};
use invoice_extract::pipeline::ocr::extract_text;
use invoice_extract::pipeline::render::stream_pages;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Transport that records requests and replays a fixed outcome.
struct FakeTransport {
    reply: Result<&'static str, u16>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeTransport {
    fn replying(content: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(content),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(status),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn models(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.reply {
            Ok(content) => Ok(ChatReply {
                content: content.to_string(),
                usage: UsageMetadata::reported(900, 150, Some(1050)),
            }),
            Err(status) => Err(TransportError::Status {
                status,
                body: "{\"error\":\"upstream\"}".into(),
            }),
        }
    }
}

/// OCR engine returning the same text for every page.
struct FakeOcr {
    text: &'static str,
    pages: AtomicUsize,
}

impl FakeOcr {
    fn new(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text,
            pages: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    async fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
        let n = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{} (page {n})", self.text))
    }
}

/// OCR engine whose binary is missing.
struct MissingOcr {
    calls: AtomicUsize,
}

#[async_trait]
impl OcrEngine for MissingOcr {
    fn name(&self) -> &str {
        "missing-ocr"
    }

    async fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OcrError::EngineUnavailable {
            engine: "missing-ocr".into(),
            detail: "not installed".into(),
        })
    }
}

/// Strategy that only counts invocations.
struct CountingStrategy {
    method: Method,
    calls: AtomicUsize,
}

impl CountingStrategy {
    fn new(method: Method) -> Arc<Self> {
        Arc::new(Self {
            method,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionStrategy for CountingStrategy {
    fn method(&self) -> Method {
        self.method
    }

    async fn extract(&self, _path: &Path, _model: &str) -> StrategyResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (ExtractionOutcome::failed("counted"), None)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const INVOICE_JSON: &str = r#"{
  "Parties": [
    {"PartyName": "Fresh Harvest Exports", "Role": "Exporter", "Location": {"City": "Nashik", "Country": "India"}},
    {"PartyName": "Nordic Fruit AB", "Role": "Consignee", "Location": {"City": "Gothenburg", "Country": "Sweden"}}
  ],
  "CountryOverview": {"CountryOfOrigin": "India", "CountryOfDestination": null, "TransitCountry": null},
  "CommodityDetails": [{"DescriptionOfGoods": "Fresh table grapes", "HSCode": "0806.10"}],
  "Transportation": {"MeansOfTransport": "Sea", "VesselNumber": "MSC-4471"}
}"#;

fn write_scan(dir: &Path, w: u32, h: u32) -> PathBuf {
    let path = dir.join("invoice.png");
    RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
        .save(&path)
        .unwrap();
    path
}

/// A structurally valid PDF whose page `i` is `100 + 10 * i` points wide.
fn write_pdf(dir: &Path, pages: usize) -> PathBuf {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages)
                .map(|i| format!("{} 0 R", i + 3))
                .collect::<Vec<_>>()
                .join(" "),
            pages
        ),
    ];
    for i in 0..pages {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} 100] >>",
            100 + 10 * i
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, obj));
    }
    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for off in offsets {
        pdf.push_str(&format!("{off:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));

    let path = dir.join("invoice.pdf");
    std::fs::write(&path, pdf).unwrap();
    path
}

/// Bind libpdfium for the PDF tests, downloading it on first use.
fn ensure_pdfium() {
    tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
        .expect("pdfium library");
}

fn extractor(transport: Arc<FakeTransport>, ocr: Arc<FakeOcr>) -> Extractor {
    Extractor::with_transport(transport, ocr, ExtractorConfig::default()).unwrap()
}

// ── Mode handling ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_mode_rejected_before_any_work() {
    let vision = CountingStrategy::new(Method::Llm);
    let ocr = CountingStrategy::new(Method::Ocr);
    let extractor = Extractor::with_strategies(vision.clone(), ocr.clone());

    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 50, 50);
    let err = extractor
        .extract_str(&path, "xyz", &ModelSelection::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::InvalidMode { .. }));
    assert!(err.is_client_error());
    assert_eq!(vision.calls() + ocr.calls(), 0);
}

#[tokio::test]
async fn missing_file_is_hard_error() {
    let vision = CountingStrategy::new(Method::Llm);
    let ocr = CountingStrategy::new(Method::Ocr);
    let extractor = Extractor::with_strategies(vision.clone(), ocr.clone());

    let err = extractor
        .extract("/nonexistent/invoice.pdf", Mode::Both, &ModelSelection::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractError::FileNotFound { .. }));
    assert_eq!(vision.calls() + ocr.calls(), 0);
}

#[tokio::test]
async fn single_mode_runs_one_strategy() {
    let vision = CountingStrategy::new(Method::Llm);
    let ocr = CountingStrategy::new(Method::Ocr);
    let extractor = Extractor::with_strategies(vision.clone(), ocr.clone());
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 50, 50);

    let resp = extractor
        .extract(&path, Mode::Ocr, &ModelSelection::default())
        .await
        .unwrap();
    assert!(matches!(resp, ExtractionResponse::Single(ref r) if r.method == Method::Ocr));
    assert_eq!((ocr.calls(), vision.calls()), (1, 0));
}

#[tokio::test]
async fn both_mode_has_two_keys_when_both_fail() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 200, 100);
    let extractor = extractor(FakeTransport::failing(503), FakeOcr::new("INVOICE"));

    let resp = extractor
        .extract(&path, Mode::Both, &ModelSelection::default())
        .await
        .unwrap();
    let value = serde_json::to_value(&resp).unwrap();
    let obj = value.as_object().unwrap();

    assert_eq!(obj.len(), 2);
    for (key, method) in [("OCR", "ocr"), ("LLM", "llm")] {
        let entry = &obj[key];
        assert_eq!(entry["method"], method);
        assert!(entry["structured_data"]["error"]
            .as_str()
            .unwrap()
            .starts_with("503"));
        assert!(entry["usage"].is_null());
    }
}

#[tokio::test]
async fn both_mode_uses_separate_models_ocr_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 200, 100);
    let transport = FakeTransport::replying(INVOICE_JSON);
    let extractor = extractor(transport.clone(), FakeOcr::new("COMMERCIAL INVOICE"));
    let models = ModelSelection {
        ocr_model: "openai/gpt-4o-mini".into(),
        llm_model: "google/gemini-2.5-flash".into(),
    };

    let resp = extractor.extract(&path, Mode::Both, &models).await.unwrap();

    assert_eq!(
        transport.models(),
        vec!["openai/gpt-4o-mini", "google/gemini-2.5-flash"]
    );
    let ExtractionResponse::Combined(combined) = resp else {
        panic!("expected combined response");
    };
    assert_eq!(combined.ocr.model, "openai/gpt-4o-mini");
    assert_eq!(combined.llm.model, "google/gemini-2.5-flash");
    assert_eq!(combined.llm.usage.unwrap().total_tokens, 1050);

    // Results are reported side by side, not merged.
    let requests = transport.requests.lock().unwrap();
    assert!(!requests[0].has_images());
    assert!(requests[1].has_images());
}

// ── Field semantics ──────────────────────────────────────────────────────────

#[tokio::test]
async fn destination_stays_null_when_not_stated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 200, 100);
    let extractor = extractor(FakeTransport::replying(INVOICE_JSON), FakeOcr::new("x"));

    let resp = extractor
        .extract(&path, Mode::Llm, &ModelSelection::default())
        .await
        .unwrap();
    let value = serde_json::to_value(&resp).unwrap();
    let overview = &value["structured_data"]["CountryOverview"];

    assert_eq!(overview["CountryOfOrigin"], "India");
    assert!(overview.get("CountryOfDestination").unwrap().is_null());
    assert!(overview.get("TransitCountry").unwrap().is_null());
}

#[tokio::test]
async fn fenced_and_bare_replies_give_same_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 200, 100);
    let fenced: &'static str = Box::leak(format!("```json\n{INVOICE_JSON}\n```").into_boxed_str());

    let a = extractor(FakeTransport::replying(INVOICE_JSON), FakeOcr::new("x"))
        .extract(&path, Mode::Llm, &ModelSelection::default())
        .await
        .unwrap();
    let b = extractor(FakeTransport::replying(fenced), FakeOcr::new("x"))
        .extract(&path, Mode::Llm, &ModelSelection::default())
        .await
        .unwrap();

    assert_eq!(a, b);
}

#[tokio::test]
async fn ocr_without_text_makes_no_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 200, 100);
    let transport = FakeTransport::replying(INVOICE_JSON);

    struct Blank;
    #[async_trait]
    impl OcrEngine for Blank {
        fn name(&self) -> &str {
            "blank"
        }
        async fn recognize(&self, _png: &[u8]) -> Result<String, OcrError> {
            Ok("\n\x0c".into())
        }
    }

    let extractor =
        Extractor::with_transport(transport.clone(), Arc::new(Blank), ExtractorConfig::default())
            .unwrap();
    let resp = extractor
        .extract(&path, Mode::Ocr, &ModelSelection::default())
        .await
        .unwrap();

    let ExtractionResponse::Single(single) = resp else {
        panic!("expected single response");
    };
    assert_eq!(single.structured_data.error(), Some("No text to analyze."));
    assert!(single.usage.is_none());
    assert!(transport.models().is_empty());
}

// ── Input variants ───────────────────────────────────────────────────────────

#[tokio::test]
async fn extract_from_bytes_reads_in_memory_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 120, 60);
    let bytes = std::fs::read(&path).unwrap();
    let transport = FakeTransport::replying(INVOICE_JSON);

    let resp = extractor(transport.clone(), FakeOcr::new("x"))
        .extract_from_bytes(&bytes, Mode::Llm, &ModelSelection::default())
        .await
        .unwrap();

    let ExtractionResponse::Single(single) = resp else {
        panic!("expected single response");
    };
    assert!(!single.structured_data.is_error());
    let requests = transport.requests.lock().unwrap();
    let images = requests[0]
        .parts
        .iter()
        .filter(|p| matches!(p, ContentPart::Image { .. }))
        .count();
    assert_eq!(images, 1);
}

#[test]
fn extract_sync_outside_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 80, 40);

    let resp = extractor(FakeTransport::replying(INVOICE_JSON), FakeOcr::new("x"))
        .extract_sync(&path, Mode::Llm, &ModelSelection::default())
        .unwrap();
    assert_eq!(resp.responses().len(), 1);
}

#[tokio::test]
async fn large_image_is_downscaled_before_sending() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), 4000, 3000);

    let pages = rasterize(&path, &RasterOptions::default()).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!((pages[0].width, pages[0].height), (2000, 1500));
    assert!(pages[0].to_data_url().starts_with("data:image/jpeg;base64,"));
}

// ── PDF (needs pdfium) ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs the pdfium library"]
async fn pdf_over_cap_yields_cap_pages_in_order() {
    ensure_pdfium();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), 7);
    let options = RasterOptions {
        dpi: 72,
        ..Default::default()
    };

    let pages = rasterize(&path, &options).await.unwrap();

    assert_eq!(pages.len(), 5);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.page_index, i);
        assert_eq!(page.width, 100 + 10 * i as u32);
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs the pdfium library"]
async fn ocr_reads_every_pdf_page() {
    ensure_pdfium();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), 7);
    let transport = FakeTransport::replying(INVOICE_JSON);
    let ocr = FakeOcr::new("line");

    extractor(transport.clone(), ocr.clone())
        .extract(&path, Mode::Ocr, &ModelSelection::default())
        .await
        .unwrap();

    assert_eq!(ocr.pages.load(Ordering::SeqCst), 7);
    let text = transport.requests.lock().unwrap()[0].joined_text();
    assert!(text.ends_with("line (page 1)\nline (page 2)\nline (page 3)\nline (page 4)\nline (page 5)\nline (page 6)\nline (page 7)"));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs the pdfium library"]
async fn ocr_pages_stream_in_order_full_size() {
    ensure_pdfium();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), 7);

    let mut rx = stream_pages(&path, 144);
    let mut seen = Vec::new();
    while let Some(page) = rx.recv().await {
        let (idx, image) = page.unwrap();
        seen.push((idx, image.width()));
    }
    let expected: Vec<(usize, u32)> = (0..7).map(|i| (i, 2 * (100 + 10 * i as u32))).collect();
    assert_eq!(seen, expected);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs the pdfium library"]
async fn missing_ocr_engine_stops_after_first_page() {
    ensure_pdfium();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), 7);
    let engine = MissingOcr {
        calls: AtomicUsize::new(0),
    };

    let text = extract_text(&path, &engine, &OcrOptions::default()).await;

    assert_eq!(text, "");
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs the pdfium library"]
async fn empty_pdf_is_an_error_not_an_empty_list() {
    ensure_pdfium();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pdf(dir.path(), 0);

    let err = rasterize(&path, &RasterOptions::default()).await.unwrap_err();
    assert!(
        matches!(
            err,
            RasterizationError::NoPages { .. } | RasterizationError::CorruptPdf { .. }
        ),
        "got {err:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs the pdfium library"]
async fn corrupt_pdf_is_contained_in_llm_result() {
    ensure_pdfium();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.7\nthis is not a pdf body").unwrap();
    let transport = FakeTransport::replying(INVOICE_JSON);

    let resp = extractor(transport.clone(), FakeOcr::new("x"))
        .extract(&path, Mode::Llm, &ModelSelection::default())
        .await
        .unwrap();

    let ExtractionResponse::Single(single) = resp else {
        panic!("expected single response");
    };
    assert!(single.structured_data.is_error());
    assert!(transport.models().is_empty());
}
