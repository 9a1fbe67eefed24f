use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::json;

use sheetlens::compare::{ComparisonView, RunSelection};
use sheetlens::core::model::DocumentResults;
use sheetlens::pipeline::{export_results, load_session, ExportFormat, ReviewConfig};
use sheetlens::session::{ReviewState, RunKind};
use sheetlens::source::{JsonFileSource, ResultsSource};

fn temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{}-{now}", std::process::id()))
}

fn word(text: &str, x0: f64, confidence: f64) -> serde_json::Value {
    json!({"text": text, "bbox": [x0, 100.0, x0 + 80.0, 140.0], "confidence": confidence})
}

/// A floor plan with a render run, two OCR runs, one failed OCR run, a
/// detection run, a layout run and a VLM run. Newest first.
fn floor_plan() -> serde_json::Value {
    json!({
        "document": {
            "id": 42,
            "filename": "A-101 Floor Plan.pdf",
            "page_count": 1,
            "stored_path": "/data/uploads/a101.pdf",
            "uploaded_at": "2024-05-01T09:00:00"
        },
        "runs": [
            {"id": 7, "stage": "vlm:qwen2-vl:7b:title_block", "status": "completed",
             "output": {"model": "qwen2-vl:7b", "prompt_key": "title_block",
                        "output": {"raw": "{\"sheet\": \"A-101\"}", "parsed": {"sheet": "A-101"}}}},
            {"id": 6, "stage": "layout:layoutlmv3", "status": "completed",
             "output": {"pages": [{"page": 1, "tokens": [
                 {"word": "FLOOR", "label": "B-HEADER", "bbox": [100, 50, 300, 80], "score": 0.7},
                 {"word": "PLAN", "label": "I-HEADER", "bbox": [310, 50, 450, 80]}
             ]}]}},
            {"id": 5, "stage": "detect:yolov8", "status": "completed",
             "started_at": "2024-05-01T09:05:00", "finished_at": "2024-05-01T09:05:02",
             "output": {"pages": [{"page": 1, "detections": [
                 {"label": "door", "confidence": 0.9, "bbox": [170, 220, 340, 440]}
             ]}]}},
            {"id": 4, "stage": "ocr:easyocr", "status": "failed",
             "output": {"error": "model weights missing"}},
            {"id": 3, "stage": "ocr:paddleocr", "status": "completed",
             "output": {"pages": [{"page": 1, "words": [word("FLOOR", 100.0, 0.6), word("PLAN", 200.0, 0.8)]}],
                        "metrics": {"elapsed_ms": 900}}},
            {"id": 2, "stage": "ocr:tesseract", "status": "completed",
             "output": {"pages": [{"page": 1, "words": [word("FL00R", 100.0, 0.5), word("PLAN", 200.0, 0.5)]}],
                        "metrics": {"elapsed_ms": 1500}}},
            {"id": 1, "stage": "render", "status": "completed",
             "output": {"pages": [{"page": 1, "url": "/files/pages/a101_page_1.png", "width": 1700, "height": 2200}]}}
        ]
    })
}

fn write_fixture(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("results.json");
    fs::write(&path, serde_json::to_string_pretty(&floor_plan())?)?;
    Ok(path)
}

#[test]
fn loads_snapshot_from_file_into_session() -> Result<()> {
    let dir = temp_dir("sheetlens-load");
    let path = write_fixture(&dir)?;

    let session = load_session(&JsonFileSource::new(path), ReviewConfig::default())?;

    assert_eq!(session.document().map(|d| d.id), Some(42));
    assert_eq!(session.runs().len(), 7);
    assert_eq!(session.pages().len(), 1);
    assert_eq!(session.state(), ReviewState::Comparable);

    let _ = fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn missing_results_file_reports_path() {
    let source = JsonFileSource::new(PathBuf::from("/nonexistent/results.json"));
    let err = source.fetch_results().unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/results.json"));
}

#[test]
fn metrics_group_runs_by_stage_type() -> Result<()> {
    let results: DocumentResults = serde_json::from_value(floor_plan())?;
    let mut session = sheetlens::ReviewSession::new(ReviewConfig::default());
    session.apply_results(results);

    let report = session.metrics();
    assert_eq!(report.total_runs, 7);
    let stage_types: Vec<_> = report.by_stage.iter().map(|s| s.stage_type.as_str()).collect();
    assert_eq!(stage_types, vec!["vlm", "layout", "detect", "ocr", "render"]);

    let ocr = report.stage("ocr").expect("ocr stage");
    assert_eq!(ocr.run_count(), 3);
    assert_eq!(ocr.summary.fastest_provider.as_deref(), Some("paddleocr"));
    assert_eq!(ocr.fastest_elapsed_ms(), Some(900));
    assert_eq!(ocr.summary.highest_confidence_provider.as_deref(), Some("paddleocr"));

    let failed = ocr.runs.iter().find(|r| r.run_id == 4).expect("failed run listed");
    assert_eq!(failed.error.as_deref(), Some("model weights missing"));
    assert_eq!(failed.word_count, None);
    assert_eq!(failed.avg_confidence, None);

    let detect = report.stage("detect").expect("detect stage");
    assert_eq!(detect.runs[0].elapsed_ms, Some(2000));
    assert_eq!(detect.runs[0].detection_count, Some(1));

    let vlm = report.stage("vlm").expect("vlm stage");
    assert_eq!(vlm.runs[0].prompt_key.as_deref(), Some("title_block"));
    assert_eq!(vlm.runs[0].variant.as_deref(), Some("7b:title_block"));
    Ok(())
}

#[test]
fn comparison_needs_two_selected_ocr_runs() -> Result<()> {
    let results: DocumentResults = serde_json::from_value(floor_plan())?;
    let mut session = sheetlens::ReviewSession::new(ReviewConfig::default());
    session.apply_results(results);

    let mut selection = RunSelection::new();
    selection.toggle(3);
    match session.compare(&selection) {
        ComparisonView::AwaitingSelection { candidates, selected } => {
            assert_eq!(candidates, vec![3, 2]);
            assert_eq!(selected, 1);
        }
        other => panic!("unexpected view: {other:?}"),
    }

    selection.toggle(2);
    let ComparisonView::Ready(comparison) = session.compare(&selection) else {
        panic!("expected a ready comparison");
    };
    assert_eq!(comparison.columns.len(), 2);
    let tesseract = comparison.column(2).expect("tesseract column");
    assert_eq!(tesseract.provider, "tesseract");
    assert_eq!(tesseract.pages[0].text, "FL00R PLAN");
    assert_eq!(tesseract.elapsed_ms, Some(1500));
    assert_eq!(comparison.agreements.len(), 1);
    assert_eq!(comparison.agreements[0].edits, 1);
    assert_eq!(comparison.agreements[0].score, 0.5);
    Ok(())
}

#[test]
fn review_page_defaults_to_newest_annotated_run() -> Result<()> {
    let results: DocumentResults = serde_json::from_value(floor_plan())?;
    let mut session = sheetlens::ReviewSession::new(ReviewConfig::default());
    session.apply_results(results);

    let review = session.review_page(None, 1, "").expect("page 1 has annotations");
    assert_eq!(review.run_id, 6);
    assert_eq!(review.annotations.len(), 2);

    let detections = session.review_page(Some(5), 1, "DOOR").expect("detect run");
    let overlay = detections.overlay();
    assert_eq!(overlay.boxes.len(), 1);
    assert_eq!(overlay.skipped, 0);
    let rect = overlay.boxes[0].rect;
    assert!((rect.left - 0.1).abs() < 1e-9);
    assert!((rect.top - 0.1).abs() < 1e-9);

    assert!(session.review_page(Some(5), 1, "window").expect("detect run").matches().is_empty());
    Ok(())
}

#[test]
fn recorded_runs_update_status_and_pages() -> Result<()> {
    let mut session = sheetlens::ReviewSession::new(ReviewConfig::default());
    session.set_document(serde_json::from_value(json!({"id": 9, "filename": "S-201.pdf"}))?);
    assert_eq!(session.state(), ReviewState::DocumentReady);

    session.begin(RunKind::Render);
    assert_eq!(session.status(), "Processing...");
    session.record_run(
        RunKind::Render,
        serde_json::from_value(json!({"id": 1, "stage": "render", "status": "completed",
            "output": {"pages": [{"page": 1, "url": "/files/pages/s_page_1.png", "width": 800, "height": 600}]}}))?,
    );
    assert_eq!(session.pages().len(), 1);
    assert_eq!(session.state(), ReviewState::RunAvailable);

    session.fail(RunKind::Ocr);
    assert_eq!(session.status(), "OCR failed.");
    assert_eq!(session.runs().len(), 1);
    Ok(())
}

#[test]
fn exports_json_csv_and_overlay_pages() -> Result<()> {
    let results: DocumentResults = serde_json::from_value(floor_plan())?;
    let output = temp_dir("sheetlens-export");

    export_results(
        &results,
        &output,
        &[ExportFormat::Json, ExportFormat::Csv, ExportFormat::Html],
        ReviewConfig::default(),
    )?;

    let exported: serde_json::Value = serde_json::from_str(&fs::read_to_string(output.join("results.json"))?)?;
    assert_eq!(exported["document_id"], json!(42));
    assert_eq!(exported["runs"].as_array().map(Vec::len), Some(7));

    let csv = fs::read_to_string(output.join("results.csv"))?;
    assert_eq!(csv.lines().count(), 8);

    let html = fs::read_to_string(output.join("overlay/page_001.html"))?;
    assert!(html.contains("FLOOR (B-HEADER)"));
    assert!(html.contains("/files/pages/a101_page_1.png"));

    let _ = fs::remove_dir_all(&output);
    Ok(())
}
