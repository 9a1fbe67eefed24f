use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::geometry::{BBox, PageSize};
use crate::core::stage::StageId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub stored_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub page: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Page {
    pub fn size(&self) -> Option<PageSize> {
        PageSize::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[serde(alias = "running")]
    Pending,
    #[serde(alias = "completed")]
    Success,
    #[serde(alias = "failed")]
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BBox,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub label: String,
    pub bbox: BBox,
    pub confidence: f64,
}

/// Layout token; `bbox` sits on the 0..1000 grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutToken {
    pub word: String,
    pub label: String,
    pub bbox: BBox,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrPage {
    pub page: u32,
    #[serde(default)]
    pub words: Vec<OcrWord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionPage {
    pub page: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutPage {
    pub page: u32,
    #[serde(default)]
    pub tokens: Vec<LayoutToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VlmPage {
    pub page: u32,
    pub output: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PagedOutput<P> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub pages: Vec<P>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RenderOutput {
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct VlmOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<VlmPage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
}

/// The backend sends an untagged object; decoding classifies it by which
/// fields are present (see `RawRunOutput`). Serialization writes the
/// untagged shape back.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RunOutput {
    Failed { error: String },
    Ocr(PagedOutput<OcrPage>),
    Detection(PagedOutput<DetectionPage>),
    Layout(PagedOutput<LayoutPage>),
    Render(RenderOutput),
    Vlm(VlmOutput),
    #[default]
    Empty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageFragment<'a> {
    pub page: u32,
    pub words: &'a [OcrWord],
    pub detections: &'a [Detection],
    pub tokens: &'a [LayoutToken],
}

impl<'a> PageFragment<'a> {
    pub fn has_annotations(&self) -> bool {
        !self.words.is_empty() || !self.detections.is_empty() || !self.tokens.is_empty()
    }
}

impl RunOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            RunOutput::Failed { .. } => "failed",
            RunOutput::Ocr(_) => "ocr",
            RunOutput::Detection(_) => "detection",
            RunOutput::Layout(_) => "layout",
            RunOutput::Render(_) => "render",
            RunOutput::Vlm(_) => "vlm",
            RunOutput::Empty => "empty",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RunOutput::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn metrics(&self) -> Option<&RunMetrics> {
        match self {
            RunOutput::Ocr(out) => out.metrics.as_ref(),
            RunOutput::Detection(out) => out.metrics.as_ref(),
            RunOutput::Layout(out) => out.metrics.as_ref(),
            RunOutput::Vlm(out) => out.metrics.as_ref(),
            RunOutput::Failed { .. } | RunOutput::Render(_) | RunOutput::Empty => None,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            RunOutput::Ocr(out) => out.model.as_deref(),
            RunOutput::Detection(out) => out.model.as_deref(),
            RunOutput::Layout(out) => out.model.as_deref(),
            RunOutput::Vlm(out) => out.model.as_deref(),
            RunOutput::Failed { .. } | RunOutput::Render(_) | RunOutput::Empty => None,
        }
    }

    pub fn prompt_key(&self) -> Option<&str> {
        match self {
            RunOutput::Vlm(out) => out.prompt_key.as_deref(),
            _ => None,
        }
    }

    pub fn page_count(&self) -> Option<usize> {
        match self {
            RunOutput::Ocr(out) => Some(out.pages.len()),
            RunOutput::Detection(out) => Some(out.pages.len()),
            RunOutput::Layout(out) => Some(out.pages.len()),
            RunOutput::Render(out) => Some(out.pages.len()),
            RunOutput::Vlm(out) if !out.pages.is_empty() => Some(out.pages.len()),
            RunOutput::Vlm(_) | RunOutput::Failed { .. } | RunOutput::Empty => None,
        }
    }

    pub fn fragments(&self) -> Vec<PageFragment<'_>> {
        match self {
            RunOutput::Ocr(out) => out
                .pages
                .iter()
                .map(|p| PageFragment {
                    page: p.page,
                    words: &p.words,
                    ..PageFragment::default()
                })
                .collect(),
            RunOutput::Detection(out) => out
                .pages
                .iter()
                .map(|p| PageFragment {
                    page: p.page,
                    detections: &p.detections,
                    ..PageFragment::default()
                })
                .collect(),
            RunOutput::Layout(out) => out
                .pages
                .iter()
                .map(|p| PageFragment {
                    page: p.page,
                    tokens: &p.tokens,
                    ..PageFragment::default()
                })
                .collect(),
            RunOutput::Render(_) | RunOutput::Vlm(_) | RunOutput::Failed { .. } | RunOutput::Empty => {
                Vec::new()
            }
        }
    }

    pub fn page_fragment(&self, page: u32) -> Option<PageFragment<'_>> {
        self.fragments().into_iter().find(|fragment| fragment.page == page)
    }

    pub fn rendered_pages(&self) -> Option<&[Page]> {
        match self {
            RunOutput::Render(out) => Some(&out.pages),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawRunOutput {
    error: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    prompt_key: Option<String>,
    prompt: Option<String>,
    pages: Option<Vec<RawPage>>,
    metrics: Option<RunMetrics>,
    parsed: Option<Value>,
    raw: Option<String>,
    output: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPage {
    #[serde(default)]
    page: u32,
    words: Option<Vec<OcrWord>>,
    detections: Option<Vec<Detection>>,
    tokens: Option<Vec<LayoutToken>>,
    token_count: Option<u32>,
    note: Option<String>,
    text: Option<String>,
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    output: Option<Value>,
}

impl RawPage {
    fn is_render(&self) -> bool {
        self.url.is_some() || self.width.is_some() || self.height.is_some()
    }
}

impl From<RawRunOutput> for RunOutput {
    fn from(raw: RawRunOutput) -> Self {
        if let Some(error) = raw.error {
            return RunOutput::Failed { error };
        }

        let pages = raw.pages.unwrap_or_default();
        let has = |probe: fn(&RawPage) -> bool| pages.iter().any(probe);

        if has(|p| p.detections.is_some()) {
            return RunOutput::Detection(PagedOutput {
                provider: raw.provider,
                model: raw.model,
                metrics: raw.metrics,
                pages: pages
                    .into_iter()
                    .map(|p| DetectionPage {
                        page: p.page,
                        detections: p.detections.unwrap_or_default(),
                    })
                    .collect(),
            });
        }
        if has(|p| p.tokens.is_some()) {
            return RunOutput::Layout(PagedOutput {
                provider: raw.provider,
                model: raw.model,
                metrics: raw.metrics,
                pages: pages
                    .into_iter()
                    .map(|p| LayoutPage {
                        page: p.page,
                        tokens: p.tokens.unwrap_or_default(),
                        token_count: p.token_count,
                        note: p.note,
                    })
                    .collect(),
            });
        }
        if has(|p| p.words.is_some()) {
            return ocr_output(raw.provider, raw.model, raw.metrics, pages);
        }
        if has(RawPage::is_render) {
            return RunOutput::Render(RenderOutput {
                pages: pages
                    .into_iter()
                    .map(|p| Page {
                        page: p.page,
                        url: p.url.unwrap_or_default(),
                        width: p.width,
                        height: p.height,
                    })
                    .collect(),
            });
        }

        let vlm_pages: Vec<VlmPage> = pages
            .iter()
            .filter_map(|p| {
                p.output.as_ref().map(|output| VlmPage {
                    page: p.page,
                    output: output.clone(),
                })
            })
            .collect();
        if !vlm_pages.is_empty() || raw.parsed.is_some() || raw.output.is_some() || raw.raw.is_some() {
            let nested = raw.output.as_ref();
            let nested_raw = nested
                .and_then(|o| o.get("raw"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let nested_parsed = nested.and_then(|o| o.get("parsed")).cloned();
            return RunOutput::Vlm(VlmOutput {
                model: raw.model,
                prompt_key: raw.prompt_key,
                prompt: raw.prompt,
                raw: raw.raw.or(nested_raw),
                parsed: raw.parsed.or(nested_parsed),
                pages: vlm_pages,
                metrics: raw.metrics,
            });
        }
        if has(|p| p.text.is_some()) {
            return ocr_output(raw.provider, raw.model, raw.metrics, pages);
        }

        if pages.is_empty() {
            debug!("run output is empty");
        } else {
            warn!(pages = pages.len(), "run output carries no recognizable result");
        }
        RunOutput::Empty
    }
}

fn ocr_output(
    provider: Option<String>,
    model: Option<String>,
    metrics: Option<RunMetrics>,
    pages: Vec<RawPage>,
) -> RunOutput {
    RunOutput::Ocr(PagedOutput {
        provider,
        model,
        metrics,
        pages: pages
            .into_iter()
            .map(|p| OcrPage {
                page: p.page,
                words: p.words.unwrap_or_default(),
                text: p.text,
            })
            .collect(),
    })
}

impl<'de> Deserialize<'de> for RunOutput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<RawRunOutput>::deserialize(deserializer)?;
        Ok(raw.map(RunOutput::from).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    pub stage: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub output: RunOutput,
}

impl Run {
    pub fn stage_id(&self) -> StageId {
        StageId::parse(&self.stage)
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Error || matches!(self.output, RunOutput::Failed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        self.output.error()
    }

    pub fn has_annotations(&self) -> bool {
        !self.is_failed()
            && self
                .output
                .fragments()
                .iter()
                .any(PageFragment::has_annotations)
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        if let Some(elapsed) = self.output.metrics().and_then(|m| m.elapsed_ms) {
            return Some(elapsed);
        }
        let (start, end) = (self.started_at?, self.finished_at?);
        u64::try_from((end - start).num_milliseconds()).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResults {
    pub document: Document,
    #[serde(default)]
    pub runs: Vec<Run>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode(value: Value) -> RunOutput {
        serde_json::from_value(value).expect("output should decode")
    }

    #[test]
    fn classifies_detection_output() {
        let output = decode(json!({
            "provider": "yolov8",
            "pages": [{"page": 1, "detections": [{"label": "door", "confidence": 0.8, "bbox": [1, 2, 3, 4]}]}]
        }));
        assert_eq!(output.kind(), "detection");
        let fragment = output.page_fragment(1).expect("page 1");
        assert_eq!(fragment.detections.len(), 1);
        assert!(fragment.words.is_empty());
    }

    #[test]
    fn classifies_layout_and_keeps_token_count() {
        let output = decode(json!({
            "provider": "layoutlmv3",
            "model": "microsoft/layoutlmv3-base-finetuned-funsd",
            "pages": [
                {"page": 1, "tokens": [], "note": "No OCR tokens."},
                {"page": 2, "token_count": 1, "tokens": [{"word": "A-101", "label": "B-HEADER", "bbox": [10, 10, 90, 40], "score": 0.7}]}
            ]
        }));
        match &output {
            RunOutput::Layout(out) => {
                assert_eq!(out.pages[1].token_count, Some(1));
                assert_eq!(out.pages[0].note.as_deref(), Some("No OCR tokens."));
            }
            other => panic!("expected layout output, got {}", other.kind()),
        }
        assert_eq!(output.model(), Some("microsoft/layoutlmv3-base-finetuned-funsd"));
    }

    #[test]
    fn classifies_render_pages() {
        let output = decode(json!({
            "pages": [{"page": 1, "path": "/tmp/a.png", "url": "/files/pages/a.png", "width": 1700, "height": 2200}],
            "artifact": {"path": "x", "url": "y"}
        }));
        let pages = output.rendered_pages().expect("render output");
        assert_eq!(pages[0].size(), PageSize::new(Some(1700), Some(2200)));
    }

    #[test]
    fn classifies_vlm_with_nested_output() {
        let output = decode(json!({
            "model": "qwen2-vl:7b",
            "prompt_key": "title_block",
            "prompt": "Identify the title block information.",
            "output": {"raw": "{\"sheet\": \"A-101\"}", "parsed": {"sheet": "A-101"}}
        }));
        match output {
            RunOutput::Vlm(vlm) => {
                assert_eq!(vlm.prompt_key.as_deref(), Some("title_block"));
                assert_eq!(vlm.parsed, Some(json!({"sheet": "A-101"})));
                assert_eq!(vlm.raw.as_deref(), Some("{\"sheet\": \"A-101\"}"));
            }
            other => panic!("expected vlm output, got {}", other.kind()),
        }
    }

    #[test]
    fn error_field_wins() {
        let output = decode(json!({"error": "pytesseract is not installed.", "pages": []}));
        assert_eq!(output.error(), Some("pytesseract is not installed."));
    }

    #[test]
    fn text_only_pages_are_ocr_without_words() {
        let output = decode(json!({"provider": "tesseract", "pages": [{"page": 1, "text": "GENERAL NOTES"}]}));
        assert_eq!(output.kind(), "ocr");
        assert!(!output.page_fragment(1).expect("page 1").has_annotations());
    }

    #[test]
    fn null_output_is_empty() {
        let run: Run = serde_json::from_value(json!({
            "id": 3, "stage": "ocr:tesseract", "status": "running", "output": null
        }))
        .expect("run should decode");
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.output, RunOutput::Empty);
    }

    #[test]
    fn elapsed_falls_back_to_timestamps() {
        let run: Run = serde_json::from_value(json!({
            "id": 1,
            "stage": "detect:yolov8",
            "status": "completed",
            "started_at": "2024-05-01T10:00:00.000000",
            "finished_at": "2024-05-01T10:00:01.250000",
            "output": {"pages": [{"page": 1, "detections": []}]}
        }))
        .expect("run should decode");
        assert_eq!(run.elapsed_ms(), Some(1250));
        assert!(!run.has_annotations());
    }
}
