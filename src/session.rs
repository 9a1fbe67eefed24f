use tracing::{debug, warn};

use crate::annotate::filter::{filter_annotations, DisplayWindow};
use crate::annotate::overlay::{build_overlay, PageOverlay};
use crate::annotate::{unify_fragment, Annotation};
use crate::compare::{compare_runs, comparison_candidates, ComparisonView, RunSelection};
use crate::core::model::{Document, DocumentResults, Page, Run, RunStatus};
use crate::metrics::{aggregate, MetricsReport};
use crate::pipeline::ReviewConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Idle,
    DocumentReady,
    RunAvailable,
    Comparable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Upload,
    Render,
    Ocr,
    Vlm,
    Layout,
    Detection,
    Metrics,
}

impl RunKind {
    fn subject(&self) -> &'static str {
        match self {
            RunKind::Upload => "Upload",
            RunKind::Render => "Run",
            RunKind::Ocr => "OCR",
            RunKind::Vlm => "VLM",
            RunKind::Layout => "Layout",
            RunKind::Detection => "Detection",
            RunKind::Metrics => "Metrics",
        }
    }

    pub fn pending_message(&self) -> &'static str {
        match self {
            RunKind::Upload => "Uploading...",
            RunKind::Render => "Processing...",
            RunKind::Ocr => "Running OCR...",
            RunKind::Vlm => "Running VLM...",
            RunKind::Layout => "Running layout analysis...",
            RunKind::Detection => "Running detection...",
            RunKind::Metrics => "Loading metrics...",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            RunKind::Upload => "Upload failed.",
            RunKind::Render => "Processing failed.",
            RunKind::Ocr => "OCR failed.",
            RunKind::Vlm => "VLM failed.",
            RunKind::Layout => "Layout failed.",
            RunKind::Detection => "Detection failed.",
            RunKind::Metrics => "Failed to fetch metrics.",
        }
    }

    fn completion_message(&self, status: RunStatus) -> String {
        format!("{} {}", self.subject(), status.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReviewPage {
    pub run_id: i64,
    pub stage: String,
    pub page: u32,
    pub annotations: Vec<Annotation>,
    pub query: String,
}

impl ReviewPage {
    pub fn matches(&self) -> Vec<&Annotation> {
        filter_annotations(&self.annotations, &self.query)
    }

    pub fn window(&self, limit: usize) -> DisplayWindow<'_> {
        DisplayWindow::new(self.matches(), limit)
    }

    pub fn overlay(&self) -> PageOverlay {
        build_overlay(self.page, self.matches())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewSession {
    document: Option<Document>,
    pages: Vec<Page>,
    runs: Vec<Run>,
    status: String,
    config: ReviewConfig,
}

impl ReviewSession {
    pub fn new(config: ReviewConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Runs, newest first.
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn state(&self) -> ReviewState {
        if self.document.is_none() {
            return ReviewState::Idle;
        }
        if self.runs.is_empty() {
            return ReviewState::DocumentReady;
        }
        if comparison_candidates(&self.runs).len() >= 2 {
            ReviewState::Comparable
        } else {
            ReviewState::RunAvailable
        }
    }

    pub fn set_document(&mut self, document: Document) {
        self.document = Some(document);
        self.runs.clear();
        self.pages.clear();
        self.status = "Uploaded. Ready to process.".to_string();
    }

    pub fn begin(&mut self, kind: RunKind) {
        self.status = kind.pending_message().to_string();
    }

    pub fn fail(&mut self, kind: RunKind) {
        warn!(?kind, "backend request failed");
        self.status = kind.failure_message().to_string();
    }

    /// Stores a run returned by the backend. A run with a known id replaces
    /// the earlier record; new runs go to the front.
    pub fn record_run(&mut self, kind: RunKind, run: Run) {
        self.status = kind.completion_message(run.status);
        if !run.is_failed() {
            if let Some(pages) = run.output.rendered_pages() {
                self.pages = pages.to_vec();
            }
        }
        match self.runs.iter().position(|existing| existing.id == run.id) {
            Some(idx) => self.runs[idx] = run,
            None => self.runs.insert(0, run),
        }
    }

    pub fn apply_results(&mut self, results: DocumentResults) {
        let DocumentResults { document, runs } = results;
        self.pages = runs
            .iter()
            .filter(|run| !run.is_failed())
            .find_map(|run| run.output.rendered_pages())
            .map(<[Page]>::to_vec)
            .unwrap_or_default();
        debug!(document = document.id, runs = runs.len(), pages = self.pages.len(), "applied snapshot");
        self.document = Some(document);
        self.runs = runs;
    }

    pub fn page(&self, page: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page == page)
    }

    pub fn run(&self, run_id: i64) -> Option<&Run> {
        self.runs.iter().find(|run| run.id == run_id)
    }

    pub fn annotated_runs(&self) -> Vec<&Run> {
        self.runs.iter().filter(|run| run.has_annotations()).collect()
    }

    pub fn active_run(&self, selected: Option<i64>) -> Option<&Run> {
        selected
            .and_then(|id| self.run(id))
            .or_else(|| self.annotated_runs().into_iter().next())
    }

    pub fn review_page(&self, selected_run: Option<i64>, page: u32, query: &str) -> Option<ReviewPage> {
        let run = self.active_run(selected_run)?;
        let fragment = run.output.page_fragment(page)?;
        let size = self.page(page).and_then(Page::size);
        Some(ReviewPage {
            run_id: run.id,
            stage: run.stage.clone(),
            page,
            annotations: unify_fragment(&fragment, size, self.config.unify_limits()),
            query: query.to_string(),
        })
    }

    pub fn metrics(&self) -> MetricsReport {
        aggregate(&self.runs, self.document.as_ref().map(|d| d.filename.as_str()))
    }

    pub fn compare(&self, selection: &RunSelection) -> ComparisonView {
        compare_runs(&self.runs, selection, self.config.preview_chars)
    }
}
