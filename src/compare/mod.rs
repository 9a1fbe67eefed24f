pub mod alignment;

use serde::Serialize;

use crate::core::model::{Run, RunOutput};
use crate::metrics::runs_of_type;

pub use alignment::{word_agreement, WordAgreement};

/// Only OCR providers emit directly comparable word-level output.
pub const COMPARED_STAGE_TYPE: &str = "ocr";

pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Run ids picked for comparison, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSelection {
    ids: Vec<i64>,
}

impl RunSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut selection = Self::new();
        for id in ids {
            if !selection.contains(id) {
                selection.ids.push(id);
            }
        }
        selection
    }

    /// Adds the run, or removes it when it is already selected.
    pub fn toggle(&mut self, id: i64) {
        match self.ids.iter().position(|&selected| selected == id) {
            Some(idx) => {
                self.ids.remove(idx);
            }
            None => self.ids.push(id),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComparisonColumn {
    pub run_id: i64,
    pub stage: String,
    pub provider: String,
    pub word_count: u64,
    pub avg_confidence: Option<f64>,
    pub elapsed_ms: Option<u64>,
    pub pages: Vec<PageText>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageAgreement {
    pub page: u32,
    pub left_run: i64,
    pub right_run: i64,
    pub edits: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comparison {
    pub columns: Vec<ComparisonColumn>,
    pub agreements: Vec<PageAgreement>,
}

impl Comparison {
    pub fn column(&self, run_id: i64) -> Option<&ComparisonColumn> {
        self.columns.iter().find(|c| c.run_id == run_id)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ComparisonView {
    /// Fewer than two OCR runs exist; nothing is computed.
    NeedMoreRuns { available: usize },
    /// Enough runs exist but fewer than two of them are selected.
    AwaitingSelection { candidates: Vec<i64>, selected: usize },
    Ready(Comparison),
}

impl ComparisonView {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ComparisonView::NeedMoreRuns { .. } => {
                Some("Run OCR with at least 2 different providers to compare results.")
            }
            ComparisonView::AwaitingSelection { .. } => Some("Select at least 2 runs to compare."),
            ComparisonView::Ready(_) => None,
        }
    }
}

/// OCR runs that can take part in a comparison, failed runs excluded.
pub fn comparison_candidates(runs: &[Run]) -> Vec<&Run> {
    runs_of_type(runs, COMPARED_STAGE_TYPE)
        .into_iter()
        .filter(|run| !run.is_failed())
        .collect()
}

/// Compares the selected OCR runs side by side.
///
/// Everything is recomputed from `runs` on each call.
pub fn compare_runs(runs: &[Run], selection: &RunSelection, preview_chars: usize) -> ComparisonView {
    let candidates = comparison_candidates(runs);
    if candidates.len() < 2 {
        return ComparisonView::NeedMoreRuns {
            available: candidates.len(),
        };
    }

    let selected: Vec<(ComparisonColumn, PageWords<'_>)> = selection
        .ids()
        .iter()
        .filter_map(|id| candidates.iter().copied().find(|run| run.id == *id))
        .filter_map(|run| build_column(run, preview_chars))
        .collect();

    if selected.len() < 2 {
        return ComparisonView::AwaitingSelection {
            candidates: candidates.iter().map(|run| run.id).collect(),
            selected: selected.len(),
        };
    }

    let agreements = pairwise_agreements(&selected);
    ComparisonView::Ready(Comparison {
        columns: selected.into_iter().map(|(column, _)| column).collect(),
        agreements,
    })
}

type PageWords<'a> = Vec<(u32, Vec<&'a str>)>;

fn build_column(run: &Run, preview_chars: usize) -> Option<(ComparisonColumn, PageWords<'_>)> {
    let RunOutput::Ocr(output) = &run.output else {
        return None;
    };

    let mut word_count = 0u64;
    let mut confidences = Vec::new();
    let mut page_words = Vec::with_capacity(output.pages.len());
    let mut pages = Vec::with_capacity(output.pages.len());

    for page in &output.pages {
        word_count += page.words.len() as u64;
        confidences.extend(page.words.iter().filter_map(|w| w.confidence));

        let words: Vec<&str> = page.words.iter().map(|w| w.text.as_str()).collect();
        let text = words.join(" ");
        let truncated = text.chars().count() > preview_chars;
        pages.push(PageText {
            page: page.page,
            text: text.chars().take(preview_chars).collect(),
            truncated,
        });
        page_words.push((page.page, words));
    }

    let avg_confidence = (!confidences.is_empty())
        .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64);

    let column = ComparisonColumn {
        run_id: run.id,
        stage: run.stage.clone(),
        provider: run
            .stage_id()
            .provider
            .unwrap_or_else(|| "unknown".to_string()),
        word_count,
        avg_confidence,
        elapsed_ms: output.metrics.as_ref().and_then(|m| m.elapsed_ms),
        pages,
    };
    Some((column, page_words))
}

// Pages are paired by number; a page missing from either run is skipped.
fn pairwise_agreements(selected: &[(ComparisonColumn, PageWords<'_>)]) -> Vec<PageAgreement> {
    let mut agreements = Vec::new();
    for (i, (left, left_pages)) in selected.iter().enumerate() {
        for (right, right_pages) in &selected[i + 1..] {
            for (page, left_words) in left_pages {
                let Some((_, right_words)) = right_pages.iter().find(|(p, _)| p == page) else {
                    continue;
                };
                let Some(agreement) = word_agreement(left_words, right_words) else {
                    continue;
                };
                agreements.push(PageAgreement {
                    page: *page,
                    left_run: left.run_id,
                    right_run: right.run_id,
                    edits: agreement.edits,
                    score: agreement.score,
                });
            }
        }
    }
    agreements
}
