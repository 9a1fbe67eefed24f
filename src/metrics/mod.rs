pub mod group;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::core::model::{Run, RunOutput, RunStatus};
use crate::core::stage::StageId;

pub use group::{group_by_stage_type, runs_of_type, StageGroup};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: i64,
    pub stage: String,
    pub stage_type: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub started_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub finished_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub detection_count: Option<u64>,
    #[serde(default)]
    pub token_count: Option<u64>,
    #[serde(default)]
    pub avg_confidence: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_key: Option<String>,
}

impl RunSummary {
    pub fn item_count(&self) -> Option<u64> {
        self.word_count.or(self.detection_count).or(self.token_count)
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Error || self.error.is_some()
    }
}

#[derive(Debug, Default)]
struct Tally {
    words: u64,
    detections: u64,
    tokens: u64,
    confidences: Vec<f64>,
}

impl Tally {
    fn from_output(output: &RunOutput) -> Self {
        let mut tally = Tally::default();
        for fragment in output.fragments() {
            tally.words += fragment.words.len() as u64;
            tally.detections += fragment.detections.len() as u64;
            tally.tokens += fragment.tokens.len() as u64;
            tally
                .confidences
                .extend(fragment.words.iter().filter_map(|w| w.confidence));
            tally
                .confidences
                .extend(fragment.detections.iter().map(|d| d.confidence));
            tally
                .confidences
                .extend(fragment.tokens.iter().filter_map(|t| t.score));
        }

        // Token lists may be stripped from stored outputs; the count survives.
        if let RunOutput::Layout(out) = output {
            tally.tokens = out
                .pages
                .iter()
                .map(|page| match (page.tokens.len(), page.token_count) {
                    (0, Some(count)) => u64::from(count),
                    (len, _) => len as u64,
                })
                .sum();
        }
        tally
    }

    fn mean_confidence(&self) -> Option<f64> {
        if self.confidences.is_empty() {
            return None;
        }
        Some(self.confidences.iter().sum::<f64>() / self.confidences.len() as f64)
    }
}

fn nonzero(count: u64) -> Option<u64> {
    (count > 0).then_some(count)
}

pub fn summarize_run(run: &Run) -> RunSummary {
    let StageId {
        stage_type,
        provider,
        variant,
    } = run.stage_id();

    let mut summary = RunSummary {
        run_id: run.id,
        stage: run.stage.clone(),
        stage_type,
        provider,
        variant,
        status: run.status,
        error: run.error_message().map(str::to_string),
        started_at: run.started_at,
        finished_at: run.finished_at,
        elapsed_ms: None,
        page_count: None,
        word_count: None,
        detection_count: None,
        token_count: None,
        avg_confidence: None,
        model: run.output.model().map(str::to_string),
        prompt_key: run.output.prompt_key().map(str::to_string),
    };
    if run.is_failed() {
        return summary;
    }

    let tally = Tally::from_output(&run.output);
    let reported = run.output.metrics();

    summary.elapsed_ms = run.elapsed_ms();
    summary.page_count = reported.and_then(|m| m.page_count).or_else(|| {
        run.output
            .page_count()
            .filter(|&pages| pages > 0)
            .and_then(|pages| u32::try_from(pages).ok())
    });
    summary.word_count = reported
        .and_then(|m| m.word_count)
        .or_else(|| nonzero(tally.words));
    summary.detection_count = nonzero(tally.detections);
    summary.token_count = nonzero(tally.tokens);
    summary.avg_confidence = tally.mean_confidence();
    summary
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Bar {
    pub run_id: i64,
    pub provider: Option<String>,
    pub value: f64,
    /// Bar length as a fraction of the full width.
    pub fraction: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StageComparisonSummary {
    pub fastest_provider: Option<String>,
    pub fastest_elapsed_ms: Option<u64>,
    pub highest_confidence_provider: Option<String>,
    pub highest_confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageMetrics {
    pub stage_type: String,
    pub label: String,
    pub runs: Vec<RunSummary>,
    pub summary: StageComparisonSummary,
}

impl StageMetrics {
    pub fn from_summaries(stage_type: String, runs: Vec<RunSummary>) -> Self {
        let fastest = first_extreme(sampled(&runs), |r| r.elapsed_ms.map(|ms| ms as f64), |a, b| a < b);
        let most_confident = first_extreme(sampled(&runs), |r| r.avg_confidence, |a, b| a > b);

        let summary = StageComparisonSummary {
            fastest_provider: fastest.and_then(|r| r.provider.clone()),
            fastest_elapsed_ms: fastest.and_then(|r| r.elapsed_ms),
            highest_confidence_provider: most_confident.and_then(|r| r.provider.clone()),
            highest_confidence: most_confident.and_then(|r| r.avg_confidence),
        };
        Self {
            label: StageId::parse(&stage_type).type_label(),
            stage_type,
            runs,
            summary,
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn fastest_elapsed_ms(&self) -> Option<u64> {
        self.summary.fastest_elapsed_ms
    }

    pub fn best_confidence(&self) -> Option<f64> {
        self.summary.highest_confidence
    }

    pub fn timing_bars(&self) -> Option<Vec<Bar>> {
        let timed: Vec<(&RunSummary, f64)> = sampled(&self.runs)
            .filter_map(|r| r.elapsed_ms.map(|ms| (r, ms as f64)))
            .collect();
        if timed.len() < 2 {
            return None;
        }
        let max = timed.iter().map(|(_, ms)| *ms).fold(0.0, f64::max);
        Some(
            timed
                .into_iter()
                .map(|(r, ms)| Bar {
                    run_id: r.run_id,
                    provider: r.provider.clone(),
                    value: ms,
                    fraction: if max > 0.0 { ms / max } else { 0.0 },
                })
                .collect(),
        )
    }

    pub fn confidence_bars(&self) -> Option<Vec<Bar>> {
        let scored: Vec<Bar> = sampled(&self.runs)
            .filter_map(|r| {
                r.avg_confidence.map(|confidence| Bar {
                    run_id: r.run_id,
                    provider: r.provider.clone(),
                    value: confidence,
                    fraction: confidence,
                })
            })
            .collect();
        (scored.len() >= 2).then_some(scored)
    }
}

// Snapshot rows of failed runs can still carry a timestamp span.
fn sampled(runs: &[RunSummary]) -> impl Iterator<Item = &RunSummary> {
    runs.iter().filter(|r| !r.is_failed())
}

fn first_extreme<'a, I, F, B>(runs: I, value: F, better: B) -> Option<&'a RunSummary>
where
    I: IntoIterator<Item = &'a RunSummary>,
    F: Fn(&RunSummary) -> Option<f64>,
    B: Fn(f64, f64) -> bool,
{
    let mut best: Option<(&RunSummary, f64)> = None;
    for run in runs {
        let Some(candidate) = value(run) else {
            continue;
        };
        match best {
            Some((_, current)) if !better(candidate, current) => {}
            _ => best = Some((run, candidate)),
        }
    }
    best.map(|(run, _)| run)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsReport {
    pub document_filename: Option<String>,
    pub total_runs: usize,
    pub by_stage: Vec<StageMetrics>,
}

impl MetricsReport {
    pub fn stage(&self, stage_type: &str) -> Option<&StageMetrics> {
        self.by_stage.iter().find(|s| s.stage_type == stage_type)
    }

    pub fn is_empty(&self) -> bool {
        self.total_runs == 0
    }
}

pub fn aggregate(runs: &[Run], document_filename: Option<&str>) -> MetricsReport {
    let by_stage = group_by_stage_type(runs)
        .into_iter()
        .filter(|group| !group.runs.is_empty())
        .map(|group| {
            let summaries = group.runs.into_iter().map(summarize_run).collect();
            StageMetrics::from_summaries(group.stage_type, summaries)
        })
        .collect();

    MetricsReport {
        document_filename: document_filename.map(str::to_string),
        total_runs: runs.len(),
        by_stage,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub document_filename: Option<String>,
    #[serde(default)]
    pub total_runs: usize,
    #[serde(default)]
    pub by_stage: BTreeMap<String, Vec<RunSummary>>,
}

impl MetricsSnapshot {
    pub fn into_report(self) -> MetricsReport {
        let by_stage = self
            .by_stage
            .into_iter()
            .filter(|(_, runs)| !runs.is_empty())
            .map(|(stage_type, runs)| StageMetrics::from_summaries(stage_type, runs))
            .collect();
        MetricsReport {
            document_filename: self.document_filename,
            total_runs: self.total_runs,
            by_stage,
        }
    }
}
