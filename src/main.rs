use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sheetlens::compare::{ComparisonView, RunSelection};
use sheetlens::metrics::StageMetrics;
use sheetlens::pipeline::{export_results, load_session, ExportFormat, ReviewConfig};
use sheetlens::source::{JsonFileSource, ResultsSource};

#[derive(Parser, Debug)]
#[command(name = "sheetlens")]
#[command(version, about = "Review OCR, detection, layout and VLM runs over architectural drawing sheets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Per-stage run metrics for a document
    Metrics {
        /// Results JSON saved from the backend
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare OCR runs side by side
    Compare {
        input: PathBuf,

        /// Run id to include (repeat for each run)
        #[arg(short, long = "run")]
        runs: Vec<i64>,

        /// Characters of text shown per page
        #[arg(long)]
        preview_chars: Option<usize>,
    },

    /// List the annotations of one page of a run
    Overlay {
        input: PathBuf,

        /// Run id (default: newest annotated run)
        #[arg(short, long)]
        run: Option<i64>,

        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Case-insensitive text or label filter
        #[arg(long, default_value = "")]
        filter: String,

        /// Maximum annotations listed
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        max_words: Option<usize>,

        #[arg(long)]
        max_tokens: Option<usize>,
    },

    /// Export run rows and page overlays
    Export {
        input: PathBuf,

        /// Output directory (default: ./<input_name>_export)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format(s) to generate
        #[arg(short, long, value_enum, value_delimiter = ',', default_values_t = vec![Format::Json, Format::Csv])]
        format: Vec<Format>,
    },

    /// Show the document and its runs
    Info { input: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Format {
    Json,
    Csv,
    Html,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Csv => ExportFormat::Csv,
            Format::Html => ExportFormat::Html,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Metrics { input, json } => show_metrics(input, json),
        Commands::Compare {
            input,
            runs,
            preview_chars,
        } => compare(input, runs, preview_chars),
        Commands::Overlay {
            input,
            run,
            page,
            filter,
            limit,
            max_words,
            max_tokens,
        } => {
            let mut config = ReviewConfig::default();
            if let Some(limit) = limit {
                config.display_limit = limit;
            }
            if let Some(max_words) = max_words {
                config.max_overlay_words = max_words;
            }
            if let Some(max_tokens) = max_tokens {
                config.max_layout_tokens = max_tokens;
            }
            show_overlay(input, run, page, &filter, config)
        }
        Commands::Export {
            input,
            output,
            format,
        } => export(input, output, format),
        Commands::Info { input } => show_info(input),
    }
}

fn source(input: &Path) -> Result<JsonFileSource> {
    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    Ok(JsonFileSource::new(input.to_path_buf()))
}

fn show_metrics(input: PathBuf, json: bool) -> Result<()> {
    let session = load_session(&source(&input)?, ReviewConfig::default())?;
    let report = session.metrics();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        println!("[*] No metrics available. Run some processing first.");
        return Ok(());
    }

    println!(
        "[*] {} ({} runs)",
        report.document_filename.as_deref().unwrap_or("document"),
        report.total_runs
    );
    for stage in &report.by_stage {
        print_stage(stage);
    }
    Ok(())
}

fn print_stage(stage: &StageMetrics) {
    println!("\n[+] {} - {} run(s)", stage.label, stage.run_count());
    if let (Some(provider), Some(ms)) = (&stage.summary.fastest_provider, stage.fastest_elapsed_ms()) {
        println!("    fastest: {} ({} ms)", provider, ms);
    }
    if let (Some(provider), Some(confidence)) =
        (&stage.summary.highest_confidence_provider, stage.best_confidence())
    {
        println!("    most confident: {} ({:.1}%)", provider, confidence * 100.0);
    }
    for run in &stage.runs {
        let timing = run
            .elapsed_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());
        let confidence = run
            .avg_confidence
            .map(|c| format!("{:.1}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let items = run
            .item_count()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &run.error {
            Some(error) => println!("    #{} {} [{}] {}", run.run_id, run.stage, run.status.as_str(), error),
            None => println!(
                "    #{} {} [{}] time={} items={} confidence={}",
                run.run_id,
                run.stage,
                run.status.as_str(),
                timing,
                items,
                confidence
            ),
        }
    }
}

fn compare(input: PathBuf, runs: Vec<i64>, preview_chars: Option<usize>) -> Result<()> {
    let mut config = ReviewConfig::default();
    if let Some(preview_chars) = preview_chars {
        config.preview_chars = preview_chars;
    }
    let session = load_session(&source(&input)?, config)?;
    let selection = RunSelection::from_ids(runs);

    match session.compare(&selection) {
        ComparisonView::Ready(comparison) => {
            for column in &comparison.columns {
                let confidence = column
                    .avg_confidence
                    .map(|c| format!("{:.1}%", c * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                let timing = column
                    .elapsed_ms
                    .map(|ms| format!("{ms} ms"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "\n[+] #{} {} - words={} confidence={} time={}",
                    column.run_id, column.provider, column.word_count, confidence, timing
                );
                for page in &column.pages {
                    let ellipsis = if page.truncated { "..." } else { "" };
                    println!("    page {}: {}{}", page.page, page.text, ellipsis);
                }
            }
            if !comparison.agreements.is_empty() {
                println!("\n[*] Word agreement");
                for agreement in &comparison.agreements {
                    println!(
                        "    page {}: #{} vs #{} = {:.2} ({} word edit(s))",
                        agreement.page, agreement.left_run, agreement.right_run, agreement.score, agreement.edits
                    );
                }
            }
        }
        ComparisonView::AwaitingSelection { candidates, .. } => {
            let ids: Vec<String> = candidates.iter().map(|id| id.to_string()).collect();
            println!("[*] Candidate runs: {}", ids.join(", "));
            anyhow::bail!("Select at least 2 runs to compare (--run <id> --run <id>)");
        }
        view @ ComparisonView::NeedMoreRuns { .. } => {
            println!("[*] {}", view.message().unwrap_or_default());
        }
    }
    Ok(())
}

fn show_overlay(input: PathBuf, run: Option<i64>, page: u32, filter: &str, config: ReviewConfig) -> Result<()> {
    let session = load_session(&source(&input)?, config)?;

    if let Some(id) = run {
        if session.run(id).is_none() {
            anyhow::bail!("No run with id {} in {}", id, input.display());
        }
    }

    let Some(review) = session.review_page(run, page, filter) else {
        println!("[*] No annotations for page {}.", page);
        return Ok(());
    };

    let overlay = review.overlay();
    println!("[*] Run #{} {} - page {}", review.run_id, review.stage, review.page);
    println!(
        "[*] {} box(es) on overlay, {} without page size",
        overlay.boxes.len(),
        overlay.skipped
    );

    let window = review.window(config.display_limit);
    if let Some(indicator) = window.indicator() {
        println!("[*] {}", indicator);
    }
    for annotation in window.visible() {
        let label = annotation.label.as_deref().unwrap_or("");
        let confidence = annotation
            .confidence
            .map(|c| format!("{:.1}%", c * 100.0))
            .unwrap_or_default();
        println!(
            "    {:<8} {:<10} {:<24} {:<14} {}",
            annotation.id,
            annotation.kind.as_str(),
            annotation.text,
            label,
            confidence
        );
    }
    Ok(())
}

fn export(input: PathBuf, output: Option<PathBuf>, formats: Vec<Format>) -> Result<()> {
    let results = source(&input)?.fetch_results()?;

    let output_dir = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());
        PathBuf::from(format!("{}_export", stem))
    });

    println!("[*] Exporting: {}", input.display());
    println!("[*] Output: {}", output_dir.display());

    let formats: Vec<ExportFormat> = formats.into_iter().map(ExportFormat::from).collect();
    export_results(&results, &output_dir, &formats, ReviewConfig::default())
        .with_context(|| format!("Failed to export to: {}", output_dir.display()))?;

    println!("\n[✓] Done! Results saved to: {}", output_dir.display());
    Ok(())
}

fn show_info(input: PathBuf) -> Result<()> {
    let session = load_session(&source(&input)?, ReviewConfig::default())?;
    let Some(document) = session.document() else {
        anyhow::bail!("No document in {}", input.display());
    };

    println!("Document Information");
    println!("====================");
    println!("File: {}", document.filename);
    println!("Id: {}", document.id);
    println!("Pages: {}", document.page_count);
    if let Some(uploaded_at) = document.uploaded_at {
        println!("Uploaded: {}", uploaded_at);
    }
    println!("Rendered pages: {}", session.pages().len());
    println!("State: {:?}", session.state());

    println!("\nRuns");
    println!("====");
    for run in session.runs() {
        let stage = run.stage_id();
        match run.error_message() {
            Some(error) => println!("#{} {} [{}] {}", run.id, stage.label(), run.status.as_str(), error),
            None => println!("#{} {} [{}]", run.id, stage.label(), run.status.as_str()),
        }
    }
    Ok(())
}
