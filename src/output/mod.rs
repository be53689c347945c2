//! Rendering of run summaries: text tables, JSON and report files

use crate::error::Result;
use crate::logging::Logger;
use crate::sync::{OperationKind, OperationStatus, RunSummary};
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Text,
    /// The summary as JSON on stdout
    Json,
}

#[derive(Debug, Clone, Tabled)]
struct ImageRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: String,
    summary: &'a RunSummary,
}

/// Per-image table of a summary
pub fn render_table(summary: &RunSummary) -> String {
    let rows: Vec<ImageRow> = summary
        .images
        .iter()
        .enumerate()
        .map(|(i, outcome)| {
            let detail = outcome
                .failure()
                .or_else(|| {
                    outcome
                        .results
                        .iter()
                        .find(|r| r.operation.kind() == OperationKind::Push)
                })
                .or_else(|| outcome.results.last())
                .map(|r| r.detail.clone())
                .unwrap_or_default();
            ImageRow {
                index: i + 1,
                image: outcome.image.to_string(),
                status: outcome.status().to_string(),
                detail,
            }
        })
        .collect();

    Table::new(rows).to_string()
}

pub fn render_json(summary: &RunSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

pub fn print_summary(summary: &RunSummary, format: OutputFormat, output: &Logger) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", render_json(summary)?);
        }
        OutputFormat::Text => {
            output.section(if summary.dry_run {
                "Dry-Run Summary"
            } else {
                "Sync Summary"
            });
            if summary.images.is_empty() {
                output.info("No images to sync");
            } else {
                output.block(&render_table(summary));
            }

            let pushed = summary.operation_count(OperationKind::Push, OperationStatus::Succeeded);
            let up_to_date = summary.operation_count(OperationKind::Push, OperationStatus::Skipped);
            output.summary_kv(
                "Totals",
                &[
                    ("Images", summary.total.to_string()),
                    ("Succeeded", summary.succeeded.to_string()),
                    ("Failed", summary.failed.to_string()),
                    ("Skipped", summary.skipped.to_string()),
                    ("Pushed", pushed.to_string()),
                    ("Push skipped", up_to_date.to_string()),
                    ("Elapsed", output.format_duration(output.elapsed())),
                ],
            );

            if !summary.failures.is_empty() {
                let failures: Vec<String> = summary
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", f.image, f.detail))
                    .collect();
                output.list("Failures", &failures);
            }
        }
    }
    Ok(())
}

/// Write `sync_report_<timestamp>.json` into `dir`
pub fn write_report(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let now = chrono::Local::now();
    let path = dir.join(format!("sync_report_{}.json", now.format("%Y%m%d_%H%M%S")));
    let report = Report {
        generated_at: now.to_rfc3339(),
        summary,
    };
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    Ok(path)
}
