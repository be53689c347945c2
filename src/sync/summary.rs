//! Per-operation results and the run summary

use crate::image::ImageReference;
use crate::sync::plan::{OperationKind, PlannedOperation};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Failed => "failed",
            OperationStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub operation: PlannedOperation,
    pub status: OperationStatus,
    pub detail: String,
}

impl SyncResult {
    pub fn succeeded(operation: PlannedOperation, detail: impl Into<String>) -> Self {
        Self {
            operation,
            status: OperationStatus::Succeeded,
            detail: detail.into(),
        }
    }

    pub fn failed(operation: PlannedOperation, detail: impl Into<String>) -> Self {
        Self {
            operation,
            status: OperationStatus::Failed,
            detail: detail.into(),
        }
    }

    pub fn skipped(operation: PlannedOperation, detail: impl Into<String>) -> Self {
        Self {
            operation,
            status: OperationStatus::Skipped,
            detail: detail.into(),
        }
    }
}

/// Results of one image chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageOutcome {
    #[serde(skip)]
    pub index: usize,
    pub image: ImageReference,
    pub results: Vec<SyncResult>,
}

impl ImageOutcome {
    /// Failed if any operation failed, skipped if every operation was skipped
    pub fn status(&self) -> OperationStatus {
        if self
            .results
            .iter()
            .any(|r| r.status == OperationStatus::Failed)
        {
            OperationStatus::Failed
        } else if self
            .results
            .iter()
            .all(|r| r.status == OperationStatus::Skipped)
        {
            OperationStatus::Skipped
        } else {
            OperationStatus::Succeeded
        }
    }

    pub fn failure(&self) -> Option<&SyncResult> {
        self.results
            .iter()
            .find(|r| r.status == OperationStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    pub image: ImageReference,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<ImageFailure>,
    pub images: Vec<ImageOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(dry_run: bool, mut outcomes: Vec<ImageOutcome>) -> Self {
        outcomes.sort_by_key(|outcome| outcome.index);

        let mut summary = RunSummary {
            dry_run,
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome.status() {
                OperationStatus::Succeeded => summary.succeeded += 1,
                OperationStatus::Skipped => summary.skipped += 1,
                OperationStatus::Failed => {
                    summary.failed += 1;
                    if let Some(failure) = outcome.failure() {
                        summary.failures.push(ImageFailure {
                            image: outcome.image.clone(),
                            detail: failure.detail.clone(),
                        });
                    }
                }
            }
        }
        summary.images = outcomes;
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn operation_count(&self, kind: OperationKind, status: OperationStatus) -> usize {
        self.results()
            .filter(|r| r.operation.kind() == kind && r.status == status)
            .count()
    }

    pub fn results(&self) -> impl Iterator<Item = &SyncResult> {
        self.images.iter().flat_map(|outcome| outcome.results.iter())
    }

    /// Source images covered by the run, in plan order
    pub fn image_set(&self) -> Vec<&ImageReference> {
        self.images.iter().map(|outcome| &outcome.image).collect()
    }
}
