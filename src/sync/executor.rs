//! Runs a [`SyncPlan`] against a [`ContainerRuntime`]
//!
//! Operations of one image form a chain that runs sequentially; chains are
//! drained from a shared queue by a fixed pool of workers. A failure only
//! affects the rest of its own chain.

use crate::error::SyncError;
use crate::image::{DigestUtils, ImageReference};
use crate::logging::Logger;
use crate::runtime::ContainerRuntime;
use crate::sync::plan::{ImageChain, OperationKind, PlannedOperation, SyncPlan};
use crate::sync::summary::{ImageOutcome, OperationStatus, RunSummary, SyncResult};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub dry_run: bool,
    pub concurrency: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            concurrency: 4,
        }
    }
}

/// Stops dispatching new images once signalled
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Executor {
    runtime: Arc<dyn ContainerRuntime>,
    output: Logger,
}

impl Executor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, output: Logger) -> Self {
        Self { runtime, output }
    }

    pub async fn execute(
        &self,
        plan: &SyncPlan,
        options: &ExecuteOptions,
        cancel: &CancelSignal,
    ) -> RunSummary {
        if options.dry_run {
            return self.simulate(plan);
        }

        let chains = plan.chains();
        let queue = Arc::new(Mutex::new(chains.iter().cloned().collect::<VecDeque<_>>()));
        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(chains.len())));
        let worker_count = options.concurrency.max(1).min(chains.len().max(1));

        self.output.info(&format!(
            "Executing {} operations for {} images with {} workers",
            plan.len(),
            chains.len(),
            worker_count
        ));

        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            let queue = Arc::clone(&queue);
            let outcomes = Arc::clone(&outcomes);
            let runtime = Arc::clone(&self.runtime);
            let output = self.output.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        output.detail(&format!("worker-{}: cancelled, stopping", worker));
                        break;
                    }
                    let Some(chain) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let outcome = run_chain(runtime.as_ref(), &output, chain).await;
                    outcomes.lock().await.push(outcome);
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                self.output.error(&format!("Worker task failed: {}", e));
            }
        }

        let mut outcomes = std::mem::take(&mut *outcomes.lock().await);
        let undispatched = std::mem::take(&mut *queue.lock().await);
        if !undispatched.is_empty() {
            self.output.warning(&format!(
                "Cancelled: {} image(s) were not started",
                undispatched.len()
            ));
        }
        outcomes.extend(
            undispatched
                .into_iter()
                .map(|chain| skip_chain(chain, "cancelled")),
        );

        // Chains taken by a worker that panicked never reported back
        let reported: HashSet<usize> = outcomes.iter().map(|outcome| outcome.index).collect();
        for chain in chains.iter().filter(|chain| !reported.contains(&chain.index)) {
            outcomes.push(fail_chain(chain.clone(), "worker aborted"));
        }

        RunSummary::from_outcomes(false, outcomes)
    }

    /// Report every operation as skipped without touching runtime or network
    fn simulate(&self, plan: &SyncPlan) -> RunSummary {
        self.output.info(&format!(
            "Dry run: {} operations for {} images (use --execute to apply)",
            plan.len(),
            plan.chains().len()
        ));

        let outcomes = plan
            .chains()
            .iter()
            .map(|chain| {
                if let Some(cause) = &chain.blocked {
                    self.output.error(&format!("{}: {}", chain.source, cause));
                    return fail_chain(chain.clone(), cause);
                }
                ImageOutcome {
                    index: chain.index,
                    image: chain.source.clone(),
                    results: chain
                        .operations
                        .iter()
                        .map(|operation| {
                            let detail = format!("would {}", operation.describe());
                            self.output.dry_run(&operation.describe());
                            SyncResult::skipped(operation.clone(), detail)
                        })
                        .collect(),
                }
            })
            .collect();

        RunSummary::from_outcomes(true, outcomes)
    }
}

fn skip_chain(chain: ImageChain, detail: &str) -> ImageOutcome {
    ImageOutcome {
        index: chain.index,
        image: chain.source,
        results: chain
            .operations
            .into_iter()
            .map(|operation| SyncResult::skipped(operation, detail))
            .collect(),
    }
}

fn fail_chain(chain: ImageChain, detail: &str) -> ImageOutcome {
    let mut operations = chain.operations.into_iter();
    let results = operations
        .next()
        .map(|first| SyncResult::failed(first, detail))
        .into_iter()
        .chain(operations.map(|operation| {
            SyncResult::skipped(operation, format!("skipped: {}", detail))
        }))
        .collect();
    ImageOutcome {
        index: chain.index,
        image: chain.source,
        results,
    }
}

/// State carried between the operations of one chain
#[derive(Default)]
struct ChainState {
    failure: Option<String>,
    pulled_digest: Option<String>,
    /// Local RepoDigest of the destination name, known once a previous run
    /// pushed it
    destination_digest: Option<String>,
    pushed: bool,
}

impl ChainState {
    /// Digest already at the destination that the local image is known to have
    fn matching_digest<'a>(&self, existing: Option<&'a str>) -> Option<&'a str> {
        let existing = existing?;
        [&self.pulled_digest, &self.destination_digest]
            .into_iter()
            .flatten()
            .any(|local| DigestUtils::digests_match(existing, local))
            .then_some(existing)
    }
}

async fn run_chain(
    runtime: &dyn ContainerRuntime,
    output: &Logger,
    chain: ImageChain,
) -> ImageOutcome {
    if let Some(cause) = chain.blocked.clone() {
        output.error(&format!("{}: {}", chain.source, cause));
        return fail_chain(chain, &cause);
    }
    output.step(&format!("Syncing {}", chain.source));

    let mut state = ChainState::default();
    let mut results = Vec::with_capacity(chain.operations.len());

    for operation in chain.operations {
        if let Some(cause) = &state.failure {
            results.push(SyncResult::skipped(
                operation,
                format!("skipped: {}", cause),
            ));
            continue;
        }

        output.detail(&operation.describe());
        let result = run_operation(runtime, output, operation, &mut state).await;
        if result.status == OperationStatus::Failed {
            output.error(&result.detail);
            state.failure = Some(result.detail.clone());
        }
        results.push(result);
    }

    if state.failure.is_none() {
        output.success(&format!("Synced {}", chain.source));
    }

    ImageOutcome {
        index: chain.index,
        image: chain.source,
        results,
    }
}

async fn run_operation(
    runtime: &dyn ContainerRuntime,
    output: &Logger,
    operation: PlannedOperation,
    state: &mut ChainState,
) -> SyncResult {
    let kind = operation.kind();
    let target = operation.target();
    let outcome = match kind {
        OperationKind::Pull => match runtime.pull(target).await {
            Ok(()) => {
                state.pulled_digest = local_digest(runtime, output, target).await;
                Ok(match &state.pulled_digest {
                    Some(digest) => format!("pulled {}", digest),
                    None => "pulled".to_string(),
                })
            }
            Err(e) => Err(e),
        },
        OperationKind::Retag => {
            let destination = operation.destination();
            match runtime.tag(target, destination).await {
                Ok(()) => {
                    state.destination_digest = local_digest(runtime, output, destination).await;
                    Ok(format!("tagged as {}", destination))
                }
                Err(e) => Err(e),
            }
        }
        OperationKind::Push => {
            let existing = operation.existing_digest();
            if let Some(digest) = state.matching_digest(existing) {
                let detail = format!("digest match: destination already has {}", digest);
                state.pushed = true;
                return SyncResult::skipped(operation, detail);
            }
            match runtime.push(target).await {
                Ok(()) => {
                    state.pushed = true;
                    Ok(match existing {
                        Some(prior) => format!("pushed (replaced prior digest {})", prior),
                        None => "pushed".to_string(),
                    })
                }
                Err(e) => Err(e),
            }
        }
        OperationKind::DeleteOld => {
            if !state.pushed {
                return SyncResult::skipped(operation, "push did not complete");
            }
            runtime
                .remove(target)
                .await
                .map(|()| "removed local source tag".to_string())
        }
    };

    match outcome {
        Ok(detail) => SyncResult::succeeded(operation, detail),
        Err(e) => {
            let err = SyncError::Operation {
                kind,
                image: operation.target().to_string(),
                message: e.to_string(),
            };
            SyncResult::failed(operation, err.to_string())
        }
    }
}

/// RepoDigest docker recorded for `image`; lookup failures only cost the
/// digest-match shortcut
async fn local_digest(
    runtime: &dyn ContainerRuntime,
    output: &Logger,
    image: &ImageReference,
) -> Option<String> {
    match runtime.repo_digest(image).await {
        Ok(digest) => digest,
        Err(e) => {
            output.debug(&format!("No local digest for {}: {}", image, e));
            None
        }
    }
}
