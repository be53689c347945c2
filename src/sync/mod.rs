//! The synchronization pipeline: resolve → plan → execute
//!
//! - [`package`]: package names, version selectors and list files
//! - [`resolver`]: expands packages into concrete source images
//! - [`planner`]: maps sources to destinations and emits the [`SyncPlan`]
//! - [`executor`]: runs the plan with a worker pool and produces a [`RunSummary`]

pub mod executor;
pub mod package;
pub mod plan;
pub mod planner;
pub mod resolver;
pub mod summary;

pub use executor::{CancelSignal, ExecuteOptions, Executor};
pub use package::{PackageSpec, VersionSelector};
pub use plan::{ImageChain, OperationKind, PlannedOperation, SyncPlan};
pub use planner::{PlanOptions, SyncPlanner, TagCache, TagRewrite, map_destination};
pub use resolver::{ImageSetResolver, Resolution, UnknownPackagePolicy};
pub use summary::{ImageFailure, ImageOutcome, OperationStatus, RunSummary, SyncResult};
