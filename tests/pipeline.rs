//! End-to-end pipeline behavior against in-memory registries and runtime

mod common;

use clap::Parser;
use common::{FakeRegistry, FakeRuntime};
use registry_sync::cli::{Args, Runner, SyncConfig};
use registry_sync::error::SyncError;
use registry_sync::image::ImageReference;
use registry_sync::logging::Logger;
use registry_sync::sync::{
    CancelSignal, ExecuteOptions, Executor, ImageSetResolver, OperationKind, OperationStatus,
    PackageSpec, PlanOptions, RunSummary, SyncPlan, SyncPlanner, TagCache, UnknownPackagePolicy,
};
use std::sync::Arc;

const OLD: &str = "microfocusidolserver";
const NEW: &str = "registry.example.com/idol";

fn quiet() -> Logger {
    Logger::new_quiet()
}

fn specs(packages: &[&str], versions: &[&str]) -> Vec<PackageSpec> {
    let packages: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
    let versions: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
    PackageSpec::cross(&packages, &versions).unwrap()
}

fn image(s: &str) -> ImageReference {
    ImageReference::parse(s).unwrap()
}

async fn resolve(
    source: &FakeRegistry,
    packages: &[&str],
    versions: &[&str],
) -> Vec<ImageReference> {
    ImageSetResolver::new(source, OLD, quiet())
        .resolve(&specs(packages, versions))
        .await
        .unwrap()
        .references
}

async fn plan(
    destination: &FakeRegistry,
    sources: &[ImageReference],
    remove_old: bool,
) -> SyncPlan {
    let mut options = PlanOptions::new(OLD, NEW);
    options.remove_old = remove_old;
    SyncPlanner::new(destination, quiet())
        .plan(sources, &options)
        .await
        .unwrap()
}

async fn execute(runtime: &FakeRuntime, plan: &SyncPlan, dry_run: bool) -> RunSummary {
    Executor::new(Arc::new(runtime.clone()), quiet())
        .execute(
            plan,
            &ExecuteOptions {
                dry_run,
                concurrency: 2,
            },
            &CancelSignal::new(),
        )
        .await
}

#[tokio::test]
async fn test_single_literal_image_is_pulled_retagged_and_pushed() {
    let source = FakeRegistry::new();
    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let sources = resolve(&source, &["content"], &["24.4"]).await;
    assert_eq!(sources, vec![image("microfocusidolserver/content:24.4")]);

    let plan = plan(&destination, &sources, false).await;
    let kinds: Vec<OperationKind> = plan.operations().map(|op| op.kind()).collect();
    assert_eq!(
        kinds,
        vec![OperationKind::Pull, OperationKind::Retag, OperationKind::Push]
    );
    let push = plan.operations().last().unwrap();
    assert_eq!(
        push.destination().to_string(),
        "registry.example.com/idol/content:24.4"
    );
    assert_eq!(push.existing_digest(), None);

    let summary = execute(&runtime, &plan, false).await;
    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.is_success());
    assert_eq!(
        runtime.calls(),
        vec![
            "pull microfocusidolserver/content:24.4",
            "tag microfocusidolserver/content:24.4",
            "push registry.example.com/idol/content:24.4",
        ]
    );
    assert!(destination.has_tag("idol/content", "24.4"));
}

#[tokio::test]
async fn test_literal_only_resolution_makes_no_registry_calls() {
    let source = FakeRegistry::new().with_tags("microfocusidolserver/content", &["24.4"]);
    let references = resolve(&source, &["content", "find"], &["24.4", "24.3"]).await;

    assert_eq!(references.len(), 4);
    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn test_wildcard_resolution_is_deduplicated() {
    let source =
        FakeRegistry::new().with_tags("microfocusidolserver/content", &["24.4", "24.3", "23.4"]);
    let references = resolve(&source, &["content"], &["*", "24.4", "24.*"]).await;

    let tags: Vec<&str> = references.iter().map(|r| r.tag()).collect();
    assert_eq!(tags, vec!["24.4", "24.3", "23.4"]);
    assert_eq!(source.tag_calls("microfocusidolserver/content"), 1);
}

#[tokio::test]
async fn test_package_patterns_expand_against_namespace() {
    let source = FakeRegistry::new()
        .with_tags("microfocusidolserver/content", &["24.4"])
        .with_tags("microfocusidolserver/discover-ui", &["24.4", "24.3"])
        .with_tags("otherns/discover-api", &["24.4"]);
    let references = resolve(&source, &["*disco*"], &["*"]).await;

    assert_eq!(
        references,
        vec![
            image("microfocusidolserver/discover-ui:24.4"),
            image("microfocusidolserver/discover-ui:24.3"),
        ]
    );
    assert_eq!(source.tag_calls("microfocusidolserver/content"), 0);
}

#[tokio::test]
async fn test_unknown_package_policy() {
    let source = FakeRegistry::new().with_tags("microfocusidolserver/content", &["24.4"]);

    let resolution = ImageSetResolver::new(&source, OLD, quiet())
        .resolve(&specs(&["content", "missing"], &["*"]))
        .await
        .unwrap();
    assert_eq!(resolution.references.len(), 1);
    assert_eq!(resolution.warnings.len(), 1);
    assert!(resolution.warnings[0].contains("missing"));

    let err = ImageSetResolver::new(&source, OLD, quiet())
        .with_policy(UnknownPackagePolicy::Fail)
        .resolve(&specs(&["content", "missing"], &["*"]))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownPackage(_)));
}

#[tokio::test]
async fn test_delete_old_always_follows_push() {
    let destination = FakeRegistry::new();
    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/find:24.4"),
    ];
    let plan = plan(&destination, &sources, true).await;

    assert_eq!(plan.count(OperationKind::DeleteOld), 2);
    for chain in plan.chains() {
        let kinds: Vec<OperationKind> = chain.operations.iter().map(|op| op.kind()).collect();
        let push = kinds.iter().position(|k| *k == OperationKind::Push).unwrap();
        let delete = kinds
            .iter()
            .position(|k| *k == OperationKind::DeleteOld)
            .unwrap();
        assert!(push < delete);
    }
    let order: Vec<&ImageReference> = plan.images();
    assert_eq!(order, sources.iter().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_dry_run_touches_nothing_and_matches_live_image_set() {
    let destination = FakeRegistry::new();
    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/find:24.4"),
    ];
    let plan = plan(&destination, &sources, true).await;
    let calls_after_planning = destination.total_calls();

    let dry_runtime = FakeRuntime::new();
    let dry = execute(&dry_runtime, &plan, true).await;
    assert!(dry.dry_run);
    assert!(dry_runtime.calls().is_empty());
    assert_eq!(destination.total_calls(), calls_after_planning);
    assert_eq!(dry.skipped, 2);
    assert!(dry.results().all(|r| r.status == OperationStatus::Skipped));
    assert!(dry.results().all(|r| r.detail.starts_with("would ")));
    let retag = dry
        .results()
        .find(|r| r.operation.kind() == OperationKind::Retag)
        .unwrap();
    assert_eq!(
        retag.detail,
        "would retag microfocusidolserver/content:24.4 -> registry.example.com/idol/content:24.4"
    );

    let live_runtime = FakeRuntime::new();
    let live = execute(&live_runtime, &plan, false).await;
    assert_eq!(dry.image_set(), live.image_set());
}

#[tokio::test]
async fn test_push_is_skipped_on_digest_match() {
    let digest = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
    let destination = FakeRegistry::new().with_digest("idol/content", "24.4", digest);
    let runtime = FakeRuntime::new()
        .with_source_digest("microfocusidolserver/content:24.4", digest)
        .publishing_to(destination.clone());

    let plan = plan(&destination, &[image("microfocusidolserver/content:24.4")], true).await;
    let push = plan
        .operations()
        .find(|op| op.kind() == OperationKind::Push)
        .unwrap();
    assert_eq!(push.existing_digest(), Some(digest));

    let summary = execute(&runtime, &plan, false).await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(runtime.count("push"), 0);
    let push_result = summary
        .results()
        .find(|r| r.operation.kind() == OperationKind::Push)
        .unwrap();
    assert_eq!(push_result.status, OperationStatus::Skipped);
    assert!(push_result.detail.contains("digest match"));
    // Delete still runs after a digest-match skip
    assert_eq!(runtime.count("rmi"), 1);
}

#[tokio::test]
async fn test_push_records_prior_digest_when_content_differs() {
    let old_digest = "sha256:2222222222222222222222222222222222222222222222222222222222222222";
    let destination = FakeRegistry::new().with_digest("idol/content", "24.4", old_digest);
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let plan = plan(&destination, &[image("microfocusidolserver/content:24.4")], false).await;
    let summary = execute(&runtime, &plan, false).await;

    assert_eq!(runtime.count("push"), 1);
    let push_result = summary
        .results()
        .find(|r| r.operation.kind() == OperationKind::Push)
        .unwrap();
    assert_eq!(push_result.status, OperationStatus::Succeeded);
    assert!(push_result.detail.contains(old_digest));
}

#[tokio::test]
async fn test_second_run_skips_every_push() {
    let source = FakeRegistry::new()
        .with_tags("microfocusidolserver/content", &["24.4", "24.3"])
        .with_tags("microfocusidolserver/find", &["24.4"]);
    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let sources = resolve(&source, &["content", "find"], &["*"]).await;
    assert_eq!(sources.len(), 3);

    let first = execute(&runtime, &plan(&destination, &sources, false).await, false).await;
    assert_eq!(first.operation_count(OperationKind::Push, OperationStatus::Succeeded), 3);
    assert_eq!(runtime.count("push"), 3);

    let second = execute(&runtime, &plan(&destination, &sources, false).await, false).await;
    assert!(second.is_success());
    assert_eq!(second.operation_count(OperationKind::Push, OperationStatus::Skipped), 3);
    assert_eq!(runtime.count("push"), 3);
}

#[tokio::test]
async fn test_failure_is_isolated_to_its_image() {
    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new()
        .failing("push registry.example.com/idol/find:24.4")
        .publishing_to(destination.clone());

    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/find:24.4"),
    ];
    let plan = plan(&destination, &sources, true).await;
    let summary = execute(&runtime, &plan, false).await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].image, sources[1]);
    assert!(summary.failures[0].detail.contains("push failed"));

    // No delete after the failed push; the other image still completes
    assert_eq!(runtime.count("rmi"), 1);
    assert!(runtime
        .calls()
        .contains(&"rmi microfocusidolserver/content:24.4".to_string()));
    let find = &summary.images[1];
    let delete = find.results.last().unwrap();
    assert_eq!(delete.operation.kind(), OperationKind::DeleteOld);
    assert_eq!(delete.status, OperationStatus::Skipped);
    assert!(delete.detail.contains("push failed"));
}

#[tokio::test]
async fn test_cancellation_stops_dispatch_but_finishes_in_flight() {
    let destination = FakeRegistry::new();
    let cancel = CancelSignal::new();
    let runtime = FakeRuntime::new().cancelling_on_first_pull(cancel.clone());

    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/find:24.4"),
        image("microfocusidolserver/view:24.4"),
    ];
    let plan = plan(&destination, &sources, false).await;
    let summary = Executor::new(Arc::new(runtime.clone()), quiet())
        .execute(
            &plan,
            &ExecuteOptions {
                dry_run: false,
                concurrency: 1,
            },
            &cancel,
        )
        .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(runtime.count("pull"), 1);
    assert_eq!(runtime.count("push"), 1);
    for outcome in &summary.images[1..] {
        assert!(outcome.results.iter().all(|r| r.detail == "cancelled"));
    }
}

#[tokio::test]
async fn test_destination_tags_are_listed_once_per_repository() {
    let destination = FakeRegistry::new().with_tags("idol/content", &["24.1"]);
    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/content:24.3"),
        image("microfocusidolserver/content:24.2"),
        image("microfocusidolserver/find:24.4"),
    ];

    let cache = TagCache::new();
    let planner = SyncPlanner::new(&destination, quiet()).with_cache(cache.clone());
    planner.plan(&sources, &PlanOptions::new(OLD, NEW)).await.unwrap();
    planner.plan(&sources, &PlanOptions::new(OLD, NEW)).await.unwrap();

    assert_eq!(destination.tag_calls("idol/content"), 1);
    assert_eq!(destination.tag_calls("idol/find"), 1);
    assert_eq!(cache.len().await, 2);
}

#[tokio::test]
async fn test_source_outside_prefix_is_rejected() {
    let destination = FakeRegistry::new();
    let err = SyncPlanner::new(&destination, quiet())
        .plan(&[image("otherns/content:24.4")], &PlanOptions::new(OLD, NEW))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn test_runner_end_to_end_with_report() {
    let report_dir = tempfile::tempdir().unwrap();
    let args = Args::try_parse_from([
        "registry-sync",
        "--old-repo",
        OLD,
        "--new-repo",
        NEW,
        "--packages",
        "content,find",
        "--versions",
        "24.4",
        "--execute",
        "--use-existing-auth",
        "--report-dir",
        report_dir.path().to_str().unwrap(),
    ])
    .unwrap();
    let config = SyncConfig::from_args(&args).unwrap();

    let source = FakeRegistry::new();
    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let summary = Runner::new(config, quiet())
        .with_registries(Arc::new(source.clone()), Arc::new(destination.clone()))
        .with_runtime(Arc::new(runtime.clone()))
        .run()
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.succeeded, 2);
    assert_eq!(runtime.count("login"), 0);
    assert!(destination.has_tag("idol/find", "24.4"));

    let reports: Vec<_> = std::fs::read_dir(report_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("sync_report_"));
}

#[tokio::test]
async fn test_pull_failure_skips_rest_of_chain() {
    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new()
        .failing("pull microfocusidolserver/content:24.4")
        .publishing_to(destination.clone());

    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/find:24.4"),
    ];
    let plan = plan(&destination, &sources, false).await;
    let summary = execute(&runtime, &plan, false).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(runtime.count("tag"), 1);
    assert_eq!(runtime.count("push"), 1);

    let content = &summary.images[0];
    assert_eq!(content.results[0].operation.kind(), OperationKind::Pull);
    assert_eq!(content.results[0].status, OperationStatus::Failed);
    let pull_error = content.results[0].detail.clone();
    assert!(pull_error.contains("pull failed"));
    for result in &content.results[1..] {
        assert_eq!(result.status, OperationStatus::Skipped);
        assert_eq!(result.detail, format!("skipped: {}", pull_error));
    }

    assert!(destination.has_tag("idol/find", "24.4"));
    assert!(!destination.has_tag("idol/content", "24.4"));
}

#[tokio::test]
async fn test_destination_listing_failure_only_blocks_its_images() {
    let destination = FakeRegistry::new().with_unavailable_tags("idol/find");
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let sources = vec![
        image("microfocusidolserver/content:24.4"),
        image("microfocusidolserver/find:24.4"),
    ];
    let plan = plan(&destination, &sources, false).await;
    assert_eq!(plan.chains().len(), 2);
    let blocked: Vec<&ImageReference> = plan.blocked().map(|chain| &chain.source).collect();
    assert_eq!(blocked, vec![&sources[1]]);

    let dry = execute(&FakeRuntime::new(), &plan, true).await;
    assert_eq!(dry.failed, 1);
    assert_eq!(dry.skipped, 1);

    let summary = execute(&runtime, &plan, false).await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(destination.has_tag("idol/content", "24.4"));
    assert_eq!(runtime.count("pull"), 1);
    assert!(!runtime
        .calls()
        .contains(&"pull microfocusidolserver/find:24.4".to_string()));

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].image, sources[1]);
    assert!(summary.failures[0]
        .detail
        .contains("destination tag listing failed"));
    assert!(summary.failures[0].detail.contains("HTTP 503"));
}

#[tokio::test]
async fn test_push_skipped_when_destination_name_digest_matches() {
    // Multi-arch pulls record a different RepoDigest per registry name
    let source_digest = "sha256:3333333333333333333333333333333333333333333333333333333333333333";
    let pushed_digest = "sha256:4444444444444444444444444444444444444444444444444444444444444444";
    let destination = FakeRegistry::new().with_digest("idol/content", "24.4", pushed_digest);
    let runtime = FakeRuntime::new()
        .with_source_digest("microfocusidolserver/content:24.4", source_digest)
        .with_repo_digest("registry.example.com/idol/content:24.4", pushed_digest)
        .publishing_to(destination.clone());

    let plan = plan(&destination, &[image("microfocusidolserver/content:24.4")], false).await;
    let summary = execute(&runtime, &plan, false).await;

    assert!(summary.is_success());
    assert_eq!(runtime.count("push"), 0);
    let push_result = summary
        .results()
        .find(|r| r.operation.kind() == OperationKind::Push)
        .unwrap();
    assert_eq!(push_result.status, OperationStatus::Skipped);
    assert!(push_result.detail.contains(pushed_digest));
}

#[tokio::test]
async fn test_runner_logs_in_to_destination_login_server() {
    let args = Args::try_parse_from([
        "registry-sync",
        "--old-repo",
        OLD,
        "--new-repo",
        NEW,
        "--packages",
        "content",
        "--versions",
        "24.4",
        "--execute",
        "--registry-username",
        "deploy",
        "--registry-password",
        "hunter2",
    ])
    .unwrap();
    let config = SyncConfig::from_args(&args).unwrap();

    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let summary = Runner::new(config, quiet())
        .with_registries(Arc::new(FakeRegistry::new()), Arc::new(destination.clone()))
        .with_runtime(Arc::new(runtime.clone()))
        .run()
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(runtime.calls()[0], "login registry.example.com deploy");
    assert_eq!(runtime.count("login"), 1);
}

#[tokio::test]
async fn test_runner_explicit_images_skip_resolution() {
    let args = Args::try_parse_from([
        "registry-sync",
        "--old-repo",
        OLD,
        "--new-repo",
        NEW,
        "--image",
        "content:24.4",
        "--execute",
        "--use-existing-auth",
    ])
    .unwrap();
    let config = SyncConfig::from_args(&args).unwrap();

    let source = FakeRegistry::new().with_tags("microfocusidolserver/find", &["24.4"]);
    let destination = FakeRegistry::new();
    let runtime = FakeRuntime::new().publishing_to(destination.clone());

    let summary = Runner::new(config, quiet())
        .with_registries(Arc::new(source.clone()), Arc::new(destination.clone()))
        .with_runtime(Arc::new(runtime.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(source.total_calls(), 0);
    assert_eq!(summary.total, 1);
    assert_eq!(
        summary.images[0].image,
        image("microfocusidolserver/content:24.4")
    );
    assert!(destination.has_tag("idol/content", "24.4"));
    assert!(!destination.has_tag("idol/find", "24.4"));
}

