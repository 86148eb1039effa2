//! Tests for test cleanup utilities.

use super::*;
use chrono::Duration;
use container_harness::mock_runtime::MockRuntime;
use serial_test::serial;
use std::sync::Arc;

const OLD_CONTAINER: &str = "test-dbimage-local-20240101-000000-basic-aaaaaa";
const OLD_VOLUME: &str = "test-dbimage-pr42-20240101-000000-persist-bbbbbb";
const NEW_NETWORK: &str = "test-dbimage-local-20240101-000000-net-cccccc";
const FOREIGN_VOLUME: &str = "someone-elses-volume";

fn seeded_runtime() -> Arc<MockRuntime> {
    let old = Utc::now() - Duration::hours(5);
    Arc::new(
        MockRuntime::new()
            .with_existing_resource(ResourceKind::Network, NEW_NETWORK, Utc::now())
            .with_existing_resource(ResourceKind::Volume, OLD_VOLUME, old)
            .with_existing_resource(ResourceKind::Container, OLD_CONTAINER, old)
            .with_existing_resource(ResourceKind::Volume, FOREIGN_VOLUME, old),
    )
}

#[test]
fn test_is_test_resource() {
    assert!(ResourceCleanup::is_test_resource(OLD_CONTAINER));
    assert!(ResourceCleanup::is_test_resource("e2e-dbimage-main-net"));
    assert!(!ResourceCleanup::is_test_resource(FOREIGN_VOLUME));
    assert!(!ResourceCleanup::is_test_resource("dbimage-test"));
}

#[tokio::test]
async fn test_cleanup_orphaned_respects_age_and_name() {
    let runtime = seeded_runtime();
    let cleanup = ResourceCleanup::new(runtime.clone());

    let deleted = cleanup.cleanup_orphaned_resources(1).await.unwrap();

    assert_eq!(
        deleted,
        vec![OLD_CONTAINER.to_string(), OLD_VOLUME.to_string()]
    );
    assert!(runtime.live_instances().is_empty());
    assert!(runtime.volumes().contains(FOREIGN_VOLUME));
    assert!(runtime.networks().contains(NEW_NETWORK));
}

#[tokio::test]
async fn test_cleanup_with_zero_age_removes_all_test_resources() {
    let runtime = seeded_runtime();
    let cleanup = ResourceCleanup::new(runtime.clone());

    let deleted = cleanup.cleanup_orphaned_resources(0).await.unwrap();

    // Containers first, then volumes, then networks.
    assert_eq!(
        deleted,
        vec![
            OLD_CONTAINER.to_string(),
            OLD_VOLUME.to_string(),
            NEW_NETWORK.to_string(),
        ]
    );
    assert_eq!(
        runtime.volumes().into_iter().collect::<Vec<_>>(),
        vec![FOREIGN_VOLUME.to_string()]
    );
}

#[tokio::test]
async fn test_cleanup_pr_resources_only_matches_pr() {
    let runtime = seeded_runtime();
    let cleanup = ResourceCleanup::new(runtime.clone());

    let deleted = cleanup.cleanup_pr_resources(42).await.unwrap();

    assert_eq!(deleted, vec![OLD_VOLUME.to_string()]);
    assert_eq!(runtime.live_instances().len(), 1);
}

#[tokio::test]
async fn test_unrepresentable_age_deletes_nothing() {
    let runtime = seeded_runtime();
    let cleanup = ResourceCleanup::new(runtime.clone());

    for hours in [u64::MAX, i64::MAX as u64, 3_000_000_000_000] {
        let deleted = cleanup.cleanup_orphaned_resources(hours).await.unwrap();
        assert!(deleted.is_empty(), "age {} deleted {:?}", hours, deleted);
    }
    assert!(runtime.networks().contains(NEW_NETWORK));
    assert!(runtime.volumes().contains(OLD_VOLUME));
    assert_eq!(runtime.live_instances().len(), 1);
}

#[tokio::test]
async fn test_failed_deletions_are_skipped() {
    let runtime = Arc::new(
        MockRuntime::new()
            .with_existing_resource(
                ResourceKind::Volume,
                OLD_VOLUME,
                Utc::now() - Duration::hours(3),
            )
            .with_cleanup_failures(),
    );
    let cleanup = ResourceCleanup::new(runtime.clone());

    let deleted = cleanup.cleanup_orphaned_resources(1).await.unwrap();
    assert!(deleted.is_empty());
    assert!(runtime.volumes().contains(OLD_VOLUME));
}

#[test]
#[serial]
fn test_cleanup_config_default() {
    unsafe {
        std::env::remove_var("CLEANUP_MAX_AGE_HOURS");
    }
    assert_eq!(CleanupConfig::from_env().unwrap().max_age_hours, 1);
}

#[test]
#[serial]
fn test_cleanup_config_rejects_garbage() {
    unsafe {
        std::env::set_var("CLEANUP_MAX_AGE_HOURS", "lots");
    }
    let result = CleanupConfig::from_env();
    unsafe {
        std::env::remove_var("CLEANUP_MAX_AGE_HOURS");
    }
    assert!(result.is_err());
}
