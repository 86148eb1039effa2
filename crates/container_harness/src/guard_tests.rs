use std::sync::Arc;

use super::*;
use crate::mock_runtime::{MockCall, MockRuntime};
use crate::runtime::{RUN_LABEL, harness_labels};

fn guard(runtime: &Arc<MockRuntime>) -> ScenarioResources {
    ScenarioResources::new(runtime.clone(), harness_labels("run-1"))
}

#[tokio::test]
async fn test_release_removes_instances_before_volumes() {
    let runtime = Arc::new(MockRuntime::new());
    let mut resources = guard(&runtime);

    resources.create_volume("data").await.unwrap();
    resources
        .start_instance(InstanceSpec::new("db", "mysql:8.0").with_volume("data", "/var/lib/mysql"))
        .await
        .unwrap();

    let failures = resources.release().await;
    assert!(failures.is_empty());
    assert!(runtime.live_instances().is_empty());
    assert!(runtime.volumes().is_empty());

    let calls = runtime.calls();
    let tail: Vec<&MockCall> = calls.iter().rev().take(3).collect();
    assert_eq!(tail[0], &MockCall::RemoveVolume("data".to_string()));
    assert_eq!(tail[1], &MockCall::RemoveInstance("db".to_string()));
    assert_eq!(tail[2], &MockCall::StopInstance("db".to_string()));
}

#[tokio::test]
async fn test_instances_carry_guard_labels() {
    let runtime = Arc::new(MockRuntime::new());
    let mut resources = guard(&runtime);

    resources
        .start_instance(InstanceSpec::new("db", "mysql:8.0"))
        .await
        .unwrap();

    let spec = runtime.started_spec("db").unwrap();
    assert_eq!(spec.labels.get(RUN_LABEL).map(String::as_str), Some("run-1"));
    resources.release().await;
}

#[tokio::test]
async fn test_cleanup_failures_are_reported_not_raised() {
    let runtime = Arc::new(MockRuntime::new().with_cleanup_failures());
    let mut resources = guard(&runtime);

    resources.create_volume("data").await.unwrap();
    resources
        .start_instance(InstanceSpec::new("db", "mysql:8.0"))
        .await
        .unwrap();

    let failures = resources.release().await;
    assert_eq!(failures.len(), 3);
    assert!(failures[0].starts_with("stop db"));
    assert!(failures[2].starts_with("remove volume data"));
}

#[tokio::test]
async fn test_removed_instance_is_not_released_twice() {
    let runtime = Arc::new(MockRuntime::new());
    let mut resources = guard(&runtime);

    let mut first = resources
        .start_instance(InstanceSpec::new("first", "mysql:8.0"))
        .await
        .unwrap();
    resources
        .start_instance(InstanceSpec::new("second", "mysql:8.0"))
        .await
        .unwrap();

    resources.stop_instance(&mut first).await.unwrap();
    resources.remove_instance(&mut first).await.unwrap();
    assert_eq!(resources.tracked_instances(), 1);

    resources.release().await;

    let removals = runtime
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MockCall::RemoveInstance(name) if name == "first"))
        .count();
    assert_eq!(removals, 1);
}

#[tokio::test]
async fn test_failed_start_leaves_nothing_to_release() {
    let runtime = Arc::new(MockRuntime::new().with_start_failure("image not found"));
    let mut resources = guard(&runtime);

    let result = resources
        .start_instance(InstanceSpec::new("db", "mysql:8.0"))
        .await;
    assert!(result.is_err());
    assert_eq!(resources.tracked_instances(), 0);
    assert!(resources.release().await.is_empty());
}

#[tokio::test]
async fn test_drop_without_release_cleans_up_in_background() {
    let runtime = Arc::new(MockRuntime::new());
    {
        let mut resources = guard(&runtime);
        resources
            .start_instance(InstanceSpec::new("db", "mysql:8.0"))
            .await
            .unwrap();
    }

    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(runtime.live_instances().is_empty());
}

#[tokio::test]
async fn test_run_network_lifecycle() {
    let runtime = Arc::new(MockRuntime::new());
    let network = RunNetwork::create(runtime.clone(), "test-dbimage-net", &harness_labels("run-1"))
        .await
        .unwrap();

    assert_eq!(network.name(), "test-dbimage-net");
    assert!(runtime.networks().contains("test-dbimage-net"));

    assert!(network.remove().await.is_none());
    assert!(runtime.networks().is_empty());
}

#[tokio::test]
async fn test_run_network_removal_failure_is_reported() {
    let runtime = Arc::new(MockRuntime::new().with_cleanup_failures());
    let network = RunNetwork::create(runtime.clone(), "net", &BTreeMap::new())
        .await
        .unwrap();

    let failure = network.remove().await;
    assert!(failure.unwrap().starts_with("remove network net"));
}
