//! Tests for the scenario runner, driven by the in-memory runtime.

use super::*;
use container_harness::mock_runtime::{MockCall, MockRuntime};
use container_harness::ExecOutput;

const READY_LOGS: &str = "2024-01-08T12:00:00.000000Z 0 [System] [MY-010931] [Server] \
/usr/sbin/mysqld: ready for connections. Version: '8.0.36'  \
socket: '/var/run/mysqld/mysqld.sock'  port: 3306  MySQL Community Server - GPL.\n";

const PASSWORD_WARNING: &str =
    "mysql: [Warning] Using a password on the command line interface can be insecure.\n";

fn fixed_inputs() -> ScenarioInputs {
    ScenarioInputs {
        root_password: "rootsecret".to_string(),
        user: "user_fixed".to_string(),
        user_password: "usersecret".to_string(),
        database: "db_fixed".to_string(),
    }
}

fn test_config() -> HarnessConfig {
    HarnessConfig {
        readiness_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(100),
        ..HarnessConfig::for_image("mysql:8.0")
    }
}

fn database_listing() -> ExecOutput {
    ExecOutput::success(format!(
        "{}information_schema\nmysql\nperformance_schema\nsys\ndb_fixed\n",
        PASSWORD_WARNING
    ))
}

fn healthy_runtime() -> Arc<MockRuntime> {
    Arc::new(
        MockRuntime::new()
            .with_ready_logs_after(1, READY_LOGS)
            .respond_to("SHOW DATABASES", database_listing())
            .respond_to(
                "SELECT id, label",
                ExecOutput::success(format!("{}42\thello\n", PASSWORD_WARNING)),
            ),
    )
}

fn runner(runtime: &Arc<MockRuntime>) -> ImageTestRunner {
    ImageTestRunner::new(test_config(), runtime.clone()).unwrap()
}

fn assert_nothing_left(runtime: &MockRuntime) {
    assert!(runtime.live_instances().is_empty(), "instances left behind");
    assert!(runtime.volumes().is_empty(), "volumes left behind");
    assert!(runtime.networks().is_empty(), "networks left behind");
}

#[tokio::test]
async fn test_root_password_only_passes() {
    let runtime = healthy_runtime();
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::RootPasswordOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.details.instance_started);
    assert!(result.details.ready_observed);
    assert!(result.details.commands_run);
    assert!(result.details.assertions_passed);
    assert!(result.cleanup_failures.is_empty());
    assert_nothing_left(&runtime);
}

#[tokio::test]
async fn test_user_and_database_connects_as_provisioned_user() {
    let runtime = healthy_runtime();
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::UserAndDatabase, fixed_inputs())
        .await
        .unwrap();
    assert!(result.success, "unexpected failure: {:?}", result.error);

    let name = &result.details.instances[0];
    assert!(name.starts_with("test-dbimage-"));
    assert!(name.contains("-user-and-database-"));

    // The provisioned user, not root, ran the listing.
    let scripts = runtime.exec_scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("--user=user_fixed"));
    assert!(scripts[0].contains("-pusersecret"));
}

#[tokio::test]
async fn test_create_database_runs_both_statements() {
    let runtime = healthy_runtime();
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::CreateDatabase, fixed_inputs())
        .await
        .unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    let scripts = runtime.exec_scripts();
    assert!(scripts[0].contains("CREATE DATABASE db_fixed;\nSHOW DATABASES;"));
}

#[tokio::test]
async fn test_persistent_volume_restarts_on_same_volume() {
    let runtime = healthy_runtime();
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::PersistentVolume, fixed_inputs())
        .await
        .unwrap();

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.details.instances.len(), 2);

    let scripts = runtime.exec_scripts();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("INSERT INTO items VALUES (42, 'hello');"));
    assert!(scripts[1].contains("SELECT id, label FROM items;"));

    // The first instance is gone before the second one starts.
    let calls = runtime.calls();
    let first_removed = calls
        .iter()
        .position(|c| *c == MockCall::RemoveInstance(result.details.instances[0].clone()))
        .unwrap();
    let second_started = calls
        .iter()
        .position(|c| *c == MockCall::StartInstance(result.details.instances[1].clone()))
        .unwrap();
    assert!(first_removed < second_started);

    assert_nothing_left(&runtime);
}

#[tokio::test]
async fn test_assertion_failure_still_cleans_up() {
    let runtime = Arc::new(
        MockRuntime::new()
            .with_ready_logs_after(1, READY_LOGS)
            .respond_to("SHOW DATABASES", ExecOutput::success("information_schema\n")),
    );
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::RootPasswordOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Assertion));
    assert!(result.details.commands_run);
    assert!(!result.details.assertions_passed);
    assert!(result.error.unwrap().contains("System database missing"));
    assert_nothing_left(&runtime);
}

#[tokio::test]
async fn test_startup_failure_aborts_scenario() {
    let runtime = Arc::new(MockRuntime::new().with_start_failure("image not found"));
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::DatabaseOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Startup));
    assert!(!result.details.instance_started);
    assert!(runtime.exec_scripts().is_empty());
    assert_nothing_left(&runtime);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_aborts_scenario() {
    let runtime = Arc::new(MockRuntime::new());
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::RootPasswordOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::ReadinessTimeout));
    assert!(result.details.instance_started);
    assert!(!result.details.ready_observed);
    assert!(runtime.exec_scripts().is_empty());
    assert_nothing_left(&runtime);
}

#[tokio::test(start_paused = true)]
async fn test_instance_exit_is_a_startup_failure() {
    let runtime = Arc::new(MockRuntime::new().with_exit_after_polls(2));
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::RootPasswordOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Startup));
    assert_nothing_left(&runtime);
}

#[tokio::test]
async fn test_client_error_is_command_failure() {
    let runtime = Arc::new(
        MockRuntime::new()
            .with_ready_logs_after(1, READY_LOGS)
            .respond_to(
                "SHOW DATABASES",
                ExecOutput {
                    exit_code: 1,
                    output: "ERROR 1045 (28000): Access denied for user 'root'@'localhost'\n"
                        .to_string(),
                },
            ),
    );
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::RootPasswordOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.failure_kind, Some(FailureKind::Command));
    assert!(result.error.unwrap().contains("Access denied"));
}

#[tokio::test]
async fn test_failed_scenario_does_not_abort_run() {
    // The listing never contains a generated database name.
    let runtime = Arc::new(
        MockRuntime::new()
            .with_ready_logs_after(1, READY_LOGS)
            .respond_to("SHOW DATABASES", ExecOutput::success("information_schema\nmysql\n")),
    );
    let results = runner(&runtime)
        .run_scenarios(&[TestScenario::DatabaseOnly, TestScenario::RootPasswordOnly])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert!(results[1].success);
    assert_nothing_left(&runtime);
}

#[tokio::test]
async fn test_cleanup_failures_do_not_change_verdict() {
    let runtime = Arc::new(
        MockRuntime::new()
            .with_ready_logs_after(1, READY_LOGS)
            .respond_to("SHOW DATABASES", database_listing())
            .with_cleanup_failures(),
    );
    let result = runner(&runtime)
        .run_scenario_with_inputs(TestScenario::RootPasswordOnly, fixed_inputs())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.cleanup_failures.len(), 2);
    assert!(result.cleanup_failures[0].starts_with("stop "));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = HarnessConfig {
        poll_interval: Duration::ZERO,
        ..test_config()
    };
    let runtime: SharedRuntime = Arc::new(MockRuntime::new());
    assert!(ImageTestRunner::new(config, runtime).is_err());
}

#[test]
fn test_failure_kind_sees_through_context() {
    let err = anyhow::Error::new(HarnessError::AssertionFailed {
        expected: "mysql".to_string(),
        actual: String::new(),
    })
    .context("System database missing from listing");
    assert_eq!(FailureKind::classify(&err), FailureKind::Assertion);

    let other = anyhow::anyhow!("something else");
    assert_eq!(FailureKind::classify(&other), FailureKind::Other);
}

#[test]
fn test_failure_kind_splits_startup_from_timeout() {
    let exited = anyhow::Error::new(HarnessError::InstanceExited {
        name: "db".to_string(),
        logs: String::new(),
    })
    .context("Instance never became ready");
    assert_eq!(FailureKind::classify(&exited), FailureKind::Startup);

    let refused = anyhow::Error::new(HarnessError::StartupFailed {
        name: "db".to_string(),
        reason: "no such image".to_string(),
    });
    assert_eq!(FailureKind::classify(&refused), FailureKind::Startup);

    let timed_out = anyhow::Error::new(HarnessError::ReadinessTimeout {
        name: "db".to_string(),
        pattern: "ready for connections".to_string(),
        timeout: Duration::from_secs(2),
        logs: String::new(),
    });
    assert_eq!(FailureKind::classify(&timed_out), FailureKind::ReadinessTimeout);
}
