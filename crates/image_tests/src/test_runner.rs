//! Scenario runner for database image tests.
//!
//! Runs scenarios one after another on a network shared by the whole run.
//! Each scenario owns its instances and volumes through a
//! [`ScenarioResources`] guard, which is released after the scenario
//! whatever its outcome. A failing scenario is recorded and the run moves on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use container_harness::{
    harness_labels, Credentials, DockerRuntime, Error as HarnessError, HarnessConfig, Instance,
    InstanceSpec, Query, QueryOutput, ReadinessProbe, RunNetwork, ScenarioResources,
    SharedRuntime, SqlClient,
};
use serde::Serialize;
use test_cleanup::ResourceCleanup;
use test_utils::{generate_run_id, generate_test_name};
use tracing::{error, info, warn};

use crate::scenarios::{ScenarioInputs, TestScenario};

/// Value the persistence scenario writes and expects to read back.
pub const PERSISTED_ROW: &str = "42\thello";

/// Why a scenario failed, following the harness error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The instance could not be created or exited before becoming ready
    Startup,
    ReadinessTimeout,
    /// The client ran but the output did not match
    Assertion,
    /// The client exited with a non-zero status
    Command,
    Other,
}

impl FailureKind {
    /// Classify a scenario error by the harness error it carries.
    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<HarnessError>() {
            Some(HarnessError::ReadinessTimeout { .. }) => FailureKind::ReadinessTimeout,
            Some(e) if e.is_startup_related() => FailureKind::Startup,
            Some(HarnessError::AssertionFailed { .. }) => FailureKind::Assertion,
            Some(HarnessError::CommandFailed { .. }) => FailureKind::Command,
            _ => FailureKind::Other,
        }
    }
}

/// Result of running a single test scenario
#[derive(Debug)]
pub struct TestResult {
    pub scenario: TestScenario,
    pub success: bool,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub duration: Duration,
    pub details: TestDetails,
    /// Cleanup steps that failed; reported, never fatal.
    pub cleanup_failures: Vec<String>,
}

/// Detailed test execution information
#[derive(Debug, Default, Clone, Serialize)]
pub struct TestDetails {
    /// Names of the instances the scenario started
    pub instances: Vec<String>,
    pub instance_started: bool,
    /// Whether the readiness signal was observed for every instance
    pub ready_observed: bool,
    pub commands_run: bool,
    pub assertions_passed: bool,
}

/// Test runner that orchestrates all scenarios against one image
pub struct ImageTestRunner {
    config: HarnessConfig,
    runtime: SharedRuntime,
    probe: ReadinessProbe,
    client: SqlClient,
    run_id: String,
    labels: BTreeMap<String, String>,
    cleanup: ResourceCleanup,
}

impl ImageTestRunner {
    /// Create a runner over an existing runtime.
    pub fn new(config: HarnessConfig, runtime: SharedRuntime) -> Result<Self> {
        config.validate().context("Invalid harness configuration")?;
        let probe = ReadinessProbe::from_config(&config)
            .context("Failed to build readiness probe")?;
        let client = SqlClient::new(runtime.clone(), config.flavor);
        let run_id = generate_run_id();
        let labels = harness_labels(&run_id);
        let cleanup = ResourceCleanup::new(runtime.clone());

        info!(
            image = config.image,
            flavor = %config.flavor,
            run_id = run_id,
            "Initializing image test runner"
        );

        Ok(Self {
            config,
            runtime,
            probe,
            client,
            run_id,
            labels,
            cleanup,
        })
    }

    /// Create a runner connected to the local Docker daemon.
    pub async fn connect(config: HarnessConfig) -> Result<Self> {
        let runtime = DockerRuntime::connect()
            .await
            .context("Failed to connect to the container runtime")?;
        Self::new(config, Arc::new(runtime))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run every scenario.
    pub async fn run_all_tests(&self) -> Result<Vec<TestResult>> {
        self.run_scenarios(&TestScenario::all()).await
    }

    /// Run `scenarios` in order, each with freshly generated inputs.
    pub async fn run_scenarios(&self, scenarios: &[TestScenario]) -> Result<Vec<TestResult>> {
        let cases = scenarios
            .iter()
            .map(|scenario| (*scenario, ScenarioInputs::generate()))
            .collect();
        self.run_cases(cases).await
    }

    /// Run one scenario with caller-chosen inputs, on a network of its own.
    pub async fn run_scenario_with_inputs(
        &self,
        scenario: TestScenario,
        inputs: ScenarioInputs,
    ) -> Result<TestResult> {
        let mut results = self.run_cases(vec![(scenario, inputs)]).await?;
        results
            .pop()
            .context("Scenario run produced no result")
    }

    async fn run_cases(&self, cases: Vec<(TestScenario, ScenarioInputs)>) -> Result<Vec<TestResult>> {
        info!(count = cases.len(), run_id = self.run_id, "Starting image test suite");

        let network = RunNetwork::create(
            self.runtime.clone(),
            generate_test_name("test", "network"),
            &self.labels,
        )
        .await
        .context("Failed to create run network")?;

        let mut results = Vec::new();
        for (scenario, inputs) in cases {
            info!(scenario = ?scenario, "Running test scenario");
            let result = self.run_single_test(scenario, &inputs, network.name()).await;
            results.push(result);
        }

        if let Some(failure) = network.remove().await {
            warn!(failure = failure, "Run network was left behind");
        }

        // Log summary
        let total_tests = results.len();
        let passed_tests = results.iter().filter(|r| r.success).count();
        let failed_tests = total_tests - passed_tests;

        info!(
            total = total_tests,
            passed = passed_tests,
            failed = failed_tests,
            "Image test suite completed"
        );

        Ok(results)
    }

    /// Run a single test scenario and release everything it created.
    async fn run_single_test(
        &self,
        scenario: TestScenario,
        inputs: &ScenarioInputs,
        network: &str,
    ) -> TestResult {
        let start_time = Instant::now();
        let mut details = TestDetails::default();
        let mut resources = ScenarioResources::new(self.runtime.clone(), self.labels.clone());

        let outcome = self
            .execute_test_scenario(scenario, inputs, network, &mut resources, &mut details)
            .await;

        // Unconditional; failures here never change the verdict.
        let cleanup_failures = resources.release().await;
        for failure in &cleanup_failures {
            warn!(scenario = ?scenario, failure = failure, "Cleanup step failed");
        }

        let (success, error_message, failure_kind) = match outcome {
            Ok(()) => {
                info!(scenario = ?scenario, "Test scenario completed successfully");
                (true, None, None)
            }
            Err(e) => {
                let kind = FailureKind::classify(&e);
                error!(scenario = ?scenario, kind = ?kind, error = %e, "Test scenario failed");
                (false, Some(format!("{:#}", e)), Some(kind))
            }
        };

        TestResult {
            scenario,
            success,
            error: error_message,
            failure_kind,
            duration: start_time.elapsed(),
            details,
            cleanup_failures,
        }
    }

    /// Execute the actual test scenario logic
    async fn execute_test_scenario(
        &self,
        scenario: TestScenario,
        inputs: &ScenarioInputs,
        network: &str,
        resources: &mut ScenarioResources,
        details: &mut TestDetails,
    ) -> Result<()> {
        let flavor = self.config.flavor;
        let root = Credentials::new(flavor.admin_user(), &inputs.root_password);

        match scenario {
            TestScenario::RootPasswordOnly => {
                let spec = self.base_spec(scenario.test_name(), network, inputs);
                let instance = self.start_ready_instance(spec, resources, details).await?;

                let output = self
                    .run_client(&instance, &root, &Query::new("SHOW DATABASES;"), details)
                    .await?;
                output
                    .expect_line(flavor.system_database())
                    .context("System database missing from listing")?;
            }
            TestScenario::CreateDatabase => {
                let spec = self.base_spec(scenario.test_name(), network, inputs);
                let instance = self.start_ready_instance(spec, resources, details).await?;

                let query = Query::statements([
                    format!("CREATE DATABASE {};", inputs.database),
                    "SHOW DATABASES;".to_string(),
                ]);
                let output = self.run_client(&instance, &root, &query, details).await?;
                output
                    .expect_line(&inputs.database)
                    .context("Created database missing from listing")?;
            }
            TestScenario::UserAndDatabase => {
                let spec = self
                    .base_spec(scenario.test_name(), network, inputs)
                    .with_env(flavor.database_var(), &inputs.database)
                    .with_env(flavor.user_var(), &inputs.user)
                    .with_env(flavor.password_var(), &inputs.user_password);
                let instance = self.start_ready_instance(spec, resources, details).await?;

                let user = Credentials::new(&inputs.user, &inputs.user_password);
                let output = self
                    .run_client(&instance, &user, &Query::new("SHOW DATABASES;"), details)
                    .await?;
                output
                    .expect_line(&inputs.database)
                    .context("Provisioned user cannot see its database")?;
            }
            TestScenario::DatabaseOnly => {
                let spec = self
                    .base_spec(scenario.test_name(), network, inputs)
                    .with_env(flavor.database_var(), &inputs.database);
                let instance = self.start_ready_instance(spec, resources, details).await?;

                let output = self
                    .run_client(&instance, &root, &Query::new("SHOW DATABASES;"), details)
                    .await?;
                output
                    .expect_line(&inputs.database)
                    .context("Provisioned database missing right after readiness")?;
            }
            TestScenario::PersistentVolume => {
                self.execute_persistence_scenario(scenario, inputs, network, resources, details)
                    .await?;
            }
        }

        details.assertions_passed = true;
        Ok(())
    }

    async fn execute_persistence_scenario(
        &self,
        scenario: TestScenario,
        inputs: &ScenarioInputs,
        network: &str,
        resources: &mut ScenarioResources,
        details: &mut TestDetails,
    ) -> Result<()> {
        let flavor = self.config.flavor;
        let root = Credentials::new(flavor.admin_user(), &inputs.root_password);
        let volume = generate_test_name("test", &format!("{}-data", scenario.test_name()));

        resources
            .create_volume(&volume)
            .await
            .context("Failed to create data volume")?;

        // First instance initializes the data directory and writes the row.
        let spec = self
            .base_spec(&format!("{}-first", scenario.test_name()), network, inputs)
            .with_env(flavor.database_var(), &inputs.database)
            .with_volume(&volume, flavor.data_dir());
        let mut first = self.start_ready_instance(spec, resources, details).await?;

        let write = Query::statements([
            "CREATE TABLE items (id INT PRIMARY KEY, label VARCHAR(32));",
            "INSERT INTO items VALUES (42, 'hello');",
        ])
        .database(&inputs.database);
        self.run_client(&first, &root, &write, details).await?;

        resources
            .stop_instance(&mut first)
            .await
            .context("Failed to stop first instance")?;
        resources
            .remove_instance(&mut first)
            .await
            .context("Failed to remove first instance")?;
        info!(volume = volume, "First instance gone, restarting on the same volume");

        // The second instance finds an initialized data directory and skips
        // provisioning; the admin password comes from the stored data.
        let spec = self
            .base_spec(&format!("{}-second", scenario.test_name()), network, inputs)
            .with_volume(&volume, flavor.data_dir());
        let second = self.start_ready_instance(spec, resources, details).await?;

        let read = Query::new("SELECT id, label FROM items;").database(&inputs.database);
        let output = self.run_client(&second, &root, &read, details).await?;
        output
            .expect_text(PERSISTED_ROW)
            .context("Row did not survive the restart")?;

        Ok(())
    }

    /// Instance spec with a fresh name and the admin password set.
    fn base_spec(&self, test_name: &str, network: &str, inputs: &ScenarioInputs) -> InstanceSpec {
        InstanceSpec::new(generate_test_name("test", test_name), &self.config.image)
            .with_network(network)
            .with_env(self.config.flavor.root_password_var(), &inputs.root_password)
            .auto_remove(false)
    }

    async fn start_ready_instance(
        &self,
        spec: InstanceSpec,
        resources: &mut ScenarioResources,
        details: &mut TestDetails,
    ) -> Result<Instance> {
        info!(instance = spec.name, image = spec.image, "Starting instance");
        details.ready_observed = false;

        let mut instance = resources.start_instance(spec).await?;
        details.instance_started = true;
        details.instances.push(instance.name().to_string());

        let waited = self
            .probe
            .wait_until_ready(self.runtime.as_ref(), &mut instance)
            .await?;
        details.ready_observed = true;
        info!(
            instance = instance.name(),
            waited_ms = waited.as_millis() as u64,
            "Instance accepted connections"
        );

        Ok(instance)
    }

    async fn run_client(
        &self,
        instance: &Instance,
        credentials: &Credentials,
        query: &Query,
        details: &mut TestDetails,
    ) -> Result<QueryOutput> {
        let output = self.client.run(instance, credentials, query).await?;
        details.commands_run = true;
        Ok(output)
    }

    /// Clean up orphaned test resources older than specified hours
    pub async fn cleanup_orphaned_resources(&self, max_age_hours: u64) -> Result<Vec<String>> {
        self.cleanup.cleanup_orphaned_resources(max_age_hours).await
    }
}

#[cfg(test)]
#[path = "test_runner_tests.rs"]
mod tests;
