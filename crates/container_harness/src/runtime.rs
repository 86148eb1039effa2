//! Container runtime interface.
//!
//! The harness never talks to Docker directly outside of
//! [`crate::docker::DockerRuntime`]. Everything else goes through the
//! [`ContainerRuntime`] trait so the readiness poller, the client wrapper
//! and the scenario runner can be exercised against
//! [`crate::mock_runtime::MockRuntime`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::HarnessResult;
use crate::instance::InstanceId;

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

/// Label attached to every container, volume and network the harness creates.
pub const MANAGED_LABEL: &str = "dbimage.harness.managed";

/// Label carrying the identifier of the run that created a resource.
pub const RUN_LABEL: &str = "dbimage.harness.run";

/// Runtime shared between the runner, the resource guards and the client.
pub type SharedRuntime = Arc<dyn ContainerRuntime>;

/// Build the label set for a resource created during `run_id`.
pub fn harness_labels(run_id: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(RUN_LABEL.to_string(), run_id.to_string());
    labels
}

/// A named volume mounted into an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Volume name as known to the runtime.
    pub volume: String,
    /// Absolute path inside the container.
    pub target: String,
}

/// Everything needed to start one server instance.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub name: String,
    pub image: String,
    /// Configuration inputs passed to the server as environment variables.
    pub env: BTreeMap<String, String>,
    /// Network the instance joins.
    pub network: Option<String>,
    pub volume: Option<VolumeMount>,
    /// Let the runtime delete the container (and anonymous volumes) when it
    /// stops.
    pub auto_remove: bool,
    pub labels: BTreeMap<String, String>,
}

impl InstanceSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: BTreeMap::new(),
            network: None,
            volume: None,
            auto_remove: false,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>, target: impl Into<String>) -> Self {
        self.volume = Some(VolumeMount {
            volume: volume.into(),
            target: target.into(),
        });
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    /// Environment rendered as `KEY=VALUE` pairs in key order.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}

/// A command executed inside a running instance.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Captured result of an [`ExecRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    /// Standard output and standard error, merged in arrival order.
    pub output: String,
}

impl ExecOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Kind of runtime resource reported by [`ContainerRuntime::list_resources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    Container,
    Volume,
    Network,
}

/// A labelled resource found in the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub kind: ResourceKind,
    /// Identifier accepted by the matching `remove_*` call.
    pub id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Operations the harness needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_network(&self, name: &str, labels: &BTreeMap<String, String>)
        -> HarnessResult<()>;

    async fn remove_network(&self, name: &str) -> HarnessResult<()>;

    async fn create_volume(&self, name: &str, labels: &BTreeMap<String, String>)
        -> HarnessResult<()>;

    async fn remove_volume(&self, name: &str) -> HarnessResult<()>;

    /// Create and start an instance. Fails with
    /// [`crate::Error::StartupFailed`] when no usable handle comes back.
    async fn start_instance(&self, spec: &InstanceSpec) -> HarnessResult<InstanceId>;

    /// Full log output of the instance so far.
    async fn logs(&self, id: &InstanceId) -> HarnessResult<String>;

    async fn is_running(&self, id: &InstanceId) -> HarnessResult<bool>;

    async fn exec(&self, id: &InstanceId, request: &ExecRequest) -> HarnessResult<ExecOutput>;

    async fn stop_instance(&self, id: &InstanceId) -> HarnessResult<()>;

    async fn remove_instance(&self, id: &InstanceId) -> HarnessResult<()>;

    /// All containers, volumes and networks carrying `label`.
    async fn list_resources(&self, label: &str) -> HarnessResult<Vec<ResourceSummary>>;
}
