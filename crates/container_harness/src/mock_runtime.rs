//! In-memory container runtime for tests.
//!
//! Records every call, serves scripted log output and scripted exec
//! responses, and can inject startup and cleanup failures. Tests build one
//! with the builder methods and then share it as a [`SharedRuntime`].
//!
//! [`SharedRuntime`]: crate::runtime::SharedRuntime

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{Error, HarnessResult};
use crate::instance::InstanceId;
use crate::runtime::{
    ContainerRuntime, ExecOutput, ExecRequest, InstanceSpec, MANAGED_LABEL, ResourceKind,
    ResourceSummary,
};

#[cfg(test)]
#[path = "mock_runtime_tests.rs"]
mod tests;

/// A call received by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateNetwork(String),
    RemoveNetwork(String),
    CreateVolume(String),
    RemoveVolume(String),
    StartInstance(String),
    Logs(String),
    Exec { instance: String, script: String },
    StopInstance(String),
    RemoveInstance(String),
}

#[derive(Debug)]
struct MockInstance {
    spec: InstanceSpec,
    running: bool,
    log_polls: usize,
    created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct MockResource {
    labels: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    instances: BTreeMap<String, MockInstance>,
    networks: BTreeMap<String, MockResource>,
    volumes: BTreeMap<String, MockResource>,
    boot_logs: String,
    ready_logs: String,
    ready_after_polls: Option<usize>,
    exit_after_polls: Option<usize>,
    exec_responses: Vec<(String, ExecOutput)>,
    start_failure: Option<String>,
    cleanup_fails: bool,
    calls: Vec<MockCall>,
}

/// Scriptable in-memory [`ContainerRuntime`].
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    /// A runtime whose instances log `boot_logs` and never become ready.
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.lock().boot_logs = "Initializing database files\n".to_string();
        runtime
    }

    /// Instances append `logs` to their output from the `polls`-th log read
    /// onwards (1-based). `polls == 1` means ready on the first read.
    pub fn with_ready_logs_after(self, polls: usize, logs: impl Into<String>) -> Self {
        {
            let mut state = self.lock();
            state.ready_after_polls = Some(polls.max(1));
            state.ready_logs = logs.into();
        }
        self
    }

    /// Instances report themselves as not running once their logs have been
    /// read `polls` times.
    pub fn with_exit_after_polls(self, polls: usize) -> Self {
        self.lock().exit_after_polls = Some(polls);
        self
    }

    /// Answer exec calls whose script contains `needle` with `output`.
    /// Earlier registrations win.
    pub fn respond_to(self, needle: impl Into<String>, output: ExecOutput) -> Self {
        self.lock().exec_responses.push((needle.into(), output));
        self
    }

    /// Make every `start_instance` call fail with `reason`.
    pub fn with_start_failure(self, reason: impl Into<String>) -> Self {
        self.lock().start_failure = Some(reason.into());
        self
    }

    /// Make every stop/remove call fail.
    pub fn with_cleanup_failures(self) -> Self {
        self.lock().cleanup_fails = true;
        self
    }

    /// Pre-populate a managed resource, as if left over by an earlier run.
    pub fn with_existing_resource(
        self,
        kind: ResourceKind,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        {
            let mut state = self.lock();
            let mut labels = BTreeMap::new();
            labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
            match kind {
                ResourceKind::Container => {
                    let spec = InstanceSpec::new(name.clone(), "leftover:latest").with_labels(labels);
                    state.instances.insert(
                        name,
                        MockInstance {
                            spec,
                            running: false,
                            log_polls: 0,
                            created_at,
                        },
                    );
                }
                ResourceKind::Volume => {
                    state.volumes.insert(name, MockResource { labels, created_at });
                }
                ResourceKind::Network => {
                    state.networks.insert(name, MockResource { labels, created_at });
                }
            }
        }
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Names of instances that still exist in the runtime.
    pub fn live_instances(&self) -> Vec<String> {
        self.lock()
            .instances
            .values()
            .map(|instance| instance.spec.name.clone())
            .collect()
    }

    pub fn networks(&self) -> BTreeSet<String> {
        self.lock().networks.keys().cloned().collect()
    }

    pub fn volumes(&self) -> BTreeSet<String> {
        self.lock().volumes.keys().cloned().collect()
    }

    /// Spec an instance was started with, looked up by name.
    pub fn started_spec(&self, name: &str) -> Option<InstanceSpec> {
        self.lock()
            .instances
            .values()
            .find(|instance| instance.spec.name == name)
            .map(|instance| instance.spec.clone())
    }

    /// Scripts passed to exec calls, in order.
    pub fn exec_scripts(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Exec { script, .. } => Some(script.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn injected_failure(what: &str) -> Error {
    Error::RuntimeUnavailable(format!("injected {} failure", what))
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> HarnessResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::CreateNetwork(name.to_string()));
        if state.networks.contains_key(name) {
            return Err(Error::RuntimeUnavailable(format!("network {} already exists", name)));
        }
        state.networks.insert(
            name.to_string(),
            MockResource {
                labels: labels.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::RemoveNetwork(name.to_string()));
        if state.cleanup_fails {
            return Err(injected_failure("network removal"));
        }
        state.networks.remove(name);
        Ok(())
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> HarnessResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::CreateVolume(name.to_string()));
        state
            .volumes
            .entry(name.to_string())
            .or_insert_with(|| MockResource {
                labels: labels.clone(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> HarnessResult<()> {
        let mut state = self.lock();
        state.calls.push(MockCall::RemoveVolume(name.to_string()));
        if state.cleanup_fails {
            return Err(injected_failure("volume removal"));
        }
        state.volumes.remove(name);
        Ok(())
    }

    async fn start_instance(&self, spec: &InstanceSpec) -> HarnessResult<InstanceId> {
        let mut state = self.lock();
        state.calls.push(MockCall::StartInstance(spec.name.clone()));

        let startup_failed = |reason: String| Error::StartupFailed {
            name: spec.name.clone(),
            reason,
        };

        if let Some(reason) = &state.start_failure {
            return Err(startup_failed(reason.clone()));
        }
        if state.instances.values().any(|i| i.spec.name == spec.name) {
            return Err(startup_failed(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        if let Some(network) = &spec.network {
            if !state.networks.contains_key(network) {
                return Err(startup_failed(format!("network {} not found", network)));
            }
        }
        if let Some(mount) = &spec.volume {
            state
                .volumes
                .entry(mount.volume.clone())
                .or_insert_with(|| MockResource {
                    labels: BTreeMap::new(),
                    created_at: Utc::now(),
                });
        }

        state.next_id += 1;
        let id = format!("mock-{:04}", state.next_id);
        state.instances.insert(
            id.clone(),
            MockInstance {
                spec: spec.clone(),
                running: true,
                log_polls: 0,
                created_at: Utc::now(),
            },
        );
        Ok(InstanceId::new(id))
    }

    async fn logs(&self, id: &InstanceId) -> HarnessResult<String> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let instance = state
            .instances
            .get_mut(id.as_str())
            .ok_or_else(|| Error::RuntimeUnavailable(format!("no such container: {}", id)))?;
        instance.log_polls += 1;
        let polls = instance.log_polls;
        let name = instance.spec.name.clone();
        state.calls.push(MockCall::Logs(name));

        let mut logs = state.boot_logs.clone();
        if state.ready_after_polls.is_some_and(|after| polls >= after) {
            logs.push_str(&state.ready_logs);
        }
        Ok(logs)
    }

    async fn is_running(&self, id: &InstanceId) -> HarnessResult<bool> {
        let state = self.lock();
        Ok(state.instances.get(id.as_str()).is_some_and(|instance| {
            instance.running
                && state
                    .exit_after_polls
                    .is_none_or(|after| instance.log_polls < after)
        }))
    }

    async fn exec(&self, id: &InstanceId, request: &ExecRequest) -> HarnessResult<ExecOutput> {
        let mut state = self.lock();
        let Some(instance) = state.instances.get(id.as_str()) else {
            return Err(Error::RuntimeUnavailable(format!("no such container: {}", id)));
        };
        let name = instance.spec.name.clone();

        let mut script = request.cmd.join(" ");
        for value in request.env.values() {
            script.push('\n');
            script.push_str(value);
        }

        state.calls.push(MockCall::Exec {
            instance: name,
            script: script.clone(),
        });

        Ok(state
            .exec_responses
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| ExecOutput::success("")))
    }

    async fn stop_instance(&self, id: &InstanceId) -> HarnessResult<()> {
        let mut state = self.lock();
        let name = state
            .instances
            .get(id.as_str())
            .map(|instance| instance.spec.name.clone())
            .unwrap_or_else(|| id.to_string());
        state.calls.push(MockCall::StopInstance(name));
        if state.cleanup_fails {
            return Err(injected_failure("stop"));
        }

        let auto_remove = match state.instances.get_mut(id.as_str()) {
            Some(instance) => {
                instance.running = false;
                instance.spec.auto_remove
            }
            None => false,
        };
        if auto_remove {
            state.instances.remove(id.as_str());
        }
        Ok(())
    }

    async fn remove_instance(&self, id: &InstanceId) -> HarnessResult<()> {
        let mut state = self.lock();
        let name = state
            .instances
            .get(id.as_str())
            .map(|instance| instance.spec.name.clone())
            .unwrap_or_else(|| id.to_string());
        state.calls.push(MockCall::RemoveInstance(name));
        if state.cleanup_fails {
            return Err(injected_failure("remove"));
        }
        state.instances.remove(id.as_str());
        Ok(())
    }

    async fn list_resources(&self, label: &str) -> HarnessResult<Vec<ResourceSummary>> {
        let state = self.lock();
        let mut resources = Vec::new();

        for (id, instance) in &state.instances {
            if instance.spec.labels.contains_key(label) {
                resources.push(ResourceSummary {
                    kind: ResourceKind::Container,
                    id: id.clone(),
                    name: instance.spec.name.clone(),
                    created_at: Some(instance.created_at),
                });
            }
        }
        for (kind, map) in [
            (ResourceKind::Volume, &state.volumes),
            (ResourceKind::Network, &state.networks),
        ] {
            for (name, resource) in map {
                if resource.labels.contains_key(label) {
                    resources.push(ResourceSummary {
                        kind,
                        id: name.clone(),
                        name: name.clone(),
                        created_at: Some(resource.created_at),
                    });
                }
            }
        }

        Ok(resources)
    }
}
