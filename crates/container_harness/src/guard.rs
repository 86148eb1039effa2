//! Scoped ownership of runtime resources.
//!
//! Everything a scenario creates is registered with a
//! [`ScenarioResources`] guard; the per-run network lives in a
//! [`RunNetwork`]. Both are released with a single explicit call on every
//! exit path. If a guard is dropped without being released (a panic, a
//! cancelled future) it schedules the same cleanup on the current tokio
//! runtime.
//!
//! Cleanup is best effort: failures are logged at `warn` and reported back
//! to the caller, never raised.

use std::collections::BTreeMap;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::errors::HarnessResult;
use crate::instance::{Instance, InstanceId};
use crate::runtime::{InstanceSpec, SharedRuntime};

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;

#[derive(Debug, Clone)]
struct TrackedInstance {
    id: InstanceId,
    name: String,
}

/// Instances and volumes owned by one scenario.
pub struct ScenarioResources {
    runtime: SharedRuntime,
    labels: BTreeMap<String, String>,
    instances: Vec<TrackedInstance>,
    volumes: Vec<String>,
    released: bool,
}

impl ScenarioResources {
    /// Create an empty guard. `labels` are added to every resource it
    /// creates.
    pub fn new(runtime: SharedRuntime, labels: BTreeMap<String, String>) -> Self {
        Self {
            runtime,
            labels,
            instances: Vec::new(),
            volumes: Vec::new(),
            released: false,
        }
    }

    pub fn runtime(&self) -> &SharedRuntime {
        &self.runtime
    }

    /// Create a named volume that lives until [`Self::release`].
    pub async fn create_volume(&mut self, name: &str) -> HarnessResult<()> {
        self.runtime.create_volume(name, &self.labels).await?;
        self.volumes.push(name.to_string());
        info!(volume = name, "Volume created");
        Ok(())
    }

    /// Start an instance and take ownership of its cleanup.
    pub async fn start_instance(&mut self, spec: InstanceSpec) -> HarnessResult<Instance> {
        let spec = spec.with_labels(self.labels.clone());
        let id = self.runtime.start_instance(&spec).await?;
        self.instances.push(TrackedInstance {
            id: id.clone(),
            name: spec.name.clone(),
        });
        Ok(Instance::started(id, spec.name, spec.env))
    }

    /// Stop an instance while keeping its container and volumes.
    pub async fn stop_instance(&mut self, instance: &mut Instance) -> HarnessResult<()> {
        self.runtime.stop_instance(instance.id()).await?;
        instance.mark_stopped()?;
        info!(instance = instance.name(), "Instance stopped");
        Ok(())
    }

    /// Remove an instance's container. Named volumes are kept.
    pub async fn remove_instance(&mut self, instance: &mut Instance) -> HarnessResult<()> {
        self.runtime.remove_instance(instance.id()).await?;
        instance.mark_removed()?;
        self.instances.retain(|tracked| &tracked.id != instance.id());
        debug!(instance = instance.name(), "Instance removed");
        Ok(())
    }

    /// Number of instances still owned by the guard.
    pub fn tracked_instances(&self) -> usize {
        self.instances.len()
    }

    /// Stop and remove every owned instance, then remove owned volumes.
    ///
    /// Returns a description of each step that failed. Safe to call when
    /// resources were only partially created.
    pub async fn release(mut self) -> Vec<String> {
        self.released = true;
        let instances = std::mem::take(&mut self.instances);
        let volumes = std::mem::take(&mut self.volumes);
        release_all(&self.runtime, instances, volumes).await
    }
}

async fn release_all(
    runtime: &SharedRuntime,
    instances: Vec<TrackedInstance>,
    volumes: Vec<String>,
) -> Vec<String> {
    let mut failures = Vec::new();

    for tracked in instances.iter().rev() {
        if let Err(e) = runtime.stop_instance(&tracked.id).await {
            warn!(instance = tracked.name, error = %e, "Failed to stop instance during cleanup");
            failures.push(format!("stop {}: {}", tracked.name, e));
        }
        if let Err(e) = runtime.remove_instance(&tracked.id).await {
            warn!(instance = tracked.name, error = %e, "Failed to remove instance during cleanup");
            failures.push(format!("remove {}: {}", tracked.name, e));
        }
    }

    // Volumes go last; a mounted volume cannot be removed.
    for volume in volumes.iter().rev() {
        if let Err(e) = runtime.remove_volume(volume).await {
            warn!(volume = volume, error = %e, "Failed to remove volume during cleanup");
            failures.push(format!("remove volume {}: {}", volume, e));
        }
    }

    if failures.is_empty() {
        debug!(
            instances = instances.len(),
            volumes = volumes.len(),
            "Scenario resources released"
        );
    }
    failures
}

impl Drop for ScenarioResources {
    fn drop(&mut self) {
        if self.released || (self.instances.is_empty() && self.volumes.is_empty()) {
            return;
        }

        let runtime = self.runtime.clone();
        let instances = std::mem::take(&mut self.instances);
        let volumes = std::mem::take(&mut self.volumes);

        match Handle::try_current() {
            Ok(handle) => {
                warn!(
                    instances = instances.len(),
                    volumes = volumes.len(),
                    "Scenario resources dropped without release, cleaning up in background"
                );
                handle.spawn(async move {
                    let _ = release_all(&runtime, instances, volumes).await;
                });
            }
            Err(_) => {
                warn!(
                    instances = instances.len(),
                    volumes = volumes.len(),
                    "Scenario resources dropped outside a tokio runtime; leaving them for orphan cleanup"
                );
            }
        }
    }
}

/// Network shared by every instance of one run.
pub struct RunNetwork {
    runtime: SharedRuntime,
    name: String,
    removed: bool,
}

impl RunNetwork {
    pub async fn create(
        runtime: SharedRuntime,
        name: impl Into<String>,
        labels: &BTreeMap<String, String>,
    ) -> HarnessResult<Self> {
        let name = name.into();
        runtime.create_network(&name, labels).await?;
        info!(network = name, "Run network created");
        Ok(Self {
            runtime,
            name,
            removed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the network. Failures are logged and returned, never raised.
    pub async fn remove(mut self) -> Option<String> {
        self.removed = true;
        match self.runtime.remove_network(&self.name).await {
            Ok(()) => {
                info!(network = self.name, "Run network removed");
                None
            }
            Err(e) => {
                warn!(network = self.name, error = %e, "Failed to remove run network");
                Some(format!("remove network {}: {}", self.name, e))
            }
        }
    }
}

impl Drop for RunNetwork {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let runtime = self.runtime.clone();
        let name = self.name.clone();
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                let _ = runtime.remove_network(&name).await;
            });
        } else {
            warn!(network = name, "Run network dropped outside a tokio runtime");
        }
    }
}
