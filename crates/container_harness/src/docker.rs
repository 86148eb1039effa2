//! Docker implementation of [`ContainerRuntime`].
//!
//! Talks to the local Docker daemon through bollard. Removal calls treat
//! "not found" and "not modified" responses as success so cleanup can be
//! repeated safely after a partial failure.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions, RemoveVolumeOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::{Error, HarnessResult};
use crate::instance::InstanceId;
use crate::runtime::{
    ContainerRuntime, ExecOutput, ExecRequest, InstanceSpec, ResourceKind, ResourceSummary,
};

/// Seconds the daemon waits for a graceful shutdown before killing.
const STOP_GRACE_SECONDS: i64 = 5;

/// Container runtime backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon using the local defaults (socket or
    /// `DOCKER_HOST`) and verify it answers.
    pub async fn connect() -> HarnessResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;

        debug!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Pull `image` unless it is already present locally.
    async fn ensure_image(&self, image: &str) -> HarnessResult<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image = image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(status) = progress.status {
                debug!(image = image, status = status, "Pull progress");
            }
        }
        info!(image = image, "✓ Image pulled");
        Ok(())
    }

    /// Best effort removal of a container that was created but never started.
    async fn discard_container(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            debug!(container = id, error = %e, "Failed to discard container");
        }
    }

    async fn wait_for_exec_exit(&self, exec_id: &str) -> HarnessResult<i64> {
        // The output stream can close a moment before the daemon records the
        // exit code.
        for _ in 0..20 {
            let inspect = self.docker.inspect_exec(exec_id).await?;
            if inspect.running != Some(true) {
                return Ok(inspect.exit_code.unwrap_or(-1));
            }
            sleep(Duration::from_millis(50)).await;
        }
        Ok(-1)
    }
}

fn label_map(labels: &BTreeMap<String, String>) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn label_filter(label: &str) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert("label".to_string(), vec![label.to_string()]);
    filters
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|v| v.with_timezone(&Utc))
}

/// True for responses that mean the resource is already in the desired
/// state: gone (404) or already stopped (304).
fn is_already_done(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404 | 304,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> HarnessResult<()> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            labels: label_map(labels),
            ..Default::default()
        };
        self.docker.create_network(options).await?;
        debug!(network = name, "Network created");
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> HarnessResult<()> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if is_already_done(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_volume(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> HarnessResult<()> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            driver: "local".to_string(),
            labels: label_map(labels),
            ..Default::default()
        };
        self.docker.create_volume(options).await?;
        debug!(volume = name, "Volume created");
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> HarnessResult<()> {
        match self
            .docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_already_done(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn start_instance(&self, spec: &InstanceSpec) -> HarnessResult<InstanceId> {
        let startup_failed = |reason: String| Error::StartupFailed {
            name: spec.name.clone(),
            reason,
        };

        self.ensure_image(&spec.image)
            .await
            .map_err(|e| startup_failed(e.to_string()))?;

        let host_config = bollard::service::HostConfig {
            network_mode: spec.network.clone(),
            binds: spec
                .volume
                .as_ref()
                .map(|mount| vec![format!("{}:{}", mount.volume, mount.target)]),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_pairs()),
            labels: Some(label_map(&spec.labels)),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.as_str(),
                    ..Default::default()
                }),
                container_config,
            )
            .await
            .map_err(|e| startup_failed(e.to_string()))?;

        if created.id.is_empty() {
            return Err(startup_failed("runtime returned an empty container id".to_string()));
        }

        for warning in &created.warnings {
            warn!(instance = spec.name, warning = warning, "Container create warning");
        }

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            self.discard_container(&created.id).await;
            return Err(startup_failed(e.to_string()));
        }

        info!(instance = spec.name, container_id = created.id, "Container started");
        Ok(InstanceId::new(created.id))
    }

    async fn logs(&self, id: &InstanceId) -> HarnessResult<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(id.as_str(), Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?.to_string());
        }
        Ok(output)
    }

    async fn is_running(&self, id: &InstanceId) -> HarnessResult<bool> {
        match self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(inspect
                .state
                .and_then(|state| state.running)
                .unwrap_or(false)),
            // Auto-removed containers vanish as soon as they exit.
            Err(e) if is_already_done(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, id: &InstanceId, request: &ExecRequest) -> HarnessResult<ExecOutput> {
        let env: Vec<String> = request
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();

        let exec = self
            .docker
            .create_exec(
                id.as_str(),
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(request.cmd.clone()),
                    env: Some(env),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = String::new();
        if let StartExecResults::Attached { output: mut stream, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = stream.next().await {
                output.push_str(&chunk?.to_string());
            }
        }

        let exit_code = self.wait_for_exec_exit(&exec.id).await?;
        Ok(ExecOutput { exit_code, output })
    }

    async fn stop_instance(&self, id: &InstanceId) -> HarnessResult<()> {
        match self
            .docker
            .stop_container(
                id.as_str(),
                Some(StopContainerOptions {
                    t: STOP_GRACE_SECONDS,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_already_done(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_instance(&self, id: &InstanceId) -> HarnessResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(id.as_str(), Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_already_done(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_resources(&self, label: &str) -> HarnessResult<Vec<ResourceSummary>> {
        let mut resources = Vec::new();

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters: label_filter(label),
                ..Default::default()
            }))
            .await?;
        for container in containers {
            let Some(id) = container.id else { continue };
            let name = container
                .names
                .and_then(|names| names.into_iter().next())
                .map(|name| name.trim_start_matches('/').to_string())
                .unwrap_or_else(|| id.clone());
            resources.push(ResourceSummary {
                kind: ResourceKind::Container,
                id,
                name,
                created_at: container
                    .created
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
            });
        }

        let volumes = self
            .docker
            .list_volumes(Some(ListVolumesOptions::<String> {
                filters: label_filter(label),
            }))
            .await?;
        for volume in volumes.volumes.unwrap_or_default() {
            resources.push(ResourceSummary {
                kind: ResourceKind::Volume,
                id: volume.name.clone(),
                created_at: parse_timestamp(volume.created_at.as_deref()),
                name: volume.name,
            });
        }

        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions::<String> {
                filters: label_filter(label),
            }))
            .await?;
        for network in networks {
            let Some(name) = network.name else { continue };
            resources.push(ResourceSummary {
                kind: ResourceKind::Network,
                id: name.clone(),
                name,
                created_at: parse_timestamp(network.created.as_deref()),
            });
        }

        Ok(resources)
    }
}
