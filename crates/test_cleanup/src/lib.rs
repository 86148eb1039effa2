//! Leftover test resource cleanup utilities.
//!
//! Scenario guards release what they create, but an interrupted run (a
//! killed CI job, a crashed runner) can leave containers, volumes and
//! networks behind. This crate finds those leftovers by the harness label
//! and the naming convention and removes them. It can be used both
//! programmatically (from the runner) and via CLI binaries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use container_harness::{InstanceId, MANAGED_LABEL, ResourceKind, ResourceSummary, SharedRuntime};
use std::env;
use tracing::{debug, info, warn};

/// Configuration for cleanup operations loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Minimum age in hours for a resource to count as orphaned
    pub max_age_hours: u64,
}

impl CleanupConfig {
    /// Load cleanup configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `CLEANUP_MAX_AGE_HOURS`: minimum resource age (default 1)
    pub fn from_env() -> Result<Self> {
        let max_age_hours = match env::var("CLEANUP_MAX_AGE_HOURS") {
            Ok(value) => value
                .parse::<u64>()
                .context("CLEANUP_MAX_AGE_HOURS must be a valid number")?,
            Err(_) => 1,
        };

        Ok(Self { max_age_hours })
    }
}

/// Cleanup operations for leftover test resources.
pub struct ResourceCleanup {
    runtime: SharedRuntime,
}

impl ResourceCleanup {
    pub fn new(runtime: SharedRuntime) -> Self {
        Self { runtime }
    }

    /// Check if a resource name matches the test naming convention.
    pub fn is_test_resource(name: &str) -> bool {
        test_utils::is_test_resource(name)
    }

    /// Find and delete labelled test resources older than `max_age_hours`.
    ///
    /// A zero age removes every labelled test resource regardless of age.
    pub async fn cleanup_orphaned_resources(&self, max_age_hours: u64) -> Result<Vec<String>> {
        self.cleanup_resources_internal(max_age_hours, None).await
    }

    /// Find and delete test resources created by a specific PR, regardless
    /// of age.
    pub async fn cleanup_pr_resources(&self, pr_number: u32) -> Result<Vec<String>> {
        self.cleanup_resources_internal(0, Some(pr_number)).await
    }

    async fn cleanup_resources_internal(
        &self,
        max_age_hours: u64,
        pr_number: Option<u32>,
    ) -> Result<Vec<String>> {
        match pr_number {
            Some(pr) => info!(pr_number = pr, "Searching for test resources from PR {}", pr),
            None => info!(
                max_age_hours = max_age_hours,
                "Searching for orphaned test resources"
            ),
        }

        let cutoff_time = age_cutoff(max_age_hours);

        let mut candidates = self
            .runtime
            .list_resources(MANAGED_LABEL)
            .await
            .context("Failed to list labelled resources")?;

        // Containers hold volumes and networks, so they go first.
        candidates.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));

        let mut deleted = Vec::new();
        for resource in candidates {
            if !Self::is_test_resource(&resource.name) {
                debug!(name = resource.name, "Skipping labelled resource with foreign name");
                continue;
            }

            if let Some(pr) = pr_number {
                let pr_pattern = format!("-pr{}-", pr);
                if !resource.name.contains(&pr_pattern) {
                    continue;
                }
            } else if max_age_hours > 0 {
                // Unknown creation time counts as new.
                let old_enough = matches!(
                    resource.created_at,
                    Some(created_at) if created_at < cutoff_time
                );
                if !old_enough {
                    debug!(
                        name = resource.name,
                        created_at = ?resource.created_at,
                        "Resource is too new, skipping"
                    );
                    continue;
                }
            }

            if self.delete_resource(&resource).await.is_ok() {
                deleted.push(resource.name);
            }
        }

        info!(deleted_count = deleted.len(), "Cleanup completed");
        Ok(deleted)
    }

    /// Delete one resource.
    ///
    /// Best effort: a failure is logged and returned, and does not stop the
    /// caller from moving on to the next resource.
    pub async fn delete_resource(&self, resource: &ResourceSummary) -> Result<()> {
        info!(kind = ?resource.kind, name = resource.name, "Deleting resource");

        let result = match resource.kind {
            ResourceKind::Container => {
                self.runtime
                    .remove_instance(&InstanceId::new(resource.id.clone()))
                    .await
            }
            ResourceKind::Volume => self.runtime.remove_volume(&resource.id).await,
            ResourceKind::Network => self.runtime.remove_network(&resource.id).await,
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    kind = ?resource.kind,
                    name = resource.name,
                    error = %err,
                    "Failed to delete resource"
                );
                Err(err).context(format!("Failed to delete {}", resource.name))
            }
        }
    }
}

/// Initialize logging for cleanup operations.
///
/// Sets up tracing with appropriate formatting for CLI use.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Creation time before which a resource counts as orphaned.
///
/// Ages too large to represent leave nothing old enough to delete.
fn age_cutoff(max_age_hours: u64) -> DateTime<Utc> {
    i64::try_from(max_age_hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
