//! Cleanup orphaned test containers, volumes and networks.
//!
//! This binary removes harness-labelled resources older than a specified
//! age. It's designed to be run from CI after a job was cancelled, or
//! manually on a developer machine.
//!
//! Usage:
//!   cleanup-orphans [max_age_hours]
//!
//! Optional environment variables:
//! - CLEANUP_MAX_AGE_HOURS: default age when no argument is given
//! - DOCKER_HOST: container runtime endpoint

use std::env;
use std::sync::Arc;

use container_harness::DockerRuntime;
use test_cleanup::{CleanupConfig, ResourceCleanup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    test_cleanup::init_logging();

    let config = CleanupConfig::from_env()?;

    // Command line wins over the environment
    let max_age_hours: u64 = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(config.max_age_hours);

    println!("🧹 Database Image Test Resource Cleanup");
    println!("=======================================");
    println!();
    println!("📋 Configuration:");
    println!("   Max age: {} hours", max_age_hours);
    println!();

    let runtime = Arc::new(DockerRuntime::connect().await?);
    let cleanup = ResourceCleanup::new(runtime);

    println!("🔍 Searching for orphaned test resources...");
    let deleted = cleanup.cleanup_orphaned_resources(max_age_hours).await?;

    println!();
    println!("✅ Cleanup completed!");
    println!("   Deleted {} resources", deleted.len());

    if !deleted.is_empty() {
        println!();
        println!("📋 Deleted resources:");
        for name in &deleted {
            println!("   - {}", name);
        }
    } else {
        println!("   No resources found older than {} hours", max_age_hours);
    }

    Ok(())
}
