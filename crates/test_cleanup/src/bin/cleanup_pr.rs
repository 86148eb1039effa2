//! Cleanup test resources created by a specific PR.
//!
//! Removes every harness-labelled container, volume and network whose name
//! carries the PR's context segment. Meant to run when a PR is closed.
//!
//! Usage:
//!   cleanup-pr <pr_number>

use std::env;
use std::sync::Arc;

use anyhow::Context;
use container_harness::DockerRuntime;
use test_cleanup::ResourceCleanup;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    test_cleanup::init_logging();

    let pr_number: u32 = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .context("Usage: cleanup-pr <pr_number>")?;

    println!("🧹 Database Image PR-Based Test Resource Cleanup");
    println!("================================================");
    println!();
    println!("📋 Configuration:");
    println!("   PR Number: #{}", pr_number);
    println!();

    let runtime = Arc::new(DockerRuntime::connect().await?);
    let cleanup = ResourceCleanup::new(runtime);

    println!("🔍 Searching for test resources from PR #{}...", pr_number);
    let deleted = cleanup.cleanup_pr_resources(pr_number).await?;

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
        println!("   No resources found for PR #{}", pr_number);
    }

    Ok(())
}
