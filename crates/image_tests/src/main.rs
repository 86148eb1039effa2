//! Image test runner.
//!
//! Runs the scenario suite against one database server image and writes a
//! report.
//!
//! ## Usage
//!
//! ```bash
//! # Run all scenarios against the default image
//! cargo run --bin image_tests
//!
//! # Run selected scenarios against MariaDB
//! cargo run --bin image_tests -- --image mariadb:11.4 --scenario persistent-volume
//!
//! # Remove leftovers from interrupted runs first
//! cargo run --bin image_tests -- --cleanup-orphans --max-age-hours 2
//! ```
//!
//! ## Environment Variables
//!
//! - `IMAGE_UNDER_TEST`: image reference (default `mysql:8.0`)
//! - `SERVER_FLAVOR`: `mysql` or `mariadb` (default: inferred from image)
//! - `READINESS_TIMEOUT_SECS`, `READINESS_POLL_MILLIS`, `READINESS_PATTERN`
//! - `RUST_LOG`: log filter (default `info`)

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use container_harness::{HarnessConfig, ServerFlavor};
use image_tests::report::write_report;
use image_tests::{
    apply_overrides, generate_markdown_report, init_logging, ImageTestRunner, JsonReport,
    TestScenario,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "image_tests",
    version,
    about = "Integration tests for containerized MySQL and MariaDB images"
)]
struct Args {
    /// Image reference under test (overrides IMAGE_UNDER_TEST)
    #[arg(long)]
    image: Option<String>,

    /// Server flavor (overrides SERVER_FLAVOR and inference from the image)
    #[arg(long)]
    flavor: Option<ServerFlavor>,

    /// Scenario to run; repeat to run several. Runs all when omitted
    #[arg(long = "scenario", value_enum)]
    scenarios: Vec<TestScenario>,

    /// Clean up orphaned test resources before running tests
    #[arg(long)]
    cleanup_orphans: bool,

    /// Maximum age in hours for orphaned resources
    #[arg(long, value_name = "HOURS", default_value_t = 1)]
    max_age_hours: u64,

    /// Only perform cleanup, don't run tests
    #[arg(long)]
    cleanup_only: bool,

    /// Where to write the Markdown report
    #[arg(long, value_name = "PATH", default_value = "image-test-report.md")]
    report: PathBuf,

    /// Also write a JSON report to this path
    #[arg(long, value_name = "PATH")]
    json_report: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_logging();

    let args = Args::parse();

    match run_image_tests(args).await {
        Ok(true) => info!("All image tests passed successfully"),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Image tests failed");
            process::exit(1);
        }
    }
}

/// Returns whether every scenario passed.
async fn run_image_tests(args: Args) -> Result<bool> {
    info!("Starting database image tests");

    let config = HarnessConfig::from_env().context("Failed to load harness configuration")?;
    let flavor_pinned = std::env::var("SERVER_FLAVOR").is_ok();
    let config = apply_overrides(config, args.image, args.flavor, flavor_pinned);

    info!(
        image = config.image,
        flavor = %config.flavor,
        readiness_timeout_secs = config.readiness_timeout.as_secs(),
        "Loaded harness configuration"
    );

    let runner = ImageTestRunner::connect(config)
        .await
        .context("Failed to initialize test runner")?;

    if args.cleanup_orphans || args.cleanup_only {
        info!(
            max_age_hours = args.max_age_hours,
            "Starting orphaned resource cleanup"
        );

        match runner.cleanup_orphaned_resources(args.max_age_hours).await {
            Ok(deleted) => {
                if deleted.is_empty() {
                    info!("No orphaned resources found for cleanup");
                } else {
                    info!(
                        count = deleted.len(),
                        resources = ?deleted,
                        "Successfully cleaned up orphaned resources"
                    );
                }
            }
            Err(e) => {
                // Leftovers from other runs never fail this one.
                warn!(error = %e, "Failed to cleanup orphaned resources");
            }
        }
    }

    if args.cleanup_only {
        info!("Cleanup completed, exiting as requested");
        return Ok(true);
    }

    let scenarios = if args.scenarios.is_empty() {
        TestScenario::all()
    } else {
        args.scenarios
    };

    let results = runner
        .run_scenarios(&scenarios)
        .await
        .context("Failed to run image tests")?;

    info!("=== Image Test Results ===");
    for result in &results {
        let status = if result.success { "PASS" } else { "FAIL" };
        info!(
            scenario = ?result.scenario,
            status = status,
            duration_ms = result.duration.as_millis() as u64,
            instance_started = result.details.instance_started,
            ready_observed = result.details.ready_observed,
            commands_run = result.details.commands_run,
            assertions_passed = result.details.assertions_passed,
            "Test result"
        );
        if let Some(error) = &result.error {
            error!(scenario = ?result.scenario, error = error, "Test failure details");
        }
    }

    let failed = results.iter().filter(|r| !r.success).count();
    info!(
        total = results.len(),
        passed = results.len() - failed,
        failed = failed,
        "=== Test Suite Summary ==="
    );

    let markdown = generate_markdown_report(&results, runner.config(), runner.run_id())?;
    write_report(&args.report, &markdown)?;

    if let Some(path) = &args.json_report {
        let json = JsonReport::new(&results, runner.config(), runner.run_id()).to_json()?;
        write_report(path, &json)?;
    }

    if failed > 0 {
        error!("Image test suite failed with {} failed tests", failed);
    }
    Ok(failed == 0)
}
