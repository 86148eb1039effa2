//! Test reports for CI systems.
//!
//! A Markdown report for humans and an optional JSON report for tooling.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use container_harness::HarnessConfig;
use serde::Serialize;
use tracing::info;

use crate::scenarios::TestScenario;
use crate::test_runner::{FailureKind, TestDetails, TestResult};

fn mark(flag: bool) -> &'static str {
    if flag {
        "✅"
    } else {
        "❌"
    }
}

/// Render a Markdown report of `results`.
pub fn generate_markdown_report(
    results: &[TestResult],
    config: &HarnessConfig,
    run_id: &str,
) -> Result<String> {
    let mut report = Vec::new();

    writeln!(report, "# Database Image Test Report")?;
    writeln!(report)?;
    writeln!(
        report,
        "Generated: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(report)?;
    writeln!(report, "- **Image**: `{}`", config.image)?;
    writeln!(report, "- **Flavor**: {}", config.flavor)?;
    writeln!(report, "- **Run**: `{}`", run_id)?;
    writeln!(report)?;

    // Summary table
    writeln!(report, "## Summary")?;
    writeln!(report)?;
    writeln!(report, "| Metric | Value |")?;
    writeln!(report, "|--------|-------|")?;
    writeln!(report, "| Total Tests | {} |", results.len())?;
    writeln!(
        report,
        "| Passed | {} |",
        results.iter().filter(|r| r.success).count()
    )?;
    writeln!(
        report,
        "| Failed | {} |",
        results.iter().filter(|r| !r.success).count()
    )?;
    writeln!(
        report,
        "| Total Duration | {:.2}s |",
        results
            .iter()
            .map(|r| r.duration.as_secs_f64())
            .sum::<f64>()
    )?;
    writeln!(report)?;

    writeln!(report, "## Test Results")?;
    writeln!(report)?;

    for result in results {
        writeln!(
            report,
            "### {} {}",
            mark(result.success),
            result.scenario.title()
        )?;
        writeln!(report)?;
        writeln!(
            report,
            "- **Status**: {}",
            if result.success { "PASSED" } else { "FAILED" }
        )?;
        writeln!(
            report,
            "- **Duration**: {:.2}s",
            result.duration.as_secs_f64()
        )?;

        for instance in &result.details.instances {
            writeln!(report, "- **Instance**: {}", instance)?;
        }

        if let Some(kind) = &result.failure_kind {
            writeln!(report, "- **Failure Kind**: {:?}", kind)?;
        }
        if let Some(error) = &result.error {
            writeln!(report, "- **Error**:")?;
            writeln!(report)?;
            writeln!(report, "```text")?;
            writeln!(report, "{}", error.trim_end())?;
            writeln!(report, "```")?;
            writeln!(report)?;
        }

        writeln!(
            report,
            "- **Instance Started**: {}",
            mark(result.details.instance_started)
        )?;
        writeln!(
            report,
            "- **Ready Observed**: {}",
            mark(result.details.ready_observed)
        )?;
        writeln!(
            report,
            "- **Commands Run**: {}",
            mark(result.details.commands_run)
        )?;
        writeln!(
            report,
            "- **Assertions Passed**: {}",
            mark(result.details.assertions_passed)
        )?;

        if !result.cleanup_failures.is_empty() {
            writeln!(report, "- **Cleanup Warnings**:")?;
            for failure in &result.cleanup_failures {
                writeln!(report, "  - {}", failure)?;
            }
        }
        writeln!(report)?;
    }

    String::from_utf8(report).context("Report is not valid UTF-8")
}

/// Machine-readable view of a run.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub image: &'a str,
    pub flavor: String,
    pub run_id: &'a str,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<JsonResult<'a>>,
}

#[derive(Debug, Serialize)]
pub struct JsonResult<'a> {
    pub scenario: TestScenario,
    pub success: bool,
    pub duration_ms: u64,
    pub failure_kind: Option<FailureKind>,
    pub error: Option<&'a str>,
    pub details: &'a TestDetails,
    pub cleanup_failures: &'a [String],
}

impl<'a> JsonReport<'a> {
    pub fn new(results: &'a [TestResult], config: &'a HarnessConfig, run_id: &'a str) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            generated_at: Utc::now(),
            image: &config.image,
            flavor: config.flavor.to_string(),
            run_id,
            passed,
            failed: results.len() - passed,
            results: results
                .iter()
                .map(|r| JsonResult {
                    scenario: r.scenario,
                    success: r.success,
                    duration_ms: r.duration.as_millis() as u64,
                    failure_kind: r.failure_kind,
                    error: r.error.as_deref(),
                    details: &r.details,
                    cleanup_failures: &r.cleanup_failures,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize test report")
    }
}

/// Write `content` to `path`, logging where it went.
pub fn write_report(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write test report to {}", path.display()))?;
    info!(path = %path.display(), "Test report written");
    Ok(())
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
