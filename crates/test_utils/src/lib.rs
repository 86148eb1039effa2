//! Test utilities for database image tests.
//!
//! This crate provides the naming convention shared by every resource the
//! suite creates, and the per-case credentials handed to server instances.

use chrono::Utc;
use std::env;
use uuid::Uuid;

/// Project segment embedded in every generated resource name.
pub const NAME_PROJECT: &str = "dbimage";

/// Prefixes accepted by [`generate_test_name`].
pub const TEST_PREFIXES: [&str; 2] = ["test", "e2e"];

/// Extract workflow context from GitHub Actions environment for resource naming.
///
/// Returns:
/// - `pr{number}` for pull request workflows (e.g., "pr123")
/// - `main` for pushes to main/master branch
/// - the sanitized branch name for other branch pushes
/// - `local` for local development
pub fn get_workflow_context() -> String {
    if let Ok(github_ref) = env::var("GITHUB_REF") {
        if let Some(rest) = github_ref.strip_prefix("refs/pull/") {
            if let Some(pr_num) = rest.split('/').next().filter(|n| !n.is_empty()) {
                return format!("pr{}", pr_num);
            }
        } else if let Some(branch) = github_ref.strip_prefix("refs/heads/") {
            if branch == "main" || branch == "master" {
                return "main".to_string();
            }
            return sanitize(branch);
        }
    }

    "local".to_string()
}

/// Lowercase `value` and replace anything a container runtime would reject
/// in a resource name with `-`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Generate a unique resource name following the naming convention.
///
/// Format: `{prefix}-dbimage-{context}-{timestamp}-{test-name}-{random}`
///
/// # Examples
///
/// ```
/// use test_utils::generate_test_name;
///
/// let name = generate_test_name("test", "root-only");
/// // Result: test-dbimage-local-20240108-120000-root-only-a1b2c3 (local)
/// // Result: test-dbimage-pr123-20240108-120000-root-only-a1b2c3 (in PR)
/// assert!(name.starts_with("test-dbimage-"));
/// ```
pub fn generate_test_name(prefix: &str, test_name: &str) -> String {
    let context = get_workflow_context();
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let random_suffix = &Uuid::new_v4().simple().to_string()[..6];
    format!(
        "{}-{}-{}-{}-{}-{}",
        prefix,
        NAME_PROJECT,
        context,
        timestamp,
        sanitize(test_name),
        random_suffix
    )
}

/// Generate a fresh secret for one test case.
///
/// 32 lowercase hex characters from a v4 UUID: unpredictable, and safe to
/// pass through environment variables and client command lines unquoted.
pub fn generate_credential() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate a short identifier for one run, used as a label value.
pub fn generate_run_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Check if a resource name matches the naming convention.
pub fn is_test_resource(name: &str) -> bool {
    TEST_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(&format!("{}-{}-", prefix, NAME_PROJECT)))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
