//! Tests for test utilities.

use super::*;
use serial_test::serial;
use std::collections::HashSet;

#[test]
fn test_generate_test_name() {
    let name = generate_test_name("test", "basic");
    assert!(name.starts_with("test-dbimage-"));
    assert!(name.contains("-basic-"));
    // Should include context, timestamp, test name, and random suffix
    assert!(name.len() > 35);
}

#[test]
fn test_generate_e2e_name() {
    let name = generate_test_name("e2e", "persistence");
    assert!(name.starts_with("e2e-dbimage-"));
    assert!(name.contains("-persistence-"));
}

#[test]
fn test_generated_names_are_runtime_safe() {
    let name = generate_test_name("test", "User And DB");
    assert!(name.contains("-user-and-db-"));
    assert!(
        name.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_.".contains(c))
    );
}

#[test]
fn test_generated_names_do_not_collide() {
    let names: HashSet<String> = (0..50).map(|_| generate_test_name("test", "x")).collect();
    assert_eq!(names.len(), 50);
}

#[test]
fn test_generate_credential() {
    let first = generate_credential();
    let second = generate_credential();
    assert_eq!(first.len(), 32);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(first, second);
}

#[test]
fn test_generate_run_id() {
    let id = generate_run_id();
    assert_eq!(id.len(), 14 + 1 + 8);
    assert_ne!(id, generate_run_id());
}

#[test]
fn test_sanitize() {
    assert_eq!(sanitize("feature/New Thing"), "feature-new-thing");
    assert_eq!(sanitize("release_1.2"), "release_1.2");
}

#[test]
fn test_is_test_resource() {
    assert!(is_test_resource("test-dbimage-local-20240101-000000-basic-abc123"));
    assert!(is_test_resource("e2e-dbimage-pr12-net"));
    assert!(!is_test_resource("test-dbimage"));
    assert!(!is_test_resource("dbimage-test-local"));
    assert!(!is_test_resource("Test-dbimage-local"));
    assert!(!is_test_resource(""));
}

#[test]
#[serial]
fn test_get_workflow_context_pr() {
    unsafe {
        std::env::set_var("GITHUB_REF", "refs/pull/456/merge");
    }
    let context = get_workflow_context();
    assert_eq!(context, "pr456");
    unsafe {
        std::env::remove_var("GITHUB_REF");
    }
}

#[test]
#[serial]
fn test_get_workflow_context_main_branch() {
    unsafe {
        std::env::set_var("GITHUB_REF", "refs/heads/main");
    }
    let context = get_workflow_context();
    assert_eq!(context, "main");
    unsafe {
        std::env::remove_var("GITHUB_REF");
    }
}

#[test]
#[serial]
fn test_get_workflow_context_master_branch() {
    unsafe {
        std::env::set_var("GITHUB_REF", "refs/heads/master");
    }
    let context = get_workflow_context();
    assert_eq!(context, "main");
    unsafe {
        std::env::remove_var("GITHUB_REF");
    }
}

#[test]
#[serial]
fn test_get_workflow_context_feature_branch() {
    unsafe {
        std::env::set_var("GITHUB_REF", "refs/heads/feature/New-Feature");
    }
    let context = get_workflow_context();
    assert_eq!(context, "feature-new-feature");
    unsafe {
        std::env::remove_var("GITHUB_REF");
    }
}

#[test]
#[serial]
fn test_get_workflow_context_local() {
    unsafe {
        std::env::remove_var("GITHUB_REF");
    }
    let context = get_workflow_context();
    assert_eq!(context, "local");
}
