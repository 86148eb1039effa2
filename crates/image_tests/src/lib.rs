//! Scenario suite for containerized MySQL and MariaDB images.
//!
//! This library runs the image scenarios (admin-only startup, database
//! creation, user provisioning, database-only provisioning and data
//! persistence across a restart) through the container harness and turns
//! the outcome into reports.

pub mod report;
pub mod scenarios;
pub mod test_runner;
pub mod utils;

// Re-export commonly used types for convenience
pub use report::{generate_markdown_report, JsonReport};
pub use scenarios::{ScenarioInputs, TestScenario};
pub use test_runner::{FailureKind, ImageTestRunner, TestDetails, TestResult, PERSISTED_ROW};
pub use utils::{apply_overrides, init_logging};
