//! Scenario catalogue.
//!
//! Each scenario starts one or more server instances with a particular set
//! of configuration inputs and checks one observable property of the image.

use std::fmt;

use serde::Serialize;
use test_utils::generate_credential;

/// Test scenario definitions, one per property of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TestScenario {
    /// Only the admin password is set; the system database must be listed
    RootPasswordOnly,
    /// Admin creates a database; the listing must show its exact name
    CreateDatabase,
    /// Non-admin user and database provisioned at startup
    UserAndDatabase,
    /// Database provisioned at startup without a user
    DatabaseOnly,
    /// Data written by one instance is read back by a second instance on
    /// the same volume
    PersistentVolume,
}

impl TestScenario {
    /// Every scenario, in execution order.
    pub fn all() -> Vec<TestScenario> {
        vec![
            TestScenario::RootPasswordOnly,
            TestScenario::CreateDatabase,
            TestScenario::UserAndDatabase,
            TestScenario::DatabaseOnly,
            TestScenario::PersistentVolume,
        ]
    }

    /// Get the test name used for resource naming
    pub fn test_name(&self) -> &'static str {
        match self {
            TestScenario::RootPasswordOnly => "root-password-only",
            TestScenario::CreateDatabase => "create-database",
            TestScenario::UserAndDatabase => "user-and-database",
            TestScenario::DatabaseOnly => "database-only",
            TestScenario::PersistentVolume => "persistent-volume",
        }
    }

    /// Human readable title for reports.
    pub fn title(&self) -> &'static str {
        match self {
            TestScenario::RootPasswordOnly => "Admin Password Only",
            TestScenario::CreateDatabase => "Database Creation",
            TestScenario::UserAndDatabase => "User And Database Provisioning",
            TestScenario::DatabaseOnly => "Database Provisioning Without User",
            TestScenario::PersistentVolume => "Data Persistence Across Restart",
        }
    }

    /// Whether the scenario needs a named volume.
    pub fn uses_volume(&self) -> bool {
        matches!(self, TestScenario::PersistentVolume)
    }
}

impl fmt::Display for TestScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.test_name())
    }
}

/// Configuration inputs for one test case.
///
/// Every value is fresh per case so that no two cases can collide or guess
/// each other's secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct ScenarioInputs {
    pub root_password: String,
    pub user: String,
    pub user_password: String,
    pub database: String,
}

impl ScenarioInputs {
    /// Generate unpredictable inputs.
    ///
    /// Names are kept short: MySQL user names are limited to 32 characters.
    pub fn generate() -> Self {
        Self {
            root_password: generate_credential(),
            user: format!("user_{}", &generate_credential()[..12]),
            user_password: generate_credential(),
            database: format!("db_{}", &generate_credential()[..12]),
        }
    }
}

impl fmt::Debug for ScenarioInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioInputs")
            .field("root_password", &"<redacted>")
            .field("user", &self.user)
            .field("user_password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[cfg(test)]
#[path = "scenarios_tests.rs"]
mod tests;
