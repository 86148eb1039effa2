//! Harness configuration.
//!
//! Describes the image under test and how its readiness is judged. Values
//! come from environment variables so CI can point the suite at a freshly
//! built tag without code changes; the binaries let flags override them.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{Error, HarnessResult};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

pub const DEFAULT_IMAGE: &str = "mysql:8.0";
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Database server family the image belongs to.
///
/// The two families share a wire protocol and data layout but differ in the
/// names of their configuration inputs and client binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFlavor {
    Mysql,
    Mariadb,
}

impl ServerFlavor {
    /// Guess the flavor from an image reference such as `mariadb:11`.
    pub fn infer_from_image(image: &str) -> Self {
        let repository = image.rsplit('/').next().unwrap_or(image);
        if repository.to_lowercase().starts_with("mariadb") {
            ServerFlavor::Mariadb
        } else {
            ServerFlavor::Mysql
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            ServerFlavor::Mysql => "MYSQL_",
            ServerFlavor::Mariadb => "MARIADB_",
        }
    }

    /// Configuration input for the admin credential.
    pub fn root_password_var(self) -> String {
        format!("{}ROOT_PASSWORD", self.env_prefix())
    }

    /// Configuration input for the database created at startup.
    pub fn database_var(self) -> String {
        format!("{}DATABASE", self.env_prefix())
    }

    /// Configuration input for the non-admin user created at startup.
    pub fn user_var(self) -> String {
        format!("{}USER", self.env_prefix())
    }

    pub fn password_var(self) -> String {
        format!("{}PASSWORD", self.env_prefix())
    }

    pub fn client_binary(self) -> &'static str {
        match self {
            ServerFlavor::Mysql => "mysql",
            ServerFlavor::Mariadb => "mariadb",
        }
    }

    pub fn admin_user(self) -> &'static str {
        "root"
    }

    pub fn data_dir(self) -> &'static str {
        "/var/lib/mysql"
    }

    /// Database present on every freshly initialized server.
    pub fn system_database(self) -> &'static str {
        "mysql"
    }

    /// Log pattern emitted once the server accepts TCP connections.
    ///
    /// Both families log "ready for connections" twice: once for the
    /// temporary socket-only server used during initialization and once for
    /// the real one. Only the latter reports port 3306; the word boundary
    /// keeps the X protocol port (33060) from matching.
    pub fn default_readiness_pattern(self) -> &'static str {
        "(?s)ready for connections.*port: 3306\\b"
    }
}

impl fmt::Display for ServerFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerFlavor::Mysql => f.write_str("mysql"),
            ServerFlavor::Mariadb => f.write_str("mariadb"),
        }
    }
}

impl FromStr for ServerFlavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(ServerFlavor::Mysql),
            "mariadb" => Ok(ServerFlavor::Mariadb),
            other => Err(Error::Configuration(format!(
                "unknown server flavor '{}', expected 'mysql' or 'mariadb'",
                other
            ))),
        }
    }
}

/// Settings shared by every scenario in a run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Image reference under test.
    pub image: String,
    pub flavor: ServerFlavor,
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
    /// Overrides the flavor's default readiness pattern.
    pub readiness_pattern: Option<String>,
}

impl HarnessConfig {
    /// Configuration for `image` with defaults for everything else.
    pub fn for_image(image: impl Into<String>) -> Self {
        let image = image.into();
        let flavor = ServerFlavor::infer_from_image(&image);
        Self {
            image,
            flavor,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            readiness_pattern: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Recognized variables:
    /// - `IMAGE_UNDER_TEST`: image reference (default `mysql:8.0`)
    /// - `SERVER_FLAVOR`: `mysql` or `mariadb` (default: inferred from image)
    /// - `READINESS_TIMEOUT_SECS`: readiness bound in seconds (default 120)
    /// - `READINESS_POLL_MILLIS`: poll interval in milliseconds (default 500)
    /// - `READINESS_PATTERN`: regular expression replacing the default pattern
    pub fn from_env() -> HarnessResult<Self> {
        let image = env::var("IMAGE_UNDER_TEST").unwrap_or_else(|_| DEFAULT_IMAGE.to_string());
        let mut config = Self::for_image(image);

        if let Ok(flavor) = env::var("SERVER_FLAVOR") {
            config.flavor = flavor.parse()?;
        }

        if let Ok(secs) = env::var("READINESS_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::Configuration(format!("READINESS_TIMEOUT_SECS must be a number, got '{}'", secs))
            })?;
            config.readiness_timeout = Duration::from_secs(secs);
        }

        if let Ok(millis) = env::var("READINESS_POLL_MILLIS") {
            let millis: u64 = millis.parse().map_err(|_| {
                Error::Configuration(format!(
                    "READINESS_POLL_MILLIS must be a number, got '{}'",
                    millis
                ))
            })?;
            config.poll_interval = Duration::from_millis(millis);
        }

        config.readiness_pattern = env::var("READINESS_PATTERN").ok().filter(|p| !p.is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Pattern used by the readiness poller.
    pub fn effective_readiness_pattern(&self) -> &str {
        self.readiness_pattern
            .as_deref()
            .unwrap_or_else(|| self.flavor.default_readiness_pattern())
    }

    /// Reject settings that would make polling meaningless.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.image.trim().is_empty() {
            return Err(Error::Configuration("image reference is empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration(
                "readiness poll interval must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval >= self.readiness_timeout {
            return Err(Error::Configuration(format!(
                "readiness poll interval ({:?}) must be shorter than the timeout ({:?})",
                self.poll_interval, self.readiness_timeout
            )));
        }
        regex::Regex::new(self.effective_readiness_pattern())?;
        Ok(())
    }
}
