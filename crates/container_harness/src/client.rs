//! SQL client invocation.
//!
//! Statements are piped into the image's own command-line client, executed
//! inside the instance. The client runs in batch mode, so results come back
//! as tab-delimited rows, one per line, with an optional header row.
//!
//! The password is passed on the client command line. The client answers
//! that with a fixed warning on stderr, which is expected noise and removed
//! from the captured output by exact line match.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::config::ServerFlavor;
use crate::errors::{Error, HarnessResult};
use crate::instance::Instance;
use crate::runtime::{ExecRequest, SharedRuntime};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Environment variable carrying the statements into the exec'd shell.
pub const SQL_ENV_VAR: &str = "HARNESS_SQL";

/// Output lines that are dropped before any assertion sees the output.
pub const BENIGN_WARNINGS: &[&str] = &[
    "mysql: [Warning] Using a password on the command line interface can be insecure.",
    "mariadb: [Warning] Using a password on the command line interface can be insecure.",
    "Warning: Using a password on the command line interface can be insecure.",
];

/// Remove benign warning lines from client output.
///
/// Lines are compared exactly (ignoring a trailing carriage return). Every
/// kept line is terminated with a newline.
pub fn filter_benign_warnings(output: &str) -> String {
    let mut filtered = String::with_capacity(output.len());
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if BENIGN_WARNINGS.contains(&line) {
            continue;
        }
        filtered.push_str(line);
        filtered.push('\n');
    }
    filtered
}

/// Account used to connect to an instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Statements to run in one client invocation.
#[derive(Debug, Clone)]
pub struct Query {
    /// Newline-separated SQL statements.
    pub sql: String,
    pub database: Option<String>,
    /// Keep the column header row in the output.
    pub with_header: bool,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            database: None,
            with_header: false,
        }
    }

    /// Build a query from individual statements, one per line.
    pub fn statements<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let sql = statements
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(sql)
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_header(mut self) -> Self {
        self.with_header = true;
        self
    }
}

/// Filtered textual output of a client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutput {
    text: String,
    has_header: bool,
}

impl QueryOutput {
    pub fn new(text: impl Into<String>, has_header: bool) -> Self {
        Self {
            text: text.into(),
            has_header,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Non-empty output lines, header included.
    pub fn lines(&self) -> Vec<&str> {
        self.text.lines().filter(|line| !line.is_empty()).collect()
    }

    /// Column names, when the query asked for them.
    pub fn header(&self) -> Option<Vec<&str>> {
        if !self.has_header {
            return None;
        }
        self.lines()
            .first()
            .map(|line| line.split('\t').collect())
    }

    /// Data rows split on tabs, header excluded.
    pub fn rows(&self) -> Vec<Vec<&str>> {
        let skip = usize::from(self.has_header);
        self.lines()
            .into_iter()
            .skip(skip)
            .map(|line| line.split('\t').collect())
            .collect()
    }

    pub fn contains_line(&self, expected: &str) -> bool {
        self.lines().contains(&expected)
    }

    /// Fail unless some output line equals `expected` exactly.
    pub fn expect_line(&self, expected: &str) -> HarnessResult<()> {
        if self.contains_line(expected) {
            Ok(())
        } else {
            Err(Error::AssertionFailed {
                expected: expected.to_string(),
                actual: self.text.clone(),
            })
        }
    }

    /// Fail unless the output, without surrounding whitespace, equals
    /// `expected`.
    pub fn expect_text(&self, expected: &str) -> HarnessResult<()> {
        if self.text.trim() == expected {
            Ok(())
        } else {
            Err(Error::AssertionFailed {
                expected: expected.to_string(),
                actual: self.text.trim().to_string(),
            })
        }
    }
}

/// Runs SQL against ready instances through the image's client binary.
#[derive(Clone)]
pub struct SqlClient {
    runtime: SharedRuntime,
    flavor: ServerFlavor,
}

impl SqlClient {
    pub fn new(runtime: SharedRuntime, flavor: ServerFlavor) -> Self {
        Self { runtime, flavor }
    }

    /// Exec request that pipes `query` into the client.
    pub fn build_request(&self, credentials: &Credentials, query: &Query) -> ExecRequest {
        let mut cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("printf '%s\\n' \"${}\" | exec \"$@\"", SQL_ENV_VAR),
            "sh".to_string(),
            self.flavor.client_binary().to_string(),
            "--batch".to_string(),
            format!("--user={}", credentials.user),
            format!("-p{}", credentials.password),
        ];
        if !query.with_header {
            cmd.push("--skip-column-names".to_string());
        }
        if let Some(database) = &query.database {
            cmd.push(database.clone());
        }

        let mut env = BTreeMap::new();
        env.insert(SQL_ENV_VAR.to_string(), query.sql.clone());

        ExecRequest { cmd, env }
    }

    /// Run `query` against `instance` as `credentials`.
    ///
    /// The instance must be ready. A non-zero client exit status becomes
    /// [`Error::CommandFailed`] carrying the filtered output.
    pub async fn run(
        &self,
        instance: &Instance,
        credentials: &Credentials,
        query: &Query,
    ) -> HarnessResult<QueryOutput> {
        if !instance.is_ready() {
            return Err(Error::Configuration(format!(
                "instance '{}' is {} and cannot accept client commands",
                instance.name(),
                instance.state()
            )));
        }

        debug!(
            instance = instance.name(),
            user = credentials.user,
            database = query.database.as_deref(),
            statements = query.sql.lines().count(),
            "Running client command"
        );

        let request = self.build_request(credentials, query);
        let output = self.runtime.exec(instance.id(), &request).await?;
        let text = filter_benign_warnings(&output.output);

        if !output.is_success() {
            return Err(Error::CommandFailed {
                name: instance.name().to_string(),
                exit_code: output.exit_code,
                output: text,
            });
        }

        Ok(QueryOutput::new(text, query.with_header))
    }
}
