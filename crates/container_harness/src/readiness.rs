//! Readiness polling.
//!
//! A server is considered ready only once its readiness signal shows up in
//! the log stream. The poller re-reads the logs at a fixed interval until
//! the pattern matches or a single timeout window closes. There is no
//! backoff: server boot is a one-shot event, so a flat interval bounds the
//! detection latency.

use std::time::Duration;

use regex::Regex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::HarnessConfig;
use crate::errors::{Error, HarnessResult};
use crate::instance::Instance;
use crate::runtime::ContainerRuntime;

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod tests;

/// Number of log lines attached to readiness errors.
pub const DIAGNOSTIC_LOG_LINES: usize = 20;

/// Last `count` lines of `logs`.
pub fn tail_lines(logs: &str, count: usize) -> String {
    let lines: Vec<&str> = logs.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Waits for an instance's readiness signal.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pattern: Regex,
    timeout: Duration,
    poll_interval: Duration,
}

impl ReadinessProbe {
    pub fn new(pattern: &str, timeout: Duration, poll_interval: Duration) -> HarnessResult<Self> {
        if poll_interval.is_zero() {
            return Err(Error::Configuration(
                "readiness poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            pattern: Regex::new(pattern)?,
            timeout,
            poll_interval,
        })
    }

    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        Self::new(
            config.effective_readiness_pattern(),
            config.readiness_timeout,
            config.poll_interval,
        )
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check a log snapshot for the readiness signal.
    pub fn is_signalled(&self, logs: &str) -> bool {
        self.pattern.is_match(logs)
    }

    /// Poll `instance` until it logs the readiness signal.
    ///
    /// Marks the instance ready and returns the time waited. Fails with
    /// [`Error::InstanceExited`] if the instance stops running first and
    /// with [`Error::ReadinessTimeout`] once the timeout elapses. Errors
    /// while reading logs are not fatal on their own; only the timeout ends
    /// the wait.
    pub async fn wait_until_ready(
        &self,
        runtime: &dyn ContainerRuntime,
        instance: &mut Instance,
    ) -> HarnessResult<Duration> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempt = 0u32;
        let mut last_logs = String::new();

        info!(
            instance = instance.name(),
            pattern = self.pattern(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Waiting for readiness signal"
        );

        loop {
            attempt += 1;

            match runtime.logs(instance.id()).await {
                Ok(logs) => {
                    if self.is_signalled(&logs) {
                        instance.mark_ready()?;
                        let waited = started.elapsed();
                        info!(
                            instance = instance.name(),
                            attempt = attempt,
                            waited_ms = waited.as_millis() as u64,
                            "✓ Instance is ready"
                        );
                        return Ok(waited);
                    }
                    last_logs = logs;
                }
                Err(e) => {
                    debug!(instance = instance.name(), attempt = attempt, error = %e, "Failed to read logs");
                }
            }

            match runtime.is_running(instance.id()).await {
                Ok(false) => {
                    warn!(instance = instance.name(), "Instance exited before becoming ready");
                    return Err(Error::InstanceExited {
                        name: instance.name().to_string(),
                        logs: tail_lines(&last_logs, DIAGNOSTIC_LOG_LINES),
                    });
                }
                Ok(true) => {}
                Err(e) => {
                    debug!(instance = instance.name(), error = %e, "Failed to inspect instance");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    instance = instance.name(),
                    attempts = attempt,
                    "Readiness signal not observed before timeout"
                );
                return Err(Error::ReadinessTimeout {
                    name: instance.name().to_string(),
                    pattern: self.pattern().to_string(),
                    timeout: self.timeout,
                    logs: tail_lines(&last_logs, DIAGNOSTIC_LOG_LINES),
                });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
