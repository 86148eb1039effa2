//! Harness for driving database server images in containers.
//!
//! This crate provides the pieces a database image test needs: a container
//! runtime abstraction with a Docker backend, instance lifecycle tracking,
//! log-based readiness polling, a wrapper around the image's SQL client,
//! and guards that release everything a scenario created.
//!
//! ```no_run
//! use std::sync::Arc;
//! use container_harness::{
//!     Credentials, DockerRuntime, HarnessConfig, InstanceSpec, Query, ReadinessProbe,
//!     ScenarioResources, SqlClient, harness_labels,
//! };
//!
//! # async fn example() -> container_harness::HarnessResult<()> {
//! let config = HarnessConfig::from_env()?;
//! let runtime = Arc::new(DockerRuntime::connect().await?);
//! let mut resources = ScenarioResources::new(runtime.clone(), harness_labels("local"));
//!
//! let spec = InstanceSpec::new("test-dbimage-example", &config.image)
//!     .with_env(config.flavor.root_password_var(), "secret");
//! let mut instance = resources.start_instance(spec).await?;
//! ReadinessProbe::from_config(&config)?
//!     .wait_until_ready(runtime.as_ref(), &mut instance)
//!     .await?;
//!
//! let client = SqlClient::new(runtime.clone(), config.flavor);
//! let output = client
//!     .run(&instance, &Credentials::new("root", "secret"), &Query::new("SHOW DATABASES;"))
//!     .await?;
//! output.expect_line("mysql")?;
//!
//! resources.release().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod docker;
pub mod errors;
pub mod guard;
pub mod instance;
pub mod mock_runtime;
pub mod readiness;
pub mod runtime;

pub use client::{Credentials, Query, QueryOutput, SqlClient, filter_benign_warnings};
pub use config::{HarnessConfig, ServerFlavor};
pub use docker::DockerRuntime;
pub use errors::{Error, HarnessResult};
pub use guard::{RunNetwork, ScenarioResources};
pub use instance::{Instance, InstanceId, InstanceState};
pub use readiness::ReadinessProbe;
pub use runtime::{
    ContainerRuntime, ExecOutput, ExecRequest, InstanceSpec, MANAGED_LABEL, RUN_LABEL,
    ResourceKind, ResourceSummary, SharedRuntime, harness_labels,
};
