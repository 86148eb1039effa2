//! Utility functions for the image test binary.

use container_harness::{HarnessConfig, ServerFlavor};

/// Initialize logging for image tests.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Apply command line overrides on top of an environment-derived config.
///
/// An explicit flavor always wins. Otherwise a new image re-infers the
/// flavor, unless `flavor_pinned` says the environment already chose one.
pub fn apply_overrides(
    mut config: HarnessConfig,
    image: Option<String>,
    flavor: Option<ServerFlavor>,
    flavor_pinned: bool,
) -> HarnessConfig {
    if let Some(image) = image {
        if !flavor_pinned {
            config.flavor = ServerFlavor::infer_from_image(&image);
        }
        config.image = image;
    }
    if let Some(flavor) = flavor {
        config.flavor = flavor;
    }
    config
}

#[cfg(test)]
#[path = "utils_tests.rs"]
mod tests;
