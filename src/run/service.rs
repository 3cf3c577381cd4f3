//! Main analysis service lifecycle.
//!
//! The service container is reused only when all of its observable state
//! matches what this run needs: the image, the workspace volume mapping,
//! and the set of linked analyzer containers. The link check compares
//! names only, not the linked containers' contents.

use super::log_streams;
use crate::docker::{ContainerRuntime, LOCAL_LOGS, SERVICE_CONTAINER};
use crate::rpc::ServiceClient;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How long to wait for the service to report healthy before giving up.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Ensures the analysis service container is running and healthy.
///
/// Returns the relative path from the container's workspace mount to
/// `abs_root`; empty when the container was (re)started mapped directly to
/// `abs_root`. A health-wait timeout is fatal to the whole run.
pub async fn ensure_service_running(
    runtime: &dyn ContainerRuntime,
    client: &dyn ServiceClient,
    image: &str,
    abs_root: &Path,
    analyzers: &[String],
    local_daemon: bool,
) -> Result<String> {
    let mapped = runtime.mapped_volume(abs_root, SERVICE_CONTAINER).await;
    let mut sub_path = mapped
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let reusable = runtime.image_matches(image, SERVICE_CONTAINER).await
        && mapped.is_some()
        && runtime.contains_links(SERVICE_CONTAINER, analyzers).await;

    if reusable {
        info!("reusing service container running {}", image);
    } else {
        info!("restarting service container with {}", image);
        let stopped = runtime.stop(SERVICE_CONTAINER, Duration::ZERO, true).await;
        if !stopped.is_ok() {
            debug!("failed to stop {} (may not be running)", SERVICE_CONTAINER);
        }
        let result = runtime
            .run_service(
                image,
                SERVICE_CONTAINER,
                abs_root,
                LOCAL_LOGS,
                analyzers,
                local_daemon,
            )
            .await;
        log_streams(&result);
        result
            .outcome
            .context("could not start the analysis service")?;
        sub_path.clear();
    }

    info!("image {} running in service mode", image);
    client
        .wait_until_ready(HEALTH_TIMEOUT)
        .await
        .context("analysis service did not become healthy")?;
    Ok(sub_path)
}
