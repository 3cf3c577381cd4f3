//! Analyzer fleet bring-up.
//!
//! All requested analyzers start concurrently. A container that is already
//! running the right image is reused as-is; anything else is stopped (it
//! may simply not exist, which is fine) and started fresh. One analyzer
//! failing to start never takes its siblings down: the run proceeds with
//! whatever subset actually came up.

use crate::docker::{identity, ContainerRuntime, LOCAL_LOGS};
use anyhow::anyhow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Starts the configured analyzer containers against `source_root`.
///
/// Returns the names of the containers that are up (freshly started or
/// reused) and one error per analyzer that failed to start.
pub async fn start_analyzers(
    runtime: Arc<dyn ContainerRuntime>,
    source_root: &Path,
    images: &[String],
    local_daemon: bool,
) -> (Vec<String>, Vec<anyhow::Error>) {
    let mut tasks = JoinSet::new();
    for (index, image) in images.iter().enumerate() {
        let runtime = runtime.clone();
        let image = image.clone();
        let root = source_root.to_path_buf();
        tasks.spawn(async move { start_one(runtime, root, image, index, local_daemon).await });
    }

    if !images.is_empty() {
        info!("waiting for analyzers to start up...");
    }
    let mut started = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(container)) => started.push(container),
            Ok(Err(e)) => errors.push(e),
            Err(e) => errors.push(anyhow!("analyzer start task failed: {e}")),
        }
    }
    if !images.is_empty() {
        info!("analyzers up");
    }
    (started, errors)
}

async fn start_one(
    runtime: Arc<dyn ContainerRuntime>,
    source_root: PathBuf,
    image: String,
    index: usize,
    local_daemon: bool,
) -> Result<String, anyhow::Error> {
    let id = identity::resolve(&image, index);

    if runtime.image_matches(&image, &id.name).await {
        info!("reusing analyzer {} at localhost:{}", image, id.port);
        return Ok(id.name);
    }

    info!("found no analyzer container ({}) to reuse for {}", id.name, image);
    // The name may be held by a stopped or outdated container; clear it out.
    let stopped = runtime.stop(&id.name, Duration::ZERO, true).await;
    if !stopped.is_ok() {
        debug!("failed to stop {} (may not be running)", id.name);
    }

    let result = runtime
        .run_analyzer(&image, &id.name, &source_root, LOCAL_LOGS, id.port, local_daemon)
        .await;
    match result.outcome {
        Ok(()) => {
            info!("analyzer {} started at localhost:{}", image, id.port);
            Ok(id.name)
        }
        Err(e) => Err(anyhow!(
            "could not start {} at localhost:{}: {}; stderr: {}",
            image,
            id.port,
            e,
            result.stderr.trim()
        )),
    }
}
