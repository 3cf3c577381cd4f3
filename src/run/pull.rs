//! Image freshness and pull coordination.
//!
//! Pull failures are deliberately non-fatal: a missing image will surface
//! downstream when the container refuses to start, so here they are only
//! logged. Callers skip pulling entirely when running with the local tag.

use super::log_streams;
use crate::docker::ContainerRuntime;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Refreshes `image` if it is out of date; errors are surfaced in the log
/// only.
pub async fn pull(runtime: &dyn ContainerRuntime, image: &str) {
    if !runtime.out_of_date(image).await {
        return;
    }
    info!("pulling image {}", image);
    let result = runtime.pull(image).await;
    log_streams(&result);
    match &result.outcome {
        Ok(()) => info!("pulling complete"),
        Err(e) => error!("error from pull: {}", e),
    }
}

/// Pulls an unordered set of analyzer images, one task per image, joining
/// all of them before returning. No per-image failure is fatal.
pub async fn pull_analyzers(runtime: Arc<dyn ContainerRuntime>, images: &[String]) {
    if images.is_empty() {
        return;
    }
    let mut tasks = JoinSet::new();
    for image in images {
        let runtime = runtime.clone();
        let image = image.clone();
        tasks.spawn(async move { pull(runtime.as_ref(), &image).await });
    }
    info!("pulling analyzer images...");
    while tasks.join_next().await.is_some() {}
    info!("analyzer images pulled");
}
