//! Container runtime boundary.
//!
//! The orchestrator only ever talks to the runtime through the
//! [`ContainerRuntime`] trait; the production implementation
//! ([`cli::DockerCli`]) shells out to the `docker` binary, and tests swap in
//! a scripted runtime. Every operation that launches or stops a container
//! reports back through [`CommandResult`] so callers can log the captured
//! streams whether or not the command succeeded.

pub mod cli;
pub mod identity;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Logical name of the main analysis service container.
pub const SERVICE_CONTAINER: &str = "drydock_service";
/// Short image name of the main analysis service.
pub const SERVICE_IMAGE: &str = "service";
/// Short image name of the build-unit extractor.
pub const EXTRACTOR_IMAGE: &str = "extractor";
/// Container name used for the build-unit extractor.
pub const EXTRACTOR_CONTAINER: &str = "extractor";
/// Where the analyzed source tree is mounted inside every container.
pub const WORKSPACE_MOUNT: &str = "/drydock-workspace";
/// Where containers write their logs.
pub const LOGS_MOUNT: &str = "/drydock-output";
/// Host-side directory mapped onto [`LOGS_MOUNT`].
pub const LOCAL_LOGS: &str = "/tmp";
/// Tag that signals a local dev build: suppresses all image pulling.
pub const LOCAL_TAG: &str = "local";
/// Host port the main analysis service listens on.
pub const SERVICE_PORT: u16 = 10007;

/// Errors from invoking the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to invoke docker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("docker {command} exited with {status}")]
    Failed { command: String, status: String },
}

/// Captured output of one runtime command.
///
/// The streams are kept even on failure: a failed pull or run usually
/// explains itself on stderr, and the caller decides whether that is worth
/// a warning or a hard error.
#[derive(Debug)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub outcome: Result<(), RuntimeError>,
}

impl CommandResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Builds the fully qualified image reference for a drydock image.
///
/// An empty registry prefix or tag is simply omitted.
pub fn full_image_name(registry: &str, image: &str, tag: &str) -> String {
    let mut name = String::new();
    if !registry.is_empty() {
        name.push_str(registry);
        name.push('/');
    }
    name.push_str(image);
    if !tag.is_empty() {
        name.push(':');
        name.push_str(tag);
    }
    name
}

/// Operations the orchestrator needs from the container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether a container runtime is reachable at all.
    async fn is_available(&self) -> bool;

    /// Whether `image` should be refreshed before use.
    async fn out_of_date(&self, image: &str) -> bool;

    /// Pulls `image`, capturing the pull output.
    async fn pull(&self, image: &str) -> CommandResult;

    /// If `path` lies inside the workspace mount of `container`, returns the
    /// relative subpath from the mount root to `path`.
    async fn mapped_volume(&self, path: &Path, container: &str) -> Option<PathBuf>;

    /// Whether `container` is currently running `image` exactly.
    async fn image_matches(&self, image: &str, container: &str) -> bool;

    /// Whether `container` is linked to exactly the given set of containers.
    async fn contains_links(&self, container: &str, linked: &[String]) -> bool;

    /// Starts the main analysis service container.
    async fn run_service(
        &self,
        image: &str,
        container: &str,
        source_root: &Path,
        log_dir: &str,
        analyzers: &[String],
        local_daemon: bool,
    ) -> CommandResult;

    /// Starts one analyzer container on its assigned port.
    async fn run_analyzer(
        &self,
        image: &str,
        container: &str,
        source_root: &Path,
        log_dir: &str,
        port: u16,
        local_daemon: bool,
    ) -> CommandResult;

    /// Runs the build-unit extractor to completion.
    async fn run_extractor(
        &self,
        image: &str,
        container: &str,
        source_root: &Path,
        build_system: &str,
        local_daemon: bool,
    ) -> CommandResult;

    /// Stops `container`, waiting up to `grace` before killing, and removes
    /// it when `remove` is set.
    async fn stop(&self, container: &str, grace: Duration, remove: bool) -> CommandResult;
}
