//! Production container runtime backed by the `docker` binary.
//!
//! Inspection queries go through `docker inspect --format` and container
//! lifecycle commands through `docker run`/`stop`/`rm`, always capturing
//! stdout and stderr so the orchestrator can surface them. Daemon
//! availability is probed over the API socket instead, which is cheaper
//! and does not depend on CLI output parsing.

use super::{
    CommandResult, ContainerRuntime, RuntimeError, LOGS_MOUNT, SERVICE_PORT, WORKSPACE_MOUNT,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Container runtime that shells out to the local `docker` CLI.
#[derive(Debug, Default, Clone)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        DockerCli
    }

    async fn docker(&self, args: &[&str]) -> CommandResult {
        debug!(command = %format!("docker {}", args.join(" ")), "running docker");
        let output = match Command::new("docker").args(args).output().await {
            Ok(out) => out,
            Err(e) => {
                return CommandResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    outcome: Err(RuntimeError::Spawn(e)),
                }
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let outcome = if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::Failed {
                command: args.first().unwrap_or(&"docker").to_string(),
                status: output.status.to_string(),
            })
        };
        CommandResult {
            stdout,
            stderr,
            outcome,
        }
    }

    async fn inspect_format(&self, target: &str, format: &str) -> Option<String> {
        let result = self
            .docker(&["inspect", "--format", format, target])
            .await;
        if result.is_ok() {
            Some(result.stdout.trim().to_string())
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct Mount {
    #[serde(rename = "Source")]
    source: PathBuf,
    #[serde(rename = "Destination")]
    destination: String,
}

/// Extracts the link source name out of a docker link spec
/// (`/analyzer_0:/drydock_service/analyzer_0` -> `analyzer_0`).
fn link_source(spec: &str) -> Option<&str> {
    let source = spec.split(':').next()?;
    Some(source.trim_start_matches('/'))
}

/// Whether `image` carries a pinned tag (anything but `latest`).
fn has_pinned_tag(image: &str) -> bool {
    let colon = image.rfind(':');
    let slash = image.rfind('/');
    match (colon, slash) {
        (Some(c), Some(s)) if c < s => false,
        (None, _) => false,
        (Some(c), _) => &image[c + 1..] != "latest",
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn is_available(&self) -> bool {
        let docker = match bollard::Docker::connect_with_local_defaults() {
            Ok(d) => d,
            Err(e) => {
                debug!("failed to connect to docker daemon: {}", e);
                return false;
            }
        };
        match docker.version().await {
            Ok(v) => {
                debug!(api_version = ?v.api_version, "docker daemon reachable");
                true
            }
            Err(e) => {
                debug!("docker daemon not responding: {}", e);
                false
            }
        }
    }

    async fn out_of_date(&self, image: &str) -> bool {
        // An image we do not have is always stale. One we do have is only
        // trusted when its tag is pinned; `latest` and untagged references
        // can drift on the registry.
        let present = self
            .docker(&["image", "inspect", "--format", "{{.Id}}", image])
            .await
            .is_ok();
        !present || !has_pinned_tag(image)
    }

    async fn pull(&self, image: &str) -> CommandResult {
        self.docker(&["pull", image]).await
    }

    async fn mapped_volume(&self, path: &Path, container: &str) -> Option<PathBuf> {
        let raw = self
            .inspect_format(container, "{{json .Mounts}}")
            .await?;
        let mounts: Vec<Mount> = serde_json::from_str(&raw).ok()?;
        let workspace = mounts
            .iter()
            .find(|m| m.destination == WORKSPACE_MOUNT)?;
        path.strip_prefix(&workspace.source)
            .ok()
            .map(Path::to_path_buf)
    }

    async fn image_matches(&self, image: &str, container: &str) -> bool {
        match self
            .inspect_format(container, "{{.Config.Image}}\t{{.State.Running}}")
            .await
        {
            Some(line) => {
                let mut parts = line.split('\t');
                let running_image = parts.next().unwrap_or("");
                let running = parts.next() == Some("true");
                running && running_image == image
            }
            None => false,
        }
    }

    async fn contains_links(&self, container: &str, linked: &[String]) -> bool {
        let raw = match self
            .inspect_format(container, "{{json .HostConfig.Links}}")
            .await
        {
            Some(raw) => raw,
            None => return false,
        };
        let specs: Vec<String> = match serde_json::from_str(&raw) {
            Ok(Some(specs)) => specs,
            Ok(None) => Vec::new(),
            Err(_) => return false,
        };
        let mut actual: Vec<&str> = specs.iter().filter_map(|s| link_source(s)).collect();
        let mut wanted: Vec<&str> = linked.iter().map(String::as_str).collect();
        actual.sort_unstable();
        wanted.sort_unstable();
        actual == wanted
    }

    async fn run_service(
        &self,
        image: &str,
        container: &str,
        source_root: &Path,
        log_dir: &str,
        analyzers: &[String],
        local_daemon: bool,
    ) -> CommandResult {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container.to_string(),
            "-p".to_string(),
            format!("{SERVICE_PORT}:{SERVICE_PORT}"),
            "-v".to_string(),
            format!("{}:{}", source_root.display(), WORKSPACE_MOUNT),
            "-v".to_string(),
            format!("{log_dir}:{LOGS_MOUNT}"),
        ];
        for analyzer in analyzers {
            args.push("--link".to_string());
            args.push(format!("{analyzer}:{analyzer}"));
        }
        if local_daemon {
            args.push("-v".to_string());
            args.push("/var/run/docker.sock:/var/run/docker.sock".to_string());
        }
        args.push(image.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&arg_refs).await
    }

    async fn run_analyzer(
        &self,
        image: &str,
        container: &str,
        source_root: &Path,
        log_dir: &str,
        port: u16,
        local_daemon: bool,
    ) -> CommandResult {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            container.to_string(),
            "-p".to_string(),
            format!("{port}:{port}"),
            "-v".to_string(),
            format!("{}:{}", source_root.display(), WORKSPACE_MOUNT),
            "-v".to_string(),
            format!("{log_dir}:{LOGS_MOUNT}"),
        ];
        if local_daemon {
            args.push("-v".to_string());
            args.push("/var/run/docker.sock:/var/run/docker.sock".to_string());
        }
        args.push(image.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&arg_refs).await
    }

    async fn run_extractor(
        &self,
        image: &str,
        container: &str,
        source_root: &Path,
        build_system: &str,
        local_daemon: bool,
    ) -> CommandResult {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "--name".to_string(),
            container.to_string(),
            "-v".to_string(),
            format!("{}:{}", source_root.display(), WORKSPACE_MOUNT),
            "-e".to_string(),
            format!("BUILD_SYSTEM={build_system}"),
        ];
        if local_daemon {
            args.push("-v".to_string());
            args.push("/var/run/docker.sock:/var/run/docker.sock".to_string());
        }
        args.push(image.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.docker(&arg_refs).await
    }

    async fn stop(&self, container: &str, grace: Duration, remove: bool) -> CommandResult {
        let timeout = grace.as_secs().to_string();
        let stopped = self.docker(&["stop", "-t", &timeout, container]).await;
        if !remove {
            return stopped;
        }
        let removed = self.docker(&["rm", "-f", container]).await;
        CommandResult {
            stdout: [stopped.stdout.as_str(), removed.stdout.as_str()]
                .join("\n")
                .trim()
                .to_string(),
            stderr: [stopped.stderr.as_str(), removed.stderr.as_str()]
                .join("\n")
                .trim()
                .to_string(),
            outcome: stopped.outcome.and(removed.outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_source_strips_alias_and_slash() {
        assert_eq!(
            link_source("/analyzer_0:/drydock_service/analyzer_0"),
            Some("analyzer_0")
        );
        assert_eq!(link_source("plain"), Some("plain"));
    }

    #[test]
    fn pinned_tag_detection() {
        assert!(has_pinned_tag("gcr.io/x/service:prod"));
        assert!(!has_pinned_tag("gcr.io/x/service:latest"));
        assert!(!has_pinned_tag("gcr.io/x/service"));
        // The colon here belongs to the registry, not a tag.
        assert!(!has_pinned_tag("localhost:5000/service"));
    }
}
