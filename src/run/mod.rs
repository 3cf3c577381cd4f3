//! The top-level run: a one-shot analysis invocation.
//!
//! An [`Invocation`] drives the whole sequence: validate the target, pull
//! images, bring up the analyzer fleet, ensure the service container is
//! healthy, stream the pre-build phase, optionally extract build units and
//! stream the post-build phase, then tear everything down. The sequence is
//! strictly linear; only image pulls and analyzer starts fan out.

pub mod analyzers;
pub mod pull;
pub mod service;
pub mod stream;
pub mod teardown;

use crate::config;
use crate::docker::{
    full_image_name, identity, CommandResult, ContainerRuntime, EXTRACTOR_CONTAINER,
    EXTRACTOR_IMAGE, LOCAL_TAG, SERVICE_CONTAINER, SERVICE_IMAGE, WORKSPACE_MOUNT,
};
use crate::output::{self, ResponseSink};
use crate::rpc::{AnalysisRequest, ServiceClient, Stage};
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use self::teardown::Teardown;
use tracing::{debug, error, info, warn};

/// Event assumed when the caller does not name one.
pub const DEFAULT_EVENT: &str = "manual";
/// Registry prefix the drydock images are published under.
pub const DEFAULT_REPO: &str = "gcr.io/drydock_releases";
/// Grace period given to the build extractor when stopping it.
pub const EXTRACTOR_STOP_GRACE: Duration = Duration::from_secs(10);

/// Configuration of one run. Immutable once the run starts.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// File or directory to analyze.
    pub target: PathBuf,
    /// Third-party analyzer images; empty means "consult the repository's
    /// global config".
    pub third_party_analyzers: Vec<String>,
    /// Build system to extract build units with; `None` skips the
    /// post-build phase.
    pub build: Option<String>,
    /// Categories to trigger; empty defers to the service configuration.
    pub trigger_categories: Vec<String>,
    /// Expose the local container daemon inside the analysis containers.
    pub local_daemon: bool,
    /// Event name attached to the request.
    pub event: String,
    /// Write results as JSON here instead of the console.
    pub json_output: Option<PathBuf>,
    /// Registry prefix for the service and extractor images.
    pub repo: String,
    /// Leave the containers running after the run.
    pub stay_up: bool,
    /// Image tag; [`LOCAL_TAG`] suppresses all pulling.
    pub tag: String,
    /// Use the local extractor image without pulling it.
    pub local_extractor: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            target: PathBuf::from("."),
            third_party_analyzers: Vec::new(),
            build: None,
            trigger_categories: Vec::new(),
            local_daemon: false,
            event: DEFAULT_EVENT.to_string(),
            json_output: None,
            repo: DEFAULT_REPO.to_string(),
            stay_up: false,
            tag: String::new(),
            local_extractor: false,
        }
    }
}

/// Outcome of a run: the note total and, when the run failed, the first
/// fatal error. Notes counted before the failure are never dropped.
pub struct RunReport {
    pub notes: usize,
    pub error: Option<anyhow::Error>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// One analysis run, bound to its collaborators.
pub struct Invocation {
    options: RunOptions,
    runtime: Arc<dyn ContainerRuntime>,
    client: Arc<dyn ServiceClient>,
    sink: Option<Box<dyn ResponseSink>>,
}

impl Invocation {
    pub fn new(
        options: RunOptions,
        runtime: Arc<dyn ContainerRuntime>,
        client: Arc<dyn ServiceClient>,
    ) -> Self {
        Invocation {
            options,
            runtime,
            client,
            sink: None,
        }
    }

    /// Overrides the result sink; by default it is derived from
    /// `json_output`. Mostly a test hook.
    pub fn with_sink(mut self, sink: Box<dyn ResponseSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Drives the run to completion and tears down on every exit path.
    pub async fn run(mut self) -> RunReport {
        let mut notes = 0;
        let mut teardown = Teardown::new();
        let error = self.drive(&mut notes, &mut teardown).await.err();
        teardown.execute(self.runtime.as_ref()).await;
        RunReport { notes, error }
    }

    async fn drive(&mut self, notes: &mut usize, teardown: &mut Teardown) -> Result<()> {
        info!("starting drydock...");
        let target = self.options.target.clone();
        let meta = std::fs::metadata(&target)
            .map_err(|_| anyhow!("{} is not a valid file or directory", target.display()))?;

        let orig_dir = if meta.is_dir() {
            target.clone()
        } else {
            target
                .parent()
                .map(PathBuf::from)
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from("."))
        };
        let abs_root = std::fs::canonicalize(&orig_dir)
            .with_context(|| format!("could not get absolute path for {}", orig_dir.display()))?;

        if !self.runtime.is_available().await {
            bail!("container runtime could not be found; make sure docker is installed");
        }

        let image = full_image_name(&self.options.repo, SERVICE_IMAGE, &self.options.tag);
        info!("analyzing {} with {}", abs_root.display(), image);

        if self.options.trigger_categories.is_empty() {
            info!(
                "no categories provided; using the categories configured for event {}",
                self.options.event
            );
        }

        let mut analyzer_images = self.options.third_party_analyzers.clone();
        if analyzer_images.is_empty() {
            match config::global_analyzer_images(&abs_root) {
                Ok(images) => analyzer_images = images,
                Err(e) => info!(
                    "could not get global config; using only the default analyzers: {}",
                    e
                ),
            }
        }

        // The local tag is the dev-iteration signal: no pulling at all,
        // for the service image and the analyzers alike.
        if self.options.tag != LOCAL_TAG {
            pull::pull(self.runtime.as_ref(), &image).await;
            pull::pull_analyzers(self.runtime.clone(), &analyzer_images).await;
        }

        // Register teardown before anything starts: a failed start can
        // still leave a container behind.
        if !self.options.stay_up {
            teardown.register(SERVICE_CONTAINER, Duration::ZERO);
            for (index, analyzer_image) in analyzer_images.iter().enumerate() {
                let id = identity::resolve(analyzer_image, index);
                teardown.register(&id.name, Duration::ZERO);
            }
        }

        let (started, start_errors) = analyzers::start_analyzers(
            self.runtime.clone(),
            &abs_root,
            &analyzer_images,
            self.options.local_daemon,
        )
        .await;
        for e in &start_errors {
            error!("could not start third-party analyzer: {:#}", e);
        }

        // Only the analyzers that actually came up get linked.
        let sub_path = service::ensure_service_running(
            self.runtime.as_ref(),
            self.client.as_ref(),
            &image,
            &abs_root,
            &started,
            self.options.local_daemon,
        )
        .await?;

        let files = if meta.is_dir() {
            Vec::new()
        } else {
            match target.file_name() {
                Some(name) => vec![name.to_string_lossy().into_owned()],
                None => Vec::new(),
            }
        };
        let repo_root = if sub_path.is_empty() {
            WORKSPACE_MOUNT.to_string()
        } else {
            format!("{WORKSPACE_MOUNT}/{sub_path}")
        };

        let mut sink = self.sink.take().unwrap_or_else(|| {
            output::sink_for(&orig_dir, self.options.json_output.as_deref())
        });

        let request = AnalysisRequest {
            triggered_categories: self.options.trigger_categories.clone(),
            repo_root,
            file_paths: files,
            event: self.options.event.clone(),
            stage: Stage::PreBuild,
        };
        debug!("calling with request {:?}", request);
        *notes += stream::run_phase(self.client.as_ref(), &request, sink.as_mut())
            .await
            .context("error making service call")?;

        if let Some(build) = self.options.build.clone() {
            let extractor_image =
                full_image_name(&self.options.repo, EXTRACTOR_IMAGE, &self.options.tag);
            if !self.options.local_extractor && self.options.tag != LOCAL_TAG {
                pull::pull(self.runtime.as_ref(), &extractor_image).await;
            }

            // The extractor gets a real grace period on stop, and is torn
            // down even on stay-up runs.
            teardown.register(EXTRACTOR_CONTAINER, EXTRACTOR_STOP_GRACE);
            info!("retrieving build units with {}", build);
            let result = self
                .runtime
                .run_extractor(
                    &extractor_image,
                    EXTRACTOR_CONTAINER,
                    &abs_root,
                    &build,
                    self.options.local_daemon,
                )
                .await;
            if let Err(e) = &result.outcome {
                // The extractor spews output; only surface it when it broke.
                log_streams(&result);
                bail!("build-unit extraction failed: {e}");
            }
            info!("build units prepared");

            let post_request = request.with_stage(Stage::PostBuild);
            debug!("calling with request {:?}", post_request);
            *notes += stream::run_phase(self.client.as_ref(), &post_request, sink.as_mut())
                .await
                .context("error making service call")?;
        }

        info!("end of results");
        Ok(())
    }
}

/// Logs whatever a runtime command wrote to its streams.
pub(crate) fn log_streams(result: &CommandResult) {
    let out = result.stdout.trim();
    let err = result.stderr.trim();
    if !out.is_empty() {
        info!("stdout:\n{}", out);
    }
    if !err.is_empty() {
        warn!("stderr:\n{}", err);
    }
}
