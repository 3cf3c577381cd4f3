//! drydock - one-shot containerized code analysis
//!
//! drydock brings up a set of analysis containers (a main service plus any
//! number of third-party "sidecar" analyzers), submits an analysis request
//! over a streaming call, aggregates the streamed notes, optionally runs a
//! second post-build phase after extracting build units, and tears the
//! containers down again.
//!
//! # Core Concepts
//!
//! - **Analyzer**: a sidecar container providing one or more analysis
//!   categories, addressed by a deterministic name and port derived from
//!   its image reference
//! - **Reuse**: an already-running container is kept when its observed
//!   state (image, volume mapping, links) matches what the run needs
//! - **Phase**: one full request/stream cycle, tagged pre-build or
//!   post-build
//! - **Note**: a single analysis finding with a category, an optional
//!   source location, and a description
//!
//! # Project Structure
//!
//! - [`run`]: the orchestrator and its lifecycle managers
//! - [`docker`]: the container runtime boundary and identity derivation
//! - [`rpc`]: protocol messages and the streaming service client
//! - [`output`]: console and JSON result sinks
//! - [`config`]: per-repository analyzer configuration

pub mod config;
pub mod docker;
pub mod output;
pub mod rpc;
pub mod run;
pub mod util;

pub use config::{global_analyzer_images, ConfigError};
pub use docker::cli::DockerCli;
pub use docker::{ContainerRuntime, RuntimeError};
pub use output::{ConsoleSink, JsonFileSink, ResponseSink};
pub use rpc::http::HttpClient;
pub use rpc::{AnalysisRequest, AnalysisResponse, ClientError, Note, ServiceClient, Stage};
pub use run::{Invocation, RunOptions, RunReport};
pub use util::{init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_drydock() {
        assert_eq!(NAME, "drydock");
    }
}
