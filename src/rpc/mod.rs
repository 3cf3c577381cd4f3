//! Analysis service protocol: message types and the client boundary.
//!
//! The service speaks a streaming request/response protocol: one request
//! per phase, answered by a sequence of [`AnalysisResponse`] messages. The
//! orchestrator consumes the stream through the [`ServiceClient`] trait so
//! tests can script responses without a live service.

pub mod http;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Which side of the build the analysis runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    PreBuild,
    PostBuild,
}

/// One analysis request, built once per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Categories to trigger; empty means "whatever the service config says".
    pub triggered_categories: Vec<String>,
    /// Repository root as seen from inside the service container.
    pub repo_root: String,
    /// Target files relative to `repo_root`; empty means the whole tree.
    pub file_paths: Vec<String>,
    /// Event that triggered this run.
    pub event: String,
    pub stage: Stage,
}

/// Line/column extent of a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

/// Source location a note points at, relative to the analyzed root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<SourceRange>,
}

/// A single analysis finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub description: String,
}

/// An analyzer telling us it could not complete a category. Informational;
/// never escalated into an orchestration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerFailure {
    pub category: String,
    pub message: String,
}

/// One streamed response element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub failures: Vec<AnalyzerFailure>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// Client-side errors talking to the analysis service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service did not become healthy within {0:?}")]
    HealthTimeout(Duration),

    #[error("malformed response frame: {0}")]
    Protocol(String),

    #[error("service reported error: {0}")]
    Remote(String),
}

/// Stream of response elements for one phase.
pub type ResponseStream = BoxStream<'static, Result<AnalysisResponse, ClientError>>;

/// The analysis service, as the orchestrator sees it.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Blocks until the service answers its health check, or `timeout`.
    async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ClientError>;

    /// Opens one streamed analysis call.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<ResponseStream, ClientError>;
}

impl AnalysisRequest {
    /// The post-build request is the pre-build request with only the stage
    /// changed; everything else is carried over untouched.
    pub fn with_stage(&self, stage: Stage) -> AnalysisRequest {
        AnalysisRequest {
            stage,
            ..self.clone()
        }
    }
}

impl AnalysisResponse {
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }
}
