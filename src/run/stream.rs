//! Streaming result aggregation for one analysis phase.

use crate::output::ResponseSink;
use crate::rpc::{AnalysisRequest, ServiceClient};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use tracing::debug;

/// Runs one full request/stream cycle and returns the number of notes it
/// produced.
///
/// Every streamed element is handed to `sink` in stream order before the
/// next one is requested. A transport error aborts the phase: the error
/// wins over any partial tally. The stream is dropped on every exit path.
pub async fn run_phase(
    client: &dyn ServiceClient,
    request: &AnalysisRequest,
    sink: &mut dyn ResponseSink,
) -> Result<usize> {
    debug!(stage = ?request.stage, "calling the analysis service");
    let mut stream = client
        .analyze(request)
        .await
        .context("could not open the analysis stream")?;

    let mut total_notes = 0;
    while let Some(msg) = stream.next().await {
        let msg = msg.context("received an error from the analysis stream")?;
        sink.handle(&msg).context("could not process results")?;
        total_notes += msg.note_count();
    }
    Ok(total_notes)
}
