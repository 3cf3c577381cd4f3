//! HTTP streaming client for the analysis service.
//!
//! The service answers one POST per phase with a newline-delimited stream
//! of JSON envelopes, each either `{"result": {...}}` or
//! `{"error": "..."}`; the stream ends when the body ends. Frame splitting
//! and envelope decoding are plain functions so they can be tested without
//! a socket.

use super::{AnalysisRequest, AnalysisResponse, ClientError, ResponseStream, ServiceClient};
use crate::docker::SERVICE_PORT;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Path of the streamed analysis call.
pub const ANALYZE_PATH: &str = "/AnalysisService/Run";
/// Path of the health check.
pub const HEALTH_PATH: &str = "/healthz";

/// How long to wait between health probes.
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Client bound to one service endpoint.
pub struct HttpClient {
    base: String,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(addr: &str) -> Self {
        HttpClient {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
        }
    }

    /// Client for the fixed local service endpoint.
    pub fn local() -> Self {
        Self::new(&format!("localhost:{SERVICE_PORT}"))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<AnalysisResponse>,
    #[serde(default)]
    error: Option<String>,
}

/// Appends `chunk` to `buf` and drains every complete newline-terminated
/// frame out of it; a trailing partial frame stays buffered.
fn split_frames(buf: &mut Vec<u8>, chunk: &[u8]) -> Vec<Vec<u8>> {
    buf.extend_from_slice(chunk);
    let mut frames = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let mut frame: Vec<u8> = buf.drain(..=pos).collect();
        frame.pop();
        frames.push(frame);
    }
    frames
}

/// Decodes one frame; blank keep-alive lines yield nothing.
fn decode_frame(frame: &[u8]) -> Option<Result<AnalysisResponse, ClientError>> {
    let text = std::str::from_utf8(frame).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Envelope>(text) {
        Ok(Envelope {
            error: Some(message),
            ..
        }) => Some(Err(ClientError::Remote(message))),
        Ok(Envelope {
            result: Some(msg), ..
        }) => Some(Ok(msg)),
        Ok(_) => Some(Err(ClientError::Protocol(format!(
            "envelope carries neither result nor error: {text}"
        )))),
        Err(e) => Some(Err(ClientError::Protocol(e.to_string()))),
    }
}

struct Decode {
    inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    buf: Vec<u8>,
    ready: VecDeque<Result<AnalysisResponse, ClientError>>,
    done: bool,
}

fn decode_stream(inner: BoxStream<'static, Result<Bytes, reqwest::Error>>) -> ResponseStream {
    let state = Decode {
        inner,
        buf: Vec::new(),
        ready: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.done {
                if !st.buf.is_empty() {
                    let trailing = std::mem::take(&mut st.buf);
                    if let Some(item) = decode_frame(&trailing) {
                        st.ready.push_back(item);
                    }
                    continue;
                }
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    for frame in split_frames(&mut st.buf, &chunk) {
                        if let Some(item) = decode_frame(&frame) {
                            st.ready.push_back(item);
                        }
                    }
                }
                Some(Err(e)) => {
                    st.buf.clear();
                    st.done = true;
                    st.ready.push_back(Err(ClientError::Transport(e)));
                }
                None => st.done = true,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ServiceClient for HttpClient {
    async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ClientError> {
        let deadline = Instant::now() + timeout;
        let url = format!("{}{}", self.base, HEALTH_PATH);
        loop {
            // Each probe is capped by the remaining budget: an endpoint that
            // accepts the connection and then goes silent must not stall the
            // wait past its deadline.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::HealthTimeout(timeout));
            }
            match tokio::time::timeout(remaining, self.http.get(&url).send()).await {
                Ok(Ok(resp)) if resp.status().is_success() => return Ok(()),
                Ok(Ok(resp)) => debug!(status = %resp.status(), "service not ready yet"),
                Ok(Err(e)) => debug!("health probe failed: {}", e),
                Err(_) => return Err(ClientError::HealthTimeout(timeout)),
            }
            if Instant::now() + HEALTH_PROBE_INTERVAL > deadline {
                return Err(ClientError::HealthTimeout(timeout));
            }
            tokio::time::sleep(HEALTH_PROBE_INTERVAL).await;
        }
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<ResponseStream, ClientError> {
        let url = format!("{}{}", self.base, ANALYZE_PATH);
        debug!(%url, stage = ?request.stage, "opening analysis stream");
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(decode_stream(resp.bytes_stream().boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::Note;

    #[test]
    fn split_frames_buffers_partials() {
        let mut buf = Vec::new();
        assert!(split_frames(&mut buf, b"{\"result\"").is_empty());
        let frames = split_frames(&mut buf, b":{}}\n{\"err");
        assert_eq!(frames, vec![b"{\"result\":{}}".to_vec()]);
        let frames = split_frames(&mut buf, b"or\":\"x\"}\n");
        assert_eq!(frames, vec![b"{\"error\":\"x\"}".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn split_frames_multiple_per_chunk() {
        let mut buf = Vec::new();
        let frames = split_frames(&mut buf, b"a\nb\nc");
        assert_eq!(frames, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(buf, b"c");
    }

    #[test]
    fn decode_frame_result() {
        let msg = decode_frame(
            br#"{"result":{"notes":[{"category":"Lint","description":"d"}]}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            msg.notes,
            vec![Note {
                category: "Lint".to_string(),
                subcategory: None,
                location: None,
                description: "d".to_string(),
            }]
        );
    }

    #[test]
    fn decode_frame_remote_error() {
        let err = decode_frame(br#"{"error":"analyzer exploded"}"#)
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ClientError::Remote(m) if m == "analyzer exploded"));
    }

    #[test]
    fn decode_frame_skips_blank_lines() {
        assert!(decode_frame(b"").is_none());
        assert!(decode_frame(b"   ").is_none());
    }

    #[test]
    fn decode_frame_rejects_garbage() {
        let err = decode_frame(b"not json").unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn decode_stream_yields_in_order() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"{\"result\":{\"notes\":[]}}\n{\"result\":")),
            Ok(Bytes::from_static(
                b"{\"notes\":[{\"category\":\"C\",\"description\":\"d\"}]}}\n",
            )),
        ];
        let mut stream = decode_stream(stream::iter(chunks).boxed());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.note_count(), 0);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.note_count(), 1);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn health_wait_gives_up_on_a_hung_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and hold them open without ever answering.
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => held.push(socket),
                    Err(_) => break,
                }
            }
        });

        let client = HttpClient::new(&addr.to_string());
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.wait_until_ready(Duration::from_millis(500)),
        )
        .await
        .expect("health wait blocked past its deadline");
        assert!(matches!(result, Err(ClientError::HealthTimeout(_))));
    }

    #[tokio::test]
    async fn decode_stream_flushes_unterminated_tail() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> =
            vec![Ok(Bytes::from_static(b"{\"result\":{}}"))];
        let mut stream = decode_stream(stream::iter(chunks).boxed());
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
    }
}
