//! stdio to SSE bridge.
//!
//! Lets a host that only speaks line-delimited JSON-RPC over stdio reach a
//! remote server running the HTTP/SSE transport. Requests read from stdin
//! are POSTed one at a time, in arrival order, to the URL announced by the
//! server's `endpoint` event; `message` events are written to stdout.

pub mod sse;

pub use sse::{SseDecoder, SseEvent};

use crate::config::BridgeConfig;
use crate::constants::{BRIDGE_QUEUE_CAPACITY, TOKEN_QUERY_PARAM};
use crate::error::BridgeError;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Lifecycle of one bridge process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    SseConnecting,
    AwaitingEndpoint,
    Ready,
    Closed,
}

impl BridgeState {
    fn advance(&mut self, next: BridgeState) {
        debug!(from = %self, to = %next, "Bridge state change");
        *self = next;
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeState::Disconnected => "disconnected",
            BridgeState::SseConnecting => "sse-connecting",
            BridgeState::AwaitingEndpoint => "awaiting-endpoint",
            BridgeState::Ready => "ready",
            BridgeState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Run the bridge until the SSE stream or `input` ends.
pub async fn run_bridge<R, W>(config: &BridgeConfig, input: R, output: W) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let client = Client::new();
    let mut state = BridgeState::Disconnected;

    state.advance(BridgeState::SseConnecting);
    let response = client
        .get(config.sse_url.clone())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;
    if response.status() != StatusCode::OK {
        state.advance(BridgeState::Closed);
        return Err(BridgeError::Status(response.status().as_u16()));
    }
    state.advance(BridgeState::AwaitingEndpoint);
    info!(url = %redacted(&config.sse_url), "Connected to SSE stream");

    let (endpoint_tx, endpoint_rx) = watch::channel(None);
    let (queue_tx, queue_rx) = mpsc::channel(BRIDGE_QUEUE_CAPACITY);
    let poster = tokio::spawn(drain_queue(client, queue_rx, endpoint_rx));

    let events = EventPump {
        sse_url: &config.sse_url,
        token: token_from(&config.sse_url),
        endpoint_timeout: config.endpoint_timeout,
        endpoint_tx,
    };

    let outcome = tokio::select! {
        result = events.run(response, &mut state, output) => result,
        result = read_requests(input, queue_tx) => result,
    };

    poster.abort();
    state.advance(BridgeState::Closed);
    outcome
}

struct EventPump<'a> {
    sse_url: &'a Url,
    token: Option<String>,
    endpoint_timeout: Option<Duration>,
    endpoint_tx: watch::Sender<Option<Url>>,
}

impl EventPump<'_> {
    async fn run<W>(
        &self,
        response: reqwest::Response,
        state: &mut BridgeState,
        mut output: W,
    ) -> Result<(), BridgeError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let deadline = self.endpoint_timeout.map(|t| Instant::now() + t);

        loop {
            let awaiting = *state == BridgeState::AwaitingEndpoint;
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = expire(deadline), if awaiting => {
                    return Err(BridgeError::EndpointTimeout(
                        self.endpoint_timeout.unwrap_or_default(),
                    ));
                }
            };

            let Some(chunk) = chunk else {
                info!("SSE stream ended");
                return Ok(());
            };

            for event in decoder.push(&chunk?)? {
                match event.event.as_str() {
                    "endpoint" => {
                        let url = resolve_endpoint(self.sse_url, &event.data, self.token.as_deref())?;
                        info!(endpoint = %redacted(&url), "Received POST endpoint");
                        self.endpoint_tx.send_replace(Some(url));
                        if *state != BridgeState::Ready {
                            state.advance(BridgeState::Ready);
                        }
                    }
                    "message" => {
                        output.write_all(event.data.as_bytes()).await?;
                        output.write_all(b"\n").await?;
                        output.flush().await?;
                    }
                    other => debug!(event = other, "Ignoring SSE event"),
                }
            }
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Queue each JSON line from `input` in arrival order.
async fn read_requests<R>(input: R, queue: mpsc::Sender<String>) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(line) {
            warn!("Dropping stdin line that is not JSON: {}", e);
            continue;
        }
        if queue.send(line.to_string()).await.is_err() {
            break;
        }
    }
    info!("stdin closed");
    Ok(())
}

/// POST queued messages one at a time once the endpoint is known.
async fn drain_queue(
    client: Client,
    mut queue: mpsc::Receiver<String>,
    mut endpoint: watch::Receiver<Option<Url>>,
) {
    while let Some(message) = queue.recv().await {
        let url = match endpoint.wait_for(Option::is_some).await {
            Ok(url) => url.clone(),
            Err(_) => return,
        };
        let Some(url) = url else { return };

        match client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await
        {
            Ok(response) if response.status().as_u16() >= 400 => {
                warn!(status = %response.status(), "POST to endpoint rejected");
            }
            Ok(_) => {}
            Err(e) => warn!("POST to endpoint failed: {}", e),
        }
    }
}

/// Access token carried by the SSE URL, if any.
pub fn token_from(sse_url: &Url) -> Option<String> {
    sse_url
        .query_pairs()
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

/// Resolve an `endpoint` event against the SSE URL, appending the token
/// when the endpoint does not already carry one.
pub fn resolve_endpoint(sse_url: &Url, raw: &str, token: Option<&str>) -> Result<Url, BridgeError> {
    let mut url = sse_url.join(raw.trim()).map_err(|source| BridgeError::Url {
        url: raw.to_string(),
        source,
    })?;
    if let Some(token) = token {
        if !url.query_pairs().any(|(key, _)| key == TOKEN_QUERY_PARAM) {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }
    }
    Ok(url)
}

/// URL with the token value masked, for logging.
fn redacted(url: &Url) -> Url {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == TOKEN_QUERY_PARAM { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        masked.query_pairs_mut().clear().extend_pairs(pairs);
    }
    masked
}
