//! Streaming client for the answering agents.
//!
//! The [`AgentBackend`] trait decouples answer selection from the HTTP stream.
//! Tests use scripted backends that return canned replies without a network.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::sse::{StreamDecoder, StreamEvent};
use crate::core::types::{AgentEndpoint, AgentReply};
use crate::io::transport::Transport;

/// Abstraction over answering backends.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Send `prompt` to `endpoint` and return the concatenated answer.
    async fn ask(&self, endpoint: &AgentEndpoint, prompt: &str) -> Result<AgentReply>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    stream: bool,
}

/// Backend that posts to the endpoint and decodes its `data: ` stream.
pub struct HttpAgentBackend {
    transport: Transport,
}

impl HttpAgentBackend {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AgentBackend for HttpAgentBackend {
    #[instrument(skip_all, fields(endpoint = %endpoint.name))]
    async fn ask(&self, endpoint: &AgentEndpoint, prompt: &str) -> Result<AgentReply> {
        let started = Instant::now();
        let response = self
            .transport
            .client()
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(&ChatRequest {
                message: prompt,
                stream: true,
            })
            .send()
            .await
            .with_context(|| format!("send prompt to {}", endpoint.name))?
            .error_for_status()
            .with_context(|| format!("{} rejected the prompt", endpoint.name))?;

        let mut assembler = ReplyAssembler::new(started);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.with_context(|| format!("read stream from {}", endpoint.name))?;
            assembler.push(&chunk);
            if assembler.is_done() {
                break;
            }
        }
        let reply = assembler.finish();
        debug!(
            chars = reply.text.len(),
            first_token_ms = reply.first_token.as_millis() as u64,
            "stream complete"
        );
        Ok(reply)
    }
}

/// Accumulates decoded fragments and the time the first one arrived.
struct ReplyAssembler {
    started: Instant,
    decoder: StreamDecoder,
    text: String,
    first_token: Option<Duration>,
}

impl ReplyAssembler {
    fn new(started: Instant) -> Self {
        Self {
            started,
            decoder: StreamDecoder::new(),
            text: String::new(),
            first_token: None,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        let events = self.decoder.feed(bytes);
        self.apply(events);
    }

    fn is_done(&self) -> bool {
        self.decoder.is_done()
    }

    fn finish(mut self) -> AgentReply {
        let events = self.decoder.finish();
        self.apply(events);
        AgentReply {
            first_token: self.first_token.unwrap_or_else(|| self.started.elapsed()),
            text: self.text,
        }
    }

    fn apply(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            match event {
                StreamEvent::Fragment(fragment) => {
                    if self.first_token.is_none() {
                        self.first_token = Some(self.started.elapsed());
                    }
                    self.text.push_str(&fragment);
                }
                StreamEvent::Malformed { line, error } => {
                    warn!(%line, %error, "skipping malformed stream chunk");
                }
                StreamEvent::Done => {}
            }
        }
    }
}
