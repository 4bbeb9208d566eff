use super::source::{FrameSource, SourceOpener};
use crate::bus::{absorb, keys, BusClient, ProbeStatus};
use crate::config::{IngestConfig, StreamConfig, Transport};
use crate::error::IngestError;
use crate::frame::Frame;
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of one stream's capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Closed,
    Opening,
    Streaming,
    /// Reads are coming back empty
    Failing,
    /// The handle was released and is being reopened
    Reopening,
    Stopped,
}

/// Capture loop for a single stream
pub struct IngestEngine {
    stream: StreamConfig,
    config: IngestConfig,
    bus: BusClient,
    opener: Arc<dyn SourceOpener>,
    source: Option<Box<dyn FrameSource>>,
    state: IngestState,
    transport: Transport,
    fail_count: u32,
    reopen_tries: u32,
    frames_published: u64,
    last_accepted: Option<Instant>,
}

impl IngestEngine {
    pub fn new(
        stream: StreamConfig,
        config: IngestConfig,
        bus: BusClient,
        opener: Arc<dyn SourceOpener>,
    ) -> Self {
        let transport = if stream.prefers_unreliable() {
            Transport::Udp
        } else {
            Transport::Tcp
        };

        Self {
            stream,
            config,
            bus,
            opener,
            source: None,
            state: IngestState::Closed,
            transport,
            fail_count: 0,
            reopen_tries: 0,
            frames_published: 0,
            last_accepted: None,
        }
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Transport used for the next open
    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn reopen_tries(&self) -> u32 {
        self.reopen_tries
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    /// Open the source, then capture until cancelled
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), IngestError> {
        self.start().await?;

        while !cancel.is_cancelled() {
            self.step(&cancel).await;
        }

        self.stop().await;
        Ok(())
    }

    /// Initial open. A failure here is final: the error probe is published
    /// and the engine stops without retrying.
    pub async fn start(&mut self) -> Result<(), IngestError> {
        self.state = IngestState::Opening;
        info!(
            "Opening stream '{}' ({}) over {}",
            self.stream.name, self.stream.url, self.transport
        );

        match self.opener.open(&self.stream, self.transport).await {
            Ok(source) => {
                self.source = Some(source);
                self.state = IngestState::Streaming;
                self.probe(ProbeStatus::Ok, json!({ "event": "start" }))
                    .await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to open stream '{}': {}", self.stream.name, e);
                self.state = IngestState::Stopped;
                self.probe(
                    ProbeStatus::Error,
                    json!({ "reason": "open_failed", "details": e.to_string() }),
                )
                .await;
                Err(e)
            }
        }
    }

    /// One loop iteration: a read (with its throttle or failure backoff) or
    /// one reopen attempt
    pub async fn step(&mut self, cancel: &CancellationToken) {
        match self.state {
            IngestState::Streaming | IngestState::Failing => {}
            IngestState::Reopening => {
                self.reopen(cancel).await;
                return;
            }
            IngestState::Closed | IngestState::Opening | IngestState::Stopped => return,
        }

        let frame = match self.source.as_mut() {
            Some(source) => source.read().await,
            None => None,
        };

        match frame {
            Some(frame) => self.accept(frame, cancel).await,
            None => self.on_read_failure(cancel).await,
        }
    }

    /// Release the capture handle and publish the terminal probe
    pub async fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release().await;
        }
        self.state = IngestState::Stopped;
        self.probe(ProbeStatus::Stopped, json!({ "event": "stop" }))
            .await;
        info!(
            "Stream '{}' stopped after {} frames",
            self.stream.name, self.frames_published
        );
    }

    async fn on_read_failure(&mut self, cancel: &CancellationToken) {
        self.fail_count += 1;
        self.state = IngestState::Failing;

        if self.config.warn_every_failures > 0
            && self.fail_count % self.config.warn_every_failures == 0
        {
            warn!(
                "Stream '{}' read failed x{}, retrying",
                self.stream.name, self.fail_count
            );
        }

        if self.fail_count >= self.config.reopen_after_failures {
            info!(
                "Reopening stream '{}' due to repeated read failures",
                self.stream.name
            );
            self.state = IngestState::Reopening;
            self.reopen(cancel).await;
        }

        pause(cancel, self.config.failure_backoff()).await;
    }

    async fn reopen(&mut self, cancel: &CancellationToken) {
        if let Some(mut source) = self.source.take() {
            source.release().await;
        }

        self.reopen_tries += 1;
        if self.transport == Transport::Udp
            && self.reopen_tries >= self.config.tcp_fallback_after_reopens
        {
            self.transport = Transport::Tcp;
            info!(
                "Switching stream '{}' to tcp after {} reopen attempts",
                self.stream.name, self.reopen_tries
            );
        }

        pause(cancel, self.config.reopen_backoff()).await;
        if cancel.is_cancelled() {
            return;
        }

        match self.opener.open(&self.stream, self.transport).await {
            Ok(source) => {
                self.source = Some(source);
                self.state = IngestState::Streaming;
                info!(
                    "Stream '{}' recovered after {} failures",
                    self.stream.name, self.fail_count
                );
                self.fail_count = 0;
            }
            Err(e) => {
                warn!(
                    "Reopen {} of stream '{}' failed: {}",
                    self.reopen_tries, self.stream.name, e
                );
                self.state = IngestState::Reopening;
            }
        }
    }

    async fn accept(&mut self, frame: Frame, cancel: &CancellationToken) {
        if self.fail_count > 0 {
            info!(
                "Stream '{}' read recovered after {} failures",
                self.stream.name, self.fail_count
            );
            self.fail_count = 0;
        }
        self.state = IngestState::Streaming;

        if let Some(last) = self.last_accepted {
            let interval = self.stream.frame_interval();
            let elapsed = last.elapsed();
            if elapsed < interval {
                pause(cancel, interval - elapsed).await;
            }
        }
        self.last_accepted = Some(Instant::now());

        self.publish(frame).await;
    }

    async fn publish(&mut self, frame: Frame) {
        let meta = frame.meta();
        let quality = self.config.jpeg_quality;

        let encoded = tokio::task::spawn_blocking(move || frame.encode_jpeg(quality)).await;
        let jpeg = match encoded {
            Ok(Ok(jpeg)) => Bytes::from(jpeg),
            Ok(Err(e)) => {
                warn!("Stream '{}' frame not published: {}", self.stream.name, e);
                return;
            }
            Err(e) => {
                warn!("Stream '{}' encode task failed: {}", self.stream.name, e);
                return;
            }
        };

        let name = &self.stream.name;
        absorb("raw frame", self.bus.push_frame(name, jpeg).await);
        absorb(
            "capture metadata",
            self.bus.set_json(&keys::capture_meta(name), &meta).await,
        );

        self.frames_published += 1;
        debug!(
            "Stream '{}' published frame {} ({}x{})",
            name, self.frames_published, meta.w, meta.h
        );
    }

    async fn probe(&self, status: ProbeStatus, details: serde_json::Value) {
        absorb(
            "probe",
            self.bus
                .publish_probe(&self.stream.name, status, details)
                .await,
        );
    }
}

/// Sleep that ends early on cancellation
async fn pause(cancel: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}
