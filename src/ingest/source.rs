use super::synthetic::SyntheticSource;
use crate::config::{IngestConfig, StreamConfig, Transport};
use crate::error::IngestError;
use crate::frame::Frame;
use async_trait::async_trait;

/// An open capture handle
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Newest decoded frame; `None` when the source is starved or broken
    async fn read(&mut self) -> Option<Frame>;

    /// Tear down the capture handle. Reads after release return `None`.
    async fn release(&mut self);
}

/// Opens capture handles for a stream over a given transport
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(
        &self,
        stream: &StreamConfig,
        transport: Transport,
    ) -> Result<Box<dyn FrameSource>, IngestError>;
}

/// Picks the source implementation from the URL scheme.
///
/// `stub://` opens a synthetic source; everything else needs the GStreamer
/// backend.
pub struct UrlSourceOpener {
    #[cfg_attr(
        not(all(feature = "gstreamer-source", target_os = "linux")),
        allow(dead_code)
    )]
    config: IngestConfig,
}

impl UrlSourceOpener {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceOpener for UrlSourceOpener {
    async fn open(
        &self,
        stream: &StreamConfig,
        transport: Transport,
    ) -> Result<Box<dyn FrameSource>, IngestError> {
        if stream.url.starts_with("stub://") {
            return Ok(Box::new(SyntheticSource::new(stream.width, stream.height)));
        }

        #[cfg(all(feature = "gstreamer-source", target_os = "linux"))]
        {
            let source = super::gst::GstSource::open(stream, transport, &self.config).await?;
            Ok(Box::new(source))
        }

        #[cfg(not(all(feature = "gstreamer-source", target_os = "linux")))]
        {
            let _ = transport;
            Err(IngestError::UnsupportedSource {
                url: stream.url.clone(),
            })
        }
    }
}
