use super::source::FrameSource;
use crate::config::{IngestConfig, StreamConfig, Transport};
use crate::error::IngestError;
use crate::frame::Frame;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageView, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// GStreamer capture handle decoding to RGB at the stream's configured size.
///
/// The appsink holds a single buffer and drops older ones, so every read
/// yields the newest decoded frame.
pub struct GstSource {
    url: String,
    pipeline: Pipeline,
    appsink: AppSink,
    read_timeout: Duration,
}

impl GstSource {
    pub async fn open(
        stream: &StreamConfig,
        transport: Transport,
        config: &IngestConfig,
    ) -> Result<Self, IngestError> {
        let description = pipeline_description(stream, transport);
        let url = stream.url.clone();
        let open_timeout = config.open_timeout();
        let read_timeout = config.read_timeout();

        tokio::task::spawn_blocking(move || {
            Self::open_blocking(url, transport, &description, open_timeout, read_timeout)
        })
        .await
        .map_err(|e| IngestError::Pipeline {
            details: format!("open task failed: {}", e),
        })?
    }

    fn open_blocking(
        url: String,
        transport: Transport,
        description: &str,
        open_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, IngestError> {
        let open_failed = |details: String| IngestError::OpenFailed {
            url: url.clone(),
            transport: transport.to_string(),
            details,
        };

        gstreamer::init().map_err(|e| open_failed(format!("GStreamer init: {}", e)))?;

        debug!("Creating GStreamer pipeline: {}", description);
        let pipeline = gstreamer::parse::launch(description)
            .map_err(|e| open_failed(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_failed("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_failed("appsink element missing".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| open_failed("Failed to downcast to AppSink".to_string()))?;

        let source = Self {
            url: url.clone(),
            pipeline,
            appsink,
            read_timeout,
        };

        if let Err(e) = source.pipeline.set_state(gstreamer::State::Playing) {
            source.shutdown();
            return Err(open_failed(format!("Failed to start pipeline: {}", e)));
        }

        let (result, current, _pending) = source
            .pipeline
            .state(ClockTime::from_mseconds(open_timeout.as_millis() as u64));
        if let Err(e) = result {
            let details = source
                .pending_error()
                .unwrap_or_else(|| format!("state change failed: {}", e));
            source.shutdown();
            return Err(open_failed(details));
        }
        if let Some(details) = source.pending_error() {
            source.shutdown();
            return Err(open_failed(details));
        }

        info!("Opened {} over {} (pipeline {:?})", url, transport, current);
        Ok(source)
    }

    /// First error or EOS waiting on the pipeline bus
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        while let Some(message) = bus.timed_pop(ClockTime::ZERO) {
            match message.view() {
                MessageView::Error(err) => {
                    return Some(format!(
                        "error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => return Some("end of stream".to_string()),
                _ => {}
            }
        }
        None
    }

    fn shutdown(&self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            debug!("Failed to stop pipeline for {}: {}", self.url, e);
        }
    }
}

#[async_trait]
impl FrameSource for GstSource {
    async fn read(&mut self) -> Option<Frame> {
        if let Some(details) = self.pending_error() {
            debug!("Source {} reported: {}", self.url, details);
            return None;
        }

        let appsink = self.appsink.clone();
        let timeout = ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let sample = tokio::task::spawn_blocking(move || appsink.try_pull_sample(timeout))
            .await
            .ok()
            .flatten()?;

        match sample_to_frame(&sample) {
            Ok(frame) => {
                trace!("Pulled {}x{} frame from {}", frame.width(), frame.height(), self.url);
                Some(frame)
            }
            Err(e) => {
                warn!("Dropping unreadable sample from {}: {}", self.url, e);
                None
            }
        }
    }

    async fn release(&mut self) {
        self.shutdown();
        debug!("Released source {}", self.url);
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// Launch description for a stream: `rtspsrc` with an explicit transport for
/// RTSP URLs, `uridecodebin` for anything else.
pub(crate) fn pipeline_description(stream: &StreamConfig, transport: Transport) -> String {
    let head = if stream.url.starts_with("rtsp://") || stream.url.starts_with("rtsps://") {
        format!(
            "rtspsrc location={} protocols={} latency=0 drop-on-latency=true ! decodebin",
            stream.url, transport
        )
    } else {
        format!("uridecodebin uri={}", stream.url)
    };

    format!(
        "{} ! videoconvert ! videoscale ! \
         video/x-raw,format=RGB,width={},height={} ! \
         appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
        head, stream.width, stream.height
    )
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame, IngestError> {
    let buffer = sample.buffer().ok_or_else(|| IngestError::Pipeline {
        details: "No buffer in sample".to_string(),
    })?;
    let caps = sample.caps().ok_or_else(|| IngestError::Pipeline {
        details: "No caps in sample".to_string(),
    })?;
    let info = VideoInfo::from_caps(caps).map_err(|e| IngestError::Pipeline {
        details: format!("Failed to get video info: {}", e),
    })?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().map_err(|e| IngestError::Pipeline {
        details: format!("Failed to map buffer: {}", e),
    })?;
    let data = map.as_slice();

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| IngestError::Pipeline {
                details: format!("short buffer ({} bytes)", data.len()),
            })?
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let line = data
                .get(start..start + row_bytes)
                .ok_or_else(|| IngestError::Pipeline {
                    details: format!("short buffer at row {}", row),
                })?;
            pixels.extend_from_slice(line);
        }
        pixels
    };

    Frame::from_rgb(width, height, pixels).map_err(|e| IngestError::Pipeline {
        details: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtsp_description_carries_transport() {
        let stream = StreamConfig::new("door", "rtsp://10.0.0.5/live");
        let description = pipeline_description(&stream, Transport::Udp);

        assert!(description.starts_with("rtspsrc location=rtsp://10.0.0.5/live protocols=udp"));
        assert!(description.contains("width=1280,height=720"));
        assert!(description.contains("max-buffers=1 drop=true"));
    }

    #[test]
    fn test_file_description_uses_uridecodebin() {
        let stream = StreamConfig::new("clip", "file:///tmp/clip.mp4");
        let description = pipeline_description(&stream, Transport::Tcp);

        assert!(description.starts_with("uridecodebin uri=file:///tmp/clip.mp4"));
        assert!(!description.contains("protocols"));
    }
}
