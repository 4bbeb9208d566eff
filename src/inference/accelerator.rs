use super::backend::RawOutput;
use crate::config::{ExtraColumn, InferenceConfig};
use crate::error::InferenceError;
use image::RgbImage;
use std::path::Path;

/// A compiled model loaded on an inference accelerator
pub trait AcceleratorRuntime: Send {
    /// Input (width, height) declared by the compiled model, if it declares one
    fn input_shape(&self) -> Option<(u32, u32)>;

    /// Run one letterboxed RGB input and return the detection head output
    fn run(&mut self, input: &RgbImage) -> Result<RawOutput, InferenceError>;
}

/// Load the compiled model on the accelerator device
pub fn open_accelerator(
    config: &InferenceConfig,
) -> Result<Box<dyn AcceleratorRuntime>, InferenceError> {
    if !Path::new(&config.model_path).is_file() {
        return Err(InferenceError::ArtifactMissing {
            path: config.model_path.clone(),
        });
    }

    #[cfg(all(feature = "gstreamer-source", target_os = "linux"))]
    {
        Ok(Box::new(hailonet::HailoNetRuntime::open(config)?))
    }

    #[cfg(not(all(feature = "gstreamer-source", target_os = "linux")))]
    {
        Err(InferenceError::DeviceUnavailable {
            details: "accelerator support requires the gstreamer-source feature".to_string(),
        })
    }
}

/// Columns per detection in a flat head buffer of `len` floats.
///
/// The device hands back an untyped buffer, so the width is taken from the
/// first convention `extra_column` allows that divides the length evenly.
/// `Auto` tries the plain width before the one with a trailing column.
#[cfg_attr(
    not(all(feature = "gstreamer-source", target_os = "linux")),
    allow(dead_code)
)]
pub(crate) fn head_attributes(
    len: usize,
    num_classes: usize,
    extra_column: ExtraColumn,
) -> Option<usize> {
    let conventional = 4 + num_classes;
    let candidates: &[usize] = match extra_column {
        ExtraColumn::None => &[conventional],
        ExtraColumn::Objectness => &[conventional + 1],
        ExtraColumn::Auto => &[conventional, conventional + 1],
    };

    if len == 0 {
        return None;
    }
    candidates.iter().copied().find(|width| len % width == 0)
}

#[cfg(all(feature = "gstreamer-source", target_os = "linux"))]
mod hailonet {
    use super::{head_attributes, AcceleratorRuntime, RawOutput};
    use crate::config::{ExtraColumn, InferenceConfig};
    use crate::error::InferenceError;
    use gstreamer::prelude::*;
    use gstreamer::{ClockTime, Pipeline};
    use gstreamer_app::{AppSink, AppSrc};
    use image::RgbImage;
    use std::time::Duration;
    use tracing::{debug, info};

    const RUN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Drives the device through `appsrc ! hailonet ! appsink`. The network
    /// is asked for float32 output so the buffer is the raw detection head.
    pub(super) struct HailoNetRuntime {
        pipeline: Pipeline,
        appsrc: AppSrc,
        appsink: AppSink,
        input: Option<(u32, u32)>,
        num_classes: usize,
        extra_column: ExtraColumn,
    }

    impl HailoNetRuntime {
        pub(super) fn open(config: &InferenceConfig) -> Result<Self, InferenceError> {
            let unavailable = |details: String| InferenceError::DeviceUnavailable { details };

            gstreamer::init().map_err(|e| unavailable(format!("GStreamer init: {}", e)))?;
            if gstreamer::ElementFactory::find("hailonet").is_none() {
                return Err(unavailable("hailonet element not installed".to_string()));
            }

            let device = config
                .device_id
                .as_ref()
                .map(|id| format!(" device-id={}", id))
                .unwrap_or_default();
            let description = format!(
                "appsrc name=src is-live=false format=time ! \
                 hailonet name=net hef-path={}{} output-format-type=HAILO_FORMAT_TYPE_FLOAT32 ! \
                 appsink name=sink sync=false max-buffers=1 drop=false",
                config.model_path, device
            );
            debug!("Creating accelerator pipeline: {}", description);

            let pipeline = gstreamer::parse::launch(&description)
                .map_err(|e| InferenceError::ModelLoad {
                    details: format!("Failed to create pipeline: {}", e),
                })?
                .downcast::<Pipeline>()
                .map_err(|_| unavailable("Failed to downcast to Pipeline".to_string()))?;

            let appsrc = pipeline
                .by_name("src")
                .and_then(|e| e.downcast::<AppSrc>().ok())
                .ok_or_else(|| unavailable("appsrc element missing".to_string()))?;
            let appsink = pipeline
                .by_name("sink")
                .and_then(|e| e.downcast::<AppSink>().ok())
                .ok_or_else(|| unavailable("appsink element missing".to_string()))?;
            let net = pipeline
                .by_name("net")
                .ok_or_else(|| unavailable("hailonet element missing".to_string()))?;

            // READY loads the HEF and opens the device
            pipeline
                .set_state(gstreamer::State::Ready)
                .map_err(|e| unavailable(format!("Failed to configure device: {}", e)))?;

            let input = declared_input(&net);
            let (width, height) = input.unwrap_or((
                config.default_input_size,
                config.default_input_size,
            ));
            let caps = gstreamer::Caps::builder("video/x-raw")
                .field("format", "RGB")
                .field("width", width as i32)
                .field("height", height as i32)
                .field("framerate", gstreamer::Fraction::new(0, 1))
                .build();
            appsrc.set_caps(Some(&caps));

            pipeline.set_state(gstreamer::State::Playing).map_err(|e| {
                let _ = pipeline.set_state(gstreamer::State::Null);
                unavailable(format!("Failed to start device pipeline: {}", e))
            })?;

            info!(
                "Loaded {} on accelerator ({}x{} input)",
                config.model_path, width, height
            );

            Ok(Self {
                pipeline,
                appsrc,
                appsink,
                input,
                num_classes: config.num_classes,
                extra_column: config.extra_column,
            })
        }
    }

    /// Width/height the network's sink pad accepts, when fixed
    fn declared_input(net: &gstreamer::Element) -> Option<(u32, u32)> {
        let caps = net.static_pad("sink")?.query_caps(None);
        let structure = caps.structure(0)?;
        let width = structure.get::<i32>("width").ok()?;
        let height = structure.get::<i32>("height").ok()?;
        (width > 0 && height > 0).then_some((width as u32, height as u32))
    }

    impl AcceleratorRuntime for HailoNetRuntime {
        fn input_shape(&self) -> Option<(u32, u32)> {
            self.input
        }

        fn run(&mut self, input: &RgbImage) -> Result<RawOutput, InferenceError> {
            let run_error = |details: String| InferenceError::Run { details };

            let buffer = gstreamer::Buffer::from_mut_slice(input.as_raw().clone());
            self.appsrc
                .push_buffer(buffer)
                .map_err(|e| run_error(format!("push failed: {:?}", e)))?;

            let sample = self
                .appsink
                .try_pull_sample(ClockTime::from_mseconds(RUN_TIMEOUT.as_millis() as u64))
                .ok_or_else(|| run_error("no output within timeout".to_string()))?;
            let buffer = sample
                .buffer()
                .ok_or_else(|| run_error("output sample has no buffer".to_string()))?;
            let map = buffer
                .map_readable()
                .map_err(|e| run_error(format!("Failed to map output: {}", e)))?;

            let data: Vec<f32> = map
                .as_slice()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            let attributes = head_attributes(data.len(), self.num_classes, self.extra_column)
                .ok_or_else(|| InferenceError::OutputShape {
                    shape: vec![data.len()],
                    expected: 4 + self.num_classes,
                })?;

            Ok(RawOutput {
                shape: vec![attributes, data.len() / attributes],
                data,
            })
        }
    }

    impl Drop for HailoNetRuntime {
        fn drop(&mut self) {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }
}
