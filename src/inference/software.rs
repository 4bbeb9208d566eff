use super::backend::RawOutput;
use crate::config::InferenceConfig;
use crate::error::InferenceError;
use image::RgbImage;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tract_onnx::prelude::*;

/// ONNX model on the CPU via tract, with a fixed `1x3xSxS` float input
pub struct SoftwareRuntime {
    plan: TypedRunnableModel<TypedModel>,
    size: u32,
}

impl SoftwareRuntime {
    /// Fetch the model if needed and prepare it for inference
    pub fn load(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let path = ensure_model(
            &config.software_model_url,
            Path::new(&config.software_model_path),
            config.software_min_model_bytes,
        )?;
        Self::from_path(&path, config.default_input_size)
    }

    pub fn from_path(path: &Path, size: u32) -> Result<Self, InferenceError> {
        let load_error = |stage: &str, e: TractError| InferenceError::ModelLoad {
            details: format!("{} {}: {}", stage, path.display(), e),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| load_error("failed to load", e))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, size as usize, size as usize),
                ),
            )
            .map_err(|e| load_error("failed to set input fact for", e))?
            .into_optimized()
            .map_err(|e| load_error("failed to optimize", e))?
            .into_runnable()
            .map_err(|e| load_error("failed to build runnable", e))?;

        Ok(Self { plan, size })
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.size, self.size)
    }

    pub fn run(&self, input: &RgbImage) -> Result<RawOutput, InferenceError> {
        let run_error = |details: String| InferenceError::Run { details };

        let (width, height) = input.dimensions();
        if (width, height) != (self.size, self.size) {
            return Err(run_error(format!(
                "input {}x{} does not match model input {}x{}",
                width, height, self.size, self.size
            )));
        }

        let pixels = input.as_raw();
        let width = width as usize;
        let tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| pixels[(y * width + x) * 3 + channel] as f32 / 255.0,
        )
        .into_tensor();

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| run_error(format!("ONNX inference failed: {}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| run_error("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| run_error(format!("model output tensor was not f32: {}", e)))?;

        Ok(RawOutput {
            shape: view.shape().to_vec(),
            data: view.iter().copied().collect(),
        })
    }
}

/// Make sure a usable model sits at `path`, downloading it from `url` when it
/// is missing or smaller than `min_bytes`.
pub fn ensure_model(url: &str, path: &Path, min_bytes: u64) -> Result<PathBuf, InferenceError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() >= min_bytes => {
            debug!("Using cached model {} ({} bytes)", path.display(), meta.len());
            return Ok(path.to_path_buf());
        }
        Ok(meta) => warn!(
            "Cached model {} is only {} bytes, downloading again",
            path.display(),
            meta.len()
        ),
        Err(_) => info!("Model {} not cached yet", path.display()),
    }

    let download_error = |details: String| InferenceError::Download {
        url: url.to_string(),
        details,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| download_error(format!("create {}: {}", parent.display(), e)))?;
    }

    info!("Downloading model from {}", url);
    let response = ureq::get(url)
        .call()
        .map_err(|e| download_error(e.to_string()))?;

    let partial = path.with_extension("part");
    let written = File::create(&partial)
        .and_then(|mut file| io::copy(&mut response.into_reader(), &mut file))
        .map_err(|e| download_error(format!("write {}: {}", partial.display(), e)))?;

    if written < min_bytes {
        let _ = fs::remove_file(&partial);
        return Err(download_error(format!(
            "got {} bytes, expected at least {}",
            written, min_bytes
        )));
    }

    fs::rename(&partial, path)
        .map_err(|e| download_error(format!("move into {}: {}", path.display(), e)))?;
    info!("Model saved to {} ({} bytes)", path.display(), written);

    Ok(path.to_path_buf())
}
