#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{non_max_suppression, Detection, PixelBox};
use crate::raster::PixelArray;

const INPUT_SIZE: u32 = 640;
const PAD_VALUE: u8 = 114;
const IOU_THRESHOLD: f64 = 0.7;
const MAX_DETECTIONS: usize = 300;

/// Tract-based backend for YOLO-family ONNX detectors.
///
/// Expects a `[1, 3, 640, 640]` float input (RGB, 0..1) and a
/// `[1, 4 + classes, anchors]` output of `cx, cy, w, h` plus per-class
/// scores in input pixels. The whole raster is letterboxed into the input.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_size: u32,
}

/// Placement of the raster inside the square model input.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f64,
    new_w: u32,
    new_h: u32,
    left: u32,
    top: u32,
}

impl Letterbox {
    fn new(width: u32, height: u32, target: u32) -> Self {
        let target_f = target as f64;
        let scale = (target_f / width as f64).min(target_f / height as f64);
        let new_w = ((width as f64 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f64 * scale).round() as u32).clamp(1, target);
        let pad_w = (target - new_w) as f64 / 2.0;
        let pad_h = (target - new_h) as f64 / 2.0;
        Self {
            scale,
            new_w,
            new_h,
            left: (pad_w - 0.1).round().max(0.0) as u32,
            top: (pad_h - 0.1).round().max(0.0) as u32,
        }
    }

    /// Model-input coordinates back to raster pixels.
    fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.left as f64) / self.scale,
            (y - self.top as f64) / self.scale,
        )
    }
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!("tract backend: loaded {}", model_path.display());
        Ok(Self {
            model,
            input_size: INPUT_SIZE,
        })
    }

    fn build_input(&self, image: &PixelArray) -> Result<(Tensor, Letterbox)> {
        let source = RgbImage::from_raw(image.width(), image.height(), image.as_slice().to_vec())
            .ok_or_else(|| {
                anyhow!(
                    "pixel buffer does not match {}x{}",
                    image.width(),
                    image.height()
                )
            })?;

        let letterbox = Letterbox::new(image.width(), image.height(), self.input_size);
        let resized = imageops::resize(
            &source,
            letterbox.new_w,
            letterbox.new_h,
            imageops::FilterType::Triangle,
        );

        let mut canvas =
            RgbImage::from_pixel(self.input_size, self.input_size, Rgb([PAD_VALUE; 3]));
        imageops::overlay(
            &mut canvas,
            &resized,
            letterbox.left as i64,
            letterbox.top as i64,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok((input.into_tensor(), letterbox))
    }

    fn decode(
        outputs: TVec<TValue>,
        letterbox: Letterbox,
        image: &PixelArray,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        // [1, 4 + nc, anchors]; some exports transpose to [1, anchors, 4 + nc].
        let transposed = shape[1] > shape[2];
        let (features, anchors) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if features < 5 {
            return Err(anyhow!("detector output has {} features, need >= 5", features));
        }
        let at = |f: usize, a: usize| {
            if transposed {
                view[[0, a, f]]
            } else {
                view[[0, f, a]]
            }
        };

        let max_x = image.width() as f64;
        let max_y = image.height() as f64;
        let mut candidates = Vec::new();
        for a in 0..anchors {
            let (class_id, score) = (4..features)
                .map(|f| (f - 4, at(f, a)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if score.is_nan() || score <= confidence_threshold {
                continue;
            }
            let (cx, cy) = (at(0, a) as f64, at(1, a) as f64);
            let (w, h) = (at(2, a) as f64, at(3, a) as f64);
            let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
            let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
            let Ok(bbox) = PixelBox::new(
                x1.clamp(0.0, max_x),
                y1.clamp(0.0, max_y),
                x2.clamp(0.0, max_x),
                y2.clamp(0.0, max_y),
            ) else {
                continue;
            };
            candidates.push(Detection {
                bbox,
                class_id: class_id as u32,
                confidence: score.min(1.0),
            });
        }

        Ok(non_max_suppression(candidates, IOU_THRESHOLD, MAX_DETECTIONS))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(
        &mut self,
        image: &PixelArray,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        Self::decode(outputs, letterbox, image, confidence_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = PixelArray::filled(self.input_size, self.input_size, [0, 0, 0]);
        self.predict(&blank, 1.0).map(|_| ())
    }
}
