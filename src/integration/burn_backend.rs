//! Burn inference backend for the keypoint network.
//!
//! This module provides a `BurnHeatmapModel` that implements `HeatmapModel`
//! for pose networks built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use posetrack_rs::integration::{BurnHeatmapModel, BurnPoseModel, HeatmapExtractor};
//! use burn::backend::NdArray;
//!
//! // Implement BurnPoseModel for your network
//! struct OpenPoseLite { /* ... */ }
//!
//! impl BurnPoseModel<NdArray> for OpenPoseLite {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> burn::tensor::Tensor<NdArray, 4> {
//!         // Run inference
//!     }
//! }
//!
//! let model = BurnHeatmapModel::new(OpenPoseLite::load("graph.mpk"), Default::default());
//! let extractor = HeatmapExtractor::new(model);
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use ndarray::{Array3, Array4};

use super::HeatmapModel;
use crate::error::ExtractionError;

/// Trait for Burn-based keypoint networks.
pub trait BurnPoseModel<B: Backend>: Send + Sync {
    /// Run forward pass.
    ///
    /// # Arguments
    /// * `input` - Tensor of shape [1, 3, height, width]
    ///
    /// # Returns
    /// Heatmaps of shape [1, parts, out_height, out_width], body parts first.
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Burn-based network implementing `HeatmapModel`.
pub struct BurnHeatmapModel<B: Backend, M: BurnPoseModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnPoseModel<B>> BurnHeatmapModel<B, M> {
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    fn to_tensor(&self, input: &Array4<f32>) -> Tensor<B, 4> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([n, c, h, w])
    }
}

impl<B: Backend, M: BurnPoseModel<B>> HeatmapModel for BurnHeatmapModel<B, M> {
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array3<f32>, ExtractionError> {
        let output = self.model.forward(self.to_tensor(input));
        let [batch, parts, height, width] = output.dims();
        if batch != 1 {
            return Err(ExtractionError::Inference(format!(
                "expected a single heatmap batch, got {batch}"
            )));
        }

        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| ExtractionError::Inference(format!("{err:?}")))?;
        Array3::from_shape_vec((parts, height, width), values)
            .map_err(|err| ExtractionError::Inference(err.to_string()))
    }
}
