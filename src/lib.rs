// projeto: mfcccnn
// file: src/lib.rs
// MFCC audio classifier: CNN training pipeline and polling inference

use burn::backend::{Autodiff, NdArray};

pub mod neural;

/// CPU backend used for evaluation and inference.
pub type InferenceBackend = NdArray<f32>;
/// Backend with gradient tracking used by the trainer.
pub type TrainingBackend = Autodiff<InferenceBackend>;
