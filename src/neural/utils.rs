// projeto: mfcccnn
// file: src/neural/utils.rs
// Error handling and small array helpers shared by training and inference

use ndarray::{ArrayD, Axis, ShapeError};
use serde_json::error::Category;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Poller aborted at counter {counter}: {reason}")]
    Aborted { counter: u64, reason: String },
}

impl From<ShapeError> for ClassifierError {
    fn from(err: ShapeError) -> Self {
        ClassifierError::Shape(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifierError {
    // Well-formed JSON with the wrong fields is a schema problem, not a parse problem.
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => ClassifierError::Schema(err.to_string()),
            Category::Io => ClassifierError::Io(std::io::Error::from(err)),
            Category::Syntax | Category::Eof => ClassifierError::Json(err),
        }
    }
}

/// Appends a trailing axis of length 1, `[.., C] -> [.., C, 1]`.
pub fn add_trailing_axis(array: ArrayD<f32>) -> ArrayD<f32> {
    let axis = Axis(array.ndim());
    array.insert_axis(axis)
}

/// Index of the largest value in each row of a row-major `[rows, cols]` buffer.
pub fn argmax_rows(values: &[f32], cols: usize) -> Vec<usize> {
    if cols == 0 {
        return Vec::new();
    }
    values
        .chunks(cols)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}

pub fn format_labels(labels: &[usize]) -> String {
    let joined = labels.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(" ");
    format!("[{}]", joined)
}
