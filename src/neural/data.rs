// projeto: mfcccnn
// file: src/neural/data.rs
// Feature dataset loading, per-sample feature files and the train/validation/test split

use log::{debug, info};
use ndarray::{Array3, Array4, ArrayD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::neural::utils::{add_trailing_axis, ClassifierError};

#[derive(Debug, Deserialize)]
struct RawDataset {
    mfcc: Vec<Vec<Vec<f32>>>,
    labels: Vec<i64>,
    #[serde(default)]
    mapping: Vec<String>,
}

/// MFCC frames `[segments, time_steps, coefficients]` with one label per segment.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub mfcc: Array3<f32>,
    pub labels: Vec<usize>,
    pub mapping: Vec<String>,
    pub num_classes: usize,
}

impl FeatureRecord {
    pub fn new(mfcc: Array3<f32>, labels: Vec<usize>, mapping: Vec<String>) -> Result<Self, ClassifierError> {
        if mfcc.len_of(Axis(0)) != labels.len() {
            return Err(ClassifierError::Schema(format!(
                "{} MFCC segments but {} labels",
                mfcc.len_of(Axis(0)),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(ClassifierError::Schema("dataset contains no examples".into()));
        }

        let highest = labels.iter().copied().max().unwrap_or(0);
        let num_classes = if mapping.is_empty() { (highest + 1).max(2) } else { mapping.len() };
        if highest >= num_classes {
            return Err(ClassifierError::Schema(format!(
                "label {} is outside the {} known classes",
                highest, num_classes
            )));
        }

        Ok(Self { mfcc, labels, mapping, num_classes })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(time_steps, coefficients)` of every segment.
    pub fn frame_shape(&self) -> (usize, usize) {
        let (_, t, c) = self.mfcc.dim();
        (t, c)
    }
}

pub fn load_feature_dataset(path: &Path) -> Result<FeatureRecord, ClassifierError> {
    info!("📥 [DataLoader] Loading feature dataset from {}", path.display());

    let content = fs::read_to_string(path)?;
    let raw: RawDataset = serde_json::from_str(&content)?;

    let mfcc = stack_segments(raw.mfcc)?;
    let labels = raw
        .labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            usize::try_from(label)
                .map_err(|_| ClassifierError::Schema(format!("label {} at index {} is negative", label, i)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let record = FeatureRecord::new(mfcc, labels, raw.mapping)?;
    let (t, c) = record.frame_shape();
    info!(
        "✅ [DataLoader] {} examples of {}x{} MFCC frames, {} classes",
        record.len(),
        t,
        c,
        record.num_classes
    );
    Ok(record)
}

fn stack_segments(segments: Vec<Vec<Vec<f32>>>) -> Result<Array3<f32>, ClassifierError> {
    let n = segments.len();
    let t = segments.first().map(|s| s.len()).unwrap_or(0);
    let c = segments.first().and_then(|s| s.first()).map(|f| f.len()).unwrap_or(0);
    if n == 0 || t == 0 || c == 0 {
        return Err(ClassifierError::Schema(format!("empty MFCC array of shape [{}, {}, {}]", n, t, c)));
    }

    let mut flat = Vec::with_capacity(n * t * c);
    for (i, segment) in segments.into_iter().enumerate() {
        if segment.len() != t {
            return Err(ClassifierError::Schema(format!(
                "segment {} has {} frames, expected {}",
                i,
                segment.len(),
                t
            )));
        }
        for (j, frame) in segment.into_iter().enumerate() {
            if frame.len() != c {
                return Err(ClassifierError::Schema(format!(
                    "segment {} frame {} has {} coefficients, expected {}",
                    i,
                    j,
                    frame.len(),
                    c
                )));
            }
            flat.extend(frame);
        }
    }

    Ok(Array3::from_shape_vec((n, t, c), flat)?)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MfccPayload {
    Batch(Vec<Vec<Vec<f32>>>),
    Single(Vec<Vec<f32>>),
}

#[derive(Debug, Deserialize)]
struct RawSample {
    mfcc: MfccPayload,
}

/// Features read from one inference file, rank 2 (`[T, C]`) or rank 3 (`[S, T, C]`).
#[derive(Debug, Clone)]
pub struct SampleFeatures {
    pub mfcc: ArrayD<f32>,
}

impl SampleFeatures {
    /// Same reshape as training: one trailing axis, no batch axis added.
    pub fn into_model_input(self) -> ArrayD<f32> {
        add_trailing_axis(self.mfcc)
    }
}

pub fn load_sample_features(path: &Path) -> Result<SampleFeatures, ClassifierError> {
    debug!("📥 [DataLoader] Reading sample features from {}", path.display());

    let content = fs::read_to_string(path)?;
    let raw: RawSample = serde_json::from_str(&content)?;

    let mfcc = match raw.mfcc {
        MfccPayload::Batch(segments) => stack_segments(segments)?.into_dyn(),
        MfccPayload::Single(frames) => stack_segments(vec![frames])?.index_axis_move(Axis(0), 0).into_dyn(),
    };
    Ok(SampleFeatures { mfcc })
}

/// One partition of the split, features shaped `[n, T, C, 1]`.
#[derive(Debug, Clone)]
pub struct Partition {
    pub features: Array4<f32>,
    pub labels: Vec<usize>,
}

impl Partition {
    fn select(record: &FeatureRecord, indices: &[usize]) -> Self {
        let features = record.mfcc.select(Axis(0), indices).insert_axis(Axis(3));
        let labels = indices.iter().map(|&i| record.labels[i]).collect();
        Self { features, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(T, C, 1)`
    pub fn input_shape(&self) -> [usize; 3] {
        let (_, t, c, one) = self.features.dim();
        [t, c, one]
    }

    /// Flattened features and labels of the given rows, in that order.
    pub fn gather(&self, rows: &[usize]) -> (Vec<f32>, Vec<i64>) {
        let [t, c, one] = self.input_shape();
        let mut values = Vec::with_capacity(rows.len() * t * c * one);
        let mut labels = Vec::with_capacity(rows.len());
        for &row in rows {
            values.extend(self.features.index_axis(Axis(0), row).iter().copied());
            labels.push(self.labels[row] as i64);
        }
        (values, labels)
    }
}

#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub train: Partition,
    pub validation: Partition,
    pub test: Partition,
}

impl SplitDataset {
    pub fn input_shape(&self) -> [usize; 3] {
        self.train.input_shape()
    }
}

/// Shuffles `0..n` with the seed and holds out `ceil(fraction * n)` of it.
fn shuffle_split(indices: &[usize], fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>), ClassifierError> {
    let n = indices.len();
    // Products like 0.3 * 100 land just above the integer.
    let n_held = (fraction * n as f64 - 1e-9).ceil() as usize;
    if n_held == 0 || n_held >= n {
        return Err(ClassifierError::Config(format!(
            "a fraction of {} over {} examples leaves an empty partition",
            fraction, n
        )));
    }

    let mut shuffled = indices.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let kept = shuffled.split_off(n_held);
    Ok((kept, shuffled))
}

pub fn split_dataset(
    record: &FeatureRecord,
    test_size: f64,
    validation_size: f64,
    seed: u64,
) -> Result<SplitDataset, ClassifierError> {
    let all: Vec<usize> = (0..record.len()).collect();
    let (train_idx, test_idx) = shuffle_split(&all, test_size, seed)?;
    let (train_idx, validation_idx) = shuffle_split(&train_idx, validation_size, seed)?;

    let split = SplitDataset {
        train: Partition::select(record, &train_idx),
        validation: Partition::select(record, &validation_idx),
        test: Partition::select(record, &test_idx),
    };
    info!(
        "✅ [DataLoader] Split - Train: {} | Validation: {} | Test: {}",
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );
    Ok(split)
}
