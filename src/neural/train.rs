// projeto: mfcccnn
// file: src/neural/train.rs
// Adam training loop with sparse cross-entropy, evaluation and sample predictions

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use log::{debug, info};
use ndarray::{ArrayD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use crate::neural::config::TrainConfig;
use crate::neural::data::{Partition, SplitDataset};
use crate::neural::metrics::{EpochMetrics, Evaluation, TrainingHistory};
use crate::neural::model::{Classifier, MfccCnn};
use crate::neural::utils::{format_labels, ClassifierError};

/// Tensors for one batch of a partition.
pub struct MfccBatch<B: Backend> {
    pub inputs: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MfccBatch<B> {
    pub fn from_rows(partition: &Partition, rows: &[usize], device: &B::Device) -> Self {
        let [t, c, one] = partition.input_shape();
        let (values, labels) = partition.gather(rows);
        let inputs = Tensor::<B, 4>::from_data(TensorData::new(values, [rows.len(), t, c, one]), device);
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [rows.len()]), device);
        Self { inputs, targets }
    }
}

/// Number of rows whose highest score is the target class.
fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted: Tensor<B, 1, Int> = logits.argmax(1).flatten(0, 1);
    predicted.equal(targets).int().sum().into_scalar().elem::<i64>() as usize
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

/// Loss and accuracy of `model` over a whole partition, computed without touching its parameters.
pub fn evaluate<B: Backend>(
    model: &MfccCnn<B>,
    partition: &Partition,
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation, ClassifierError> {
    if partition.is_empty() {
        return Err(ClassifierError::Training("cannot evaluate an empty partition".into()));
    }

    let loss_fn = CrossEntropyLossConfig::new().init::<B>(device);
    let rows: Vec<usize> = (0..partition.len()).collect();
    let mut loss_sum = 0.0;
    let mut correct = 0;

    for chunk in rows.chunks(batch_size.max(1)) {
        let batch = MfccBatch::<B>::from_rows(partition, chunk, device);
        let logits = model.forward_logits(batch.inputs);
        let loss = scalar(loss_fn.forward(logits.clone(), batch.targets.clone()));
        loss_sum += loss * chunk.len() as f64;
        correct += correct_predictions(logits, batch.targets);
    }

    Ok(Evaluation {
        loss: loss_sum / partition.len() as f64,
        accuracy: correct as f64 / partition.len() as f64,
    })
}

/// Fits `model` on the train partition; validation is only measured once per epoch.
pub fn train<B: AutodiffBackend>(
    mut model: MfccCnn<B>,
    split: &SplitDataset,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<(MfccCnn<B>, TrainingHistory), ClassifierError> {
    if split.train.is_empty() {
        return Err(ClassifierError::Training("train partition is empty".into()));
    }

    let mut optim = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-7)
        .init();
    let loss_fn = CrossEntropyLossConfig::new().init::<B>(device);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order: Vec<usize> = (0..split.train.len()).collect();
    let mut history = TrainingHistory::new();

    info!(
        "🎓 [Trainer] Training for {} epochs, batch size {}, learning rate {}",
        config.epochs, config.batch_size, config.learning_rate
    );

    for epoch in 1..=config.epochs {
        let epoch_start = Instant::now();
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        let mut correct = 0;
        for (step, rows) in order.chunks(config.batch_size.max(1)).enumerate() {
            let batch = MfccBatch::<B>::from_rows(&split.train, rows, device);
            let logits = model.forward_logits(batch.inputs);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value = scalar(loss.clone());
            if !loss_value.is_finite() {
                return Err(ClassifierError::Training(format!(
                    "loss diverged to {} at epoch {} step {}",
                    loss_value,
                    epoch,
                    step + 1
                )));
            }
            loss_sum += loss_value * rows.len() as f64;
            correct += correct_predictions(logits, batch.targets);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);
            debug!("[Trainer] epoch {} step {} loss {:.6}", epoch, step + 1, loss_value);
        }

        let train = Evaluation {
            loss: loss_sum / split.train.len() as f64,
            accuracy: correct as f64 / split.train.len() as f64,
        };
        let validation = evaluate(&model.valid(), &split.validation, config.batch_size, device)?;
        history.push(EpochMetrics { train, validation });

        info!(
            "📈 [Trainer] Epoch {}/{}: loss={:.4} accuracy={:.4} | val_loss={:.4} val_accuracy={:.4} | {:.1}s",
            epoch,
            config.epochs,
            train.loss,
            train.accuracy,
            validation.loss,
            validation.accuracy,
            epoch_start.elapsed().as_secs_f64()
        );
    }

    Ok((model, history))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplePrediction {
    pub index: usize,
    pub target: usize,
    pub predicted: usize,
}

impl std::fmt::Display for SamplePrediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Target: {}, Predicted label: {}", self.target, format_labels(&[self.predicted]))
    }
}

/// Predicts `count` randomly drawn examples one at a time, each as a batch of one.
pub fn sample_predictions<B: Backend, R: Rng>(
    classifier: &Classifier<B>,
    partition: &Partition,
    count: usize,
    rng: &mut R,
    device: &B::Device,
) -> Result<Vec<SamplePrediction>, ClassifierError> {
    if partition.is_empty() {
        return Ok(Vec::new());
    }

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let index = rng.random_range(0..partition.len());
        let example: ArrayD<f32> = partition
            .features
            .index_axis(Axis(0), index)
            .insert_axis(Axis(0))
            .to_owned()
            .into_dyn();
        let predicted = classifier.predict(&example, device)?;
        samples.push(SamplePrediction {
            index,
            target: partition.labels[index],
            predicted: predicted[0],
        });
    }
    Ok(samples)
}
