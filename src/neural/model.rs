// projeto: mfcccnn
// file: src/neural/model.rs
// Fixed CNN architecture over MFCC frames, its serializable topology and batch prediction

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};
use chrono::Utc;
use log::info;
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

use crate::neural::utils::{argmax_rows, ClassifierError};

pub const ARCHITECTURE: &str = "mfcc-cnn";

const CONV_FILTERS: usize = 32;
const DENSE_UNITS: usize = 64;
const DROPOUT: f64 = 0.3;

// (conv kernel, pool kernel, pool stride) per stage
const STAGES: [(usize, usize, usize); 3] = [(3, 3, 2), (3, 3, 2), (2, 2, 2)];

/// One convolution + max pooling + batch normalization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvStage {
    pub filters: usize,
    pub kernel: [usize; 2],
    pub pool_kernel: [usize; 2],
    pub pool_stride: [usize; 2],
    /// `[before, after]` for rows, then for columns.
    pub pool_padding: [[usize; 2]; 2],
    pub input: [usize; 2],
    pub output: [usize; 2],
}

/// Structural description written next to the weights file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTopology {
    pub architecture: String,
    pub input_shape: [usize; 3],
    pub num_classes: usize,
    pub stages: Vec<ConvStage>,
    pub dense_units: usize,
    pub dropout: f64,
    pub created_at: String,
}

/// "same" pooling padding `[before, after]` giving `ceil(size / stride)` outputs; the odd element goes after.
fn same_padding(size: usize, kernel: usize, stride: usize) -> [usize; 2] {
    let out = size.div_ceil(stride);
    let total = ((out - 1) * stride + kernel).saturating_sub(size);
    [total / 2, total - total / 2]
}

impl ModelTopology {
    pub fn for_input(input_shape: [usize; 3], num_classes: usize) -> Result<Self, ClassifierError> {
        let [time_steps, coefficients, channels] = input_shape;
        if channels != 1 {
            return Err(ClassifierError::Shape(format!(
                "expected input shape (T, C, 1), got {:?}",
                input_shape
            )));
        }
        if num_classes < 2 {
            return Err(ClassifierError::Config(format!("need at least 2 classes, got {}", num_classes)));
        }

        let mut spatial = [time_steps, coefficients];
        let mut stages = Vec::with_capacity(STAGES.len());
        for (i, &(kernel, pool_kernel, pool_stride)) in STAGES.iter().enumerate() {
            if spatial.iter().any(|&s| s < kernel) {
                return Err(ClassifierError::Shape(format!(
                    "input {:?} is too small: stage {} receives {:?} for a {}x{} kernel",
                    input_shape,
                    i + 1,
                    spatial,
                    kernel,
                    kernel
                )));
            }
            let conv = spatial.map(|s| s - kernel + 1);
            let output = conv.map(|s| s.div_ceil(pool_stride));
            stages.push(ConvStage {
                filters: CONV_FILTERS,
                kernel: [kernel, kernel],
                pool_kernel: [pool_kernel, pool_kernel],
                pool_stride: [pool_stride, pool_stride],
                pool_padding: conv.map(|s| same_padding(s, pool_kernel, pool_stride)),
                input: spatial,
                output,
            });
            spatial = output;
        }

        Ok(Self {
            architecture: ARCHITECTURE.to_string(),
            input_shape,
            num_classes,
            stages,
            dense_units: DENSE_UNITS,
            dropout: DROPOUT,
            created_at: Utc::now().to_rfc3339(),
        })
    }

    pub fn flattened_size(&self) -> usize {
        self.stages
            .last()
            .map(|s| s.filters * s.output[0] * s.output[1])
            .unwrap_or_else(|| self.input_shape.iter().product())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MfccCnn<B> {
        let mut channels = self.input_shape[2];
        let blocks = self
            .stages
            .iter()
            .map(|stage| {
                let block = ConvBlock::new(channels, stage, device);
                channels = stage.filters;
                block
            })
            .collect();

        MfccCnn {
            blocks,
            hidden: LinearConfig::new(self.flattened_size(), self.dense_units)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(self.dense_units, self.num_classes)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            activation: Relu::new(),
        }
    }

    /// Layer table in the spirit of a framework `summary()`.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut channels = self.input_shape[2];
        for (i, stage) in self.stages.iter().enumerate() {
            let conv = [stage.input[0] - stage.kernel[0] + 1, stage.input[1] - stage.kernel[1] + 1];
            lines.push(format!(
                "conv2d_{}      ({}x{}, relu)  {}x{}x{} -> {}x{}x{}",
                i + 1,
                stage.kernel[0],
                stage.kernel[1],
                stage.input[0],
                stage.input[1],
                channels,
                conv[0],
                conv[1],
                stage.filters
            ));
            lines.push(format!(
                "max_pool2d_{}  ({}x{}, stride {})  -> {}x{}x{}",
                i + 1,
                stage.pool_kernel[0],
                stage.pool_kernel[1],
                stage.pool_stride[0],
                stage.output[0],
                stage.output[1],
                stage.filters
            ));
            lines.push(format!("batch_norm_{}", i + 1));
            channels = stage.filters;
        }
        lines.push(format!("flatten       -> {}", self.flattened_size()));
        lines.push(format!("dense         ({}, relu)", self.dense_units));
        lines.push(format!("dropout       ({})", self.dropout));
        lines.push(format!("dense         ({}, softmax)", self.num_classes));
        lines
    }
}

/// Max over windows of the last axis built from slices and `max_pair` only.
fn pool_last_axis<B: Backend>(input: Tensor<B, 4>, kernel: usize, stride: usize, pad: [usize; 2]) -> Tensor<B, 4> {
    let [n, c, h, w] = input.dims();
    let padded = w + pad[0] + pad[1];
    let out = (padded - kernel) / stride + 1;
    // each offset slice spans out * stride columns
    let tail = pad[1] + (out * stride + kernel - 1).saturating_sub(padded);
    let device = input.device();

    let mut parts: Vec<Tensor<B, 4>> = Vec::with_capacity(3);
    if pad[0] > 0 {
        parts.push(Tensor::zeros([n, c, h, pad[0]], &device));
    }
    parts.push(input);
    if tail > 0 {
        parts.push(Tensor::zeros([n, c, h, tail], &device));
    }
    let x = Tensor::cat(parts, 3);

    let window = |offset: usize| {
        x.clone()
            .slice([0..n, 0..c, 0..h, offset..offset + out * stride])
            .reshape([n, c, h * out, stride])
            .slice([0..n, 0..c, 0..h * out, 0..1])
            .reshape([n, c, h, out])
    };
    (1..kernel).fold(window(0), |acc, offset| acc.max_pair(window(offset)))
}

/// Max pooling with "same" padding placed `[before, after]` on each axis.
/// Inputs come out of a ReLU, so a zero pad never wins a window.
#[derive(Module, Clone, Debug)]
pub struct SamePool2d {
    kernel: [usize; 2],
    stride: [usize; 2],
    pad_rows: [usize; 2],
    pad_cols: [usize; 2],
}

impl SamePool2d {
    pub fn new(kernel: [usize; 2], stride: [usize; 2], padding: [[usize; 2]; 2]) -> Self {
        Self { kernel, stride, pad_rows: padding[0], pad_cols: padding[1] }
    }

    /// `[N, C, H, W]` -> `[N, C, ceil(H / sh), ceil(W / sw)]`
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = pool_last_axis(input, self.kernel[1], self.stride[1], self.pad_cols);
        pool_last_axis(x.swap_dims(2, 3), self.kernel[0], self.stride[0], self.pad_rows).swap_dims(2, 3)
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: SamePool2d,
    norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(in_channels: usize, stage: &ConvStage, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, stage.filters], stage.kernel)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        let pool = SamePool2d::new(stage.pool_kernel, stage.pool_stride, stage.pool_padding);
        // momentum 0.01 on the batch statistic, epsilon 1e-3
        let norm = BatchNormConfig::new(stage.filters)
            .with_momentum(0.01)
            .with_epsilon(1e-3)
            .init(device);

        Self { conv, pool, norm, activation: Relu::new() }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);
        self.norm.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct MfccCnn<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    hidden: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> MfccCnn<B> {
    /// Unnormalized class scores for a channels-last batch `[N, T, C, 1]`.
    pub fn forward_logits(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        // [N, T, C, 1] -> [N, 1, T, C]
        let mut x = input.swap_dims(1, 3).swap_dims(2, 3);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.activation.forward(self.hidden.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Class probabilities `[N, num_classes]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(input), 1)
    }
}

/// A model together with the topology it was built from.
#[derive(Debug, Clone)]
pub struct Classifier<B: Backend> {
    pub model: MfccCnn<B>,
    pub topology: ModelTopology,
}

impl<B: Backend> Classifier<B> {
    pub fn new(topology: ModelTopology, device: &B::Device) -> Self {
        let model = topology.init(device);
        info!(
            "🛠️ [Model] {} for input {:?}, {} classes, {} parameters",
            topology.architecture,
            topology.input_shape,
            topology.num_classes,
            model.num_params()
        );
        Self { model, topology }
    }

    /// Inputs must already be a batch `[N, T, C, 1]`; no axis is added here.
    pub fn check_input(&self, shape: &[usize]) -> Result<(), ClassifierError> {
        let expected = self.topology.input_shape;
        if shape.len() != 4 {
            return Err(ClassifierError::Shape(format!(
                "model expects a rank 4 batch [N, {}, {}, {}], got rank {} shape {:?}",
                expected[0],
                expected[1],
                expected[2],
                shape.len(),
                shape
            )));
        }
        if shape[1..] != expected[..] || shape[0] == 0 {
            return Err(ClassifierError::Shape(format!(
                "model expects [N, {}, {}, {}] with N > 0, got {:?}",
                expected[0], expected[1], expected[2], shape
            )));
        }
        Ok(())
    }

    pub fn probabilities(&self, input: &ArrayD<f32>, device: &B::Device) -> Result<Array2<f32>, ClassifierError> {
        self.check_input(input.shape())?;
        let shape = input.shape();
        let batch = shape[0];

        let values: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::<B, 4>::from_data(
            TensorData::new(values, [shape[0], shape[1], shape[2], shape[3]]),
            device,
        );
        let probs: Vec<f32> = self.model.forward(tensor).into_data().iter::<f32>().collect();

        Ok(Array2::from_shape_vec((batch, self.topology.num_classes), probs)?)
    }

    /// Predicted class index for every example of the batch.
    pub fn predict(&self, input: &ArrayD<f32>, device: &B::Device) -> Result<Vec<usize>, ClassifierError> {
        let probs = self.probabilities(input, device)?;
        let values: Vec<f32> = probs.iter().copied().collect();
        Ok(argmax_rows(&values, self.topology.num_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use ndarray::IxDyn;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_topology_for_mfcc_frames() {
        let topology = ModelTopology::for_input([130, 13, 1], 2).unwrap();

        let outputs: Vec<[usize; 2]> = topology.stages.iter().map(|s| s.output).collect();
        assert_eq!(outputs, vec![[64, 6], [31, 2], [15, 1]]);
        assert_eq!(topology.flattened_size(), 32 * 15);
        assert_eq!(topology.stages[0].pool_padding, [[0, 1], [1, 1]]);
        assert_eq!(topology.stages[2].pool_padding, [[0, 0], [0, 1]]);
    }

    #[test]
    fn test_same_padding_matches_ceil() {
        for size in 1..40 {
            for (kernel, stride) in [(3, 2), (2, 2)] {
                let [before, after] = same_padding(size, kernel, stride);
                let out = (size + before + after - kernel) / stride + 1;
                assert_eq!(out, size.div_ceil(stride), "size {} kernel {}", size, kernel);
                assert!(before <= after && after - before <= 1);
            }
        }
    }

    fn pool_tensor<B: Backend>(values: Vec<f32>, shape: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(values, shape), device)
    }

    #[test]
    fn test_pool_puts_extra_padding_after() {
        let device = Default::default();
        // 1x4 row, windows {0,1,2} and {2,3,pad}
        let pool = SamePool2d::new([1, 3], [1, 2], [[0, 0], same_padding(4, 3, 2)]);
        let input = pool_tensor::<TestBackend>(vec![0.5, 0.25, 3.0, 1.0], [1, 1, 1, 4], &device);

        let output: Vec<f32> = pool.forward(input).into_data().iter::<f32>().collect();
        assert_eq!(output, vec![3.0, 3.0]);
    }

    #[test]
    fn test_pool_matches_windowed_max() {
        let device = Default::default();
        let [n, c, h, w] = [2, 3, 11, 7];
        let values: Vec<f32> = (0..n * c * h * w).map(|i| ((i * 37) % 101) as f32 / 10.0 + 0.1).collect();
        let padding = [same_padding(h, 3, 2), same_padding(w, 3, 2)];
        let pool = SamePool2d::new([3, 3], [2, 2], padding);

        let output = pool.forward(pool_tensor::<TestBackend>(values.clone(), [n, c, h, w], &device));
        let [oh, ow] = [h.div_ceil(2), w.div_ceil(2)];
        assert_eq!(output.dims(), [n, c, oh, ow]);

        let output: Vec<f32> = output.into_data().iter::<f32>().collect();
        for b in 0..n {
            for ch in 0..c {
                for i in 0..oh {
                    for j in 0..ow {
                        let mut expected = f32::MIN;
                        for r in 0..3 {
                            for s in 0..3 {
                                let row = (i * 2 + r).checked_sub(padding[0][0]).filter(|&row| row < h);
                                let col = (j * 2 + s).checked_sub(padding[1][0]).filter(|&col| col < w);
                                if let (Some(row), Some(col)) = (row, col) {
                                    expected = expected.max(values[((b * c + ch) * h + row) * w + col]);
                                }
                            }
                        }
                        assert_eq!(output[((b * c + ch) * oh + i) * ow + j], expected, "at {:?}", (b, ch, i, j));
                    }
                }
            }
        }
    }

    #[test]
    fn test_pool_backward_on_tall_input() {
        type GradBackend = Autodiff<TestBackend>;
        let device = Default::default();
        let [n, c, h, w] = [2, 4, 128, 11];
        let values: Vec<f32> = (0..n * c * h * w).map(|i| ((i * 7919) % 9973) as f32 / 1000.0 + 0.01).collect();
        let pool = SamePool2d::new([3, 3], [2, 2], [same_padding(h, 3, 2), same_padding(w, 3, 2)]);

        let input = pool_tensor::<GradBackend>(values, [n, c, h, w], &device).require_grad();
        let output = pool.forward(input.clone());
        let [_, _, oh, ow] = output.dims();
        let grads = output.sum().backward();

        let grad = input.grad(&grads).unwrap();
        assert_eq!(grad.dims(), [n, c, h, w]);
        // every output routes a unit gradient to exactly one input
        let total: f32 = grad.sum().into_scalar();
        assert!((total - (n * c * oh * ow) as f32).abs() < 1e-3, "gradient total {}", total);
    }

    #[test]
    fn test_topology_rejects_small_or_bad_input() {
        assert!(matches!(ModelTopology::for_input([130, 8, 1], 2), Err(ClassifierError::Shape(_))));
        assert!(matches!(ModelTopology::for_input([130, 13, 3], 2), Err(ClassifierError::Shape(_))));
        assert!(matches!(ModelTopology::for_input([130, 13, 1], 1), Err(ClassifierError::Config(_))));
    }

    #[test]
    fn test_forward_shape_and_softmax() {
        let device = Default::default();
        let topology = ModelTopology::for_input([16, 13, 1], 3).unwrap();
        let classifier = Classifier::<TestBackend>::new(topology, &device);

        let input = ArrayD::from_shape_fn(IxDyn(&[4, 16, 13, 1]), |idx| (idx[1] * 13 + idx[2]) as f32 / 100.0);
        let probs = classifier.probabilities(&input, &device).unwrap();

        assert_eq!(probs.dim(), (4, 3));
        for row in probs.rows() {
            let total: f32 = row.sum();
            assert!((total - 1.0).abs() < 1e-5, "row sums to {}", total);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }

        let labels = classifier.predict(&input, &device).unwrap();
        assert_eq!(labels.len(), 4);
        assert!(labels.iter().all(|&l| l < 3));
    }

    #[test]
    fn test_single_example_without_batch_axis_is_rejected() {
        let device = Default::default();
        let topology = ModelTopology::for_input([16, 13, 1], 2).unwrap();
        let classifier = Classifier::<TestBackend>::new(topology, &device);

        let single = ArrayD::<f32>::zeros(IxDyn(&[16, 13, 1]));
        assert!(matches!(classifier.predict(&single, &device), Err(ClassifierError::Shape(_))));

        let wrong_frames = ArrayD::<f32>::zeros(IxDyn(&[1, 15, 13, 1]));
        assert!(matches!(classifier.predict(&wrong_frames, &device), Err(ClassifierError::Shape(_))));
    }

    #[test]
    fn test_summary_lists_every_layer() {
        let topology = ModelTopology::for_input([130, 13, 1], 2).unwrap();
        let summary = topology.summary();
        assert_eq!(summary.len(), 3 * 3 + 4);
        assert!(summary.last().unwrap().contains("softmax"));
    }
}
