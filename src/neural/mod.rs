// projeto: mfcccnn
// file: src/neural/mod.rs
// Module declarations for the MFCC classifier

pub mod utils;      // Error type and array helpers
pub mod config;     // Training and inference configuration
pub mod data;       // Feature files, dataset split
pub mod model;      // CNN architecture and topology
pub mod metrics;    // Training history, evaluation results, plots
pub mod train;      // Training loop and evaluation
pub mod storage;    // Model artifact persistence
pub mod inference;  // Polling inference loop

pub use config::{PredictConfig, TrainConfig};
pub use data::{load_feature_dataset, load_sample_features, split_dataset, FeatureRecord, Partition, SplitDataset};
pub use inference::{PollOutcome, PollState, Poller};
pub use metrics::{plot_history, Evaluation, TrainingHistory};
pub use model::{Classifier, MfccCnn, ModelTopology};
pub use storage::{load_model, save_model};
pub use train::{evaluate, sample_predictions, train};
pub use utils::ClassifierError;
