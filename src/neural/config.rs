// projeto: mfcccnn
// file: src/neural/config.rs
// Training and inference configuration, defaults plus optional TOML overrides

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::neural::utils::ClassifierError;

pub const DATA_PATH: &str = "./data.json";
pub const TOPOLOGY_PATH: &str = "./model.json";
pub const WEIGHTS_PATH: &str = "./model.bin";
pub const SAMPLES_DIR: &str = "./ExtAudio";
pub const SAMPLE_PREFIX: &str = "test";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub dataset_path: PathBuf,
    pub topology_path: PathBuf,
    pub weights_path: PathBuf,
    pub plots_dir: PathBuf,
    pub test_size: f64,
    pub validation_size: f64,
    pub seed: u64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub sample_predictions: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DATA_PATH),
            topology_path: PathBuf::from(TOPOLOGY_PATH),
            weights_path: PathBuf::from(WEIGHTS_PATH),
            plots_dir: PathBuf::from("."),
            test_size: 0.3,
            validation_size: 0.2,
            seed: 42,
            epochs: 30,
            batch_size: 32,
            learning_rate: 1e-4,
            sample_predictions: 10,
        }
    }
}

impl TrainConfig {
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = fs::read_to_string(path)?;
        let config: TrainConfig = toml::from_str(&content)?;
        info!("⚙️ [Config] Loaded training configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        check_fraction("test_size", self.test_size)?;
        check_fraction("validation_size", self.validation_size)?;

        if self.epochs == 0 {
            return Err(ClassifierError::Config("epochs must be greater than zero".into()));
        }
        if self.batch_size == 0 {
            return Err(ClassifierError::Config("batch_size must be greater than zero".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ClassifierError::Config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub topology_path: PathBuf,
    pub weights_path: PathBuf,
    pub samples_dir: PathBuf,
    pub file_prefix: String,
    pub start_counter: u64,
    pub interval_ms: u64,
    pub wait_for_next: bool,
    pub max_iterations: Option<u64>,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            topology_path: PathBuf::from(TOPOLOGY_PATH),
            weights_path: PathBuf::from(WEIGHTS_PATH),
            samples_dir: PathBuf::from(SAMPLES_DIR),
            file_prefix: SAMPLE_PREFIX.to_string(),
            start_counter: 1,
            interval_ms: 3000,
            wait_for_next: false,
            max_iterations: None,
        }
    }
}

impl PredictConfig {
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = fs::read_to_string(path)?;
        let config: PredictConfig = toml::from_str(&content)?;
        info!("⚙️ [Config] Loaded inference configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.start_counter == 0 {
            return Err(ClassifierError::Config("start_counter must be a positive integer".into()));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(ClassifierError::Config(format!(
                "file_prefix must be a bare file name prefix, got {:?}",
                self.file_prefix
            )));
        }
        if self.max_iterations == Some(0) {
            return Err(ClassifierError::Config("max_iterations must be greater than zero".into()));
        }
        if self.wait_for_next && self.interval_ms == 0 {
            return Err(ClassifierError::Config("wait_for_next needs interval_ms greater than zero".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// `<samples_dir>/<prefix><counter>.json`
    pub fn sample_path(&self, counter: u64) -> PathBuf {
        self.samples_dir.join(format!("{}{}.json", self.file_prefix, counter))
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), ClassifierError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ClassifierError::Config(format!("{} must lie strictly between 0 and 1, got {}", name, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let train = TrainConfig::default();
        assert!(train.validate().is_ok());
        assert_eq!(train.epochs, 30);
        assert_eq!(train.batch_size, 32);
        assert_eq!(train.seed, 42);

        let predict = PredictConfig::default();
        assert!(predict.validate().is_ok());
        assert_eq!(predict.interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_sample_path_numbering() {
        let config = PredictConfig::default();
        assert_eq!(config.sample_path(1), PathBuf::from("./ExtAudio/test1.json"));
        assert_eq!(config.sample_path(12), PathBuf::from("./ExtAudio/test12.json"));
    }

    #[test]
    fn test_invalid_fractions_rejected() {
        let config = TrainConfig { test_size: 1.0, ..TrainConfig::default() };
        assert!(matches!(config.validate(), Err(ClassifierError::Config(_))));

        let config = TrainConfig { validation_size: 0.0, ..TrainConfig::default() };
        assert!(matches!(config.validate(), Err(ClassifierError::Config(_))));
    }

    #[test]
    fn test_waiting_without_interval_rejected() {
        let config = PredictConfig { wait_for_next: true, interval_ms: 0, ..PredictConfig::default() };
        assert!(matches!(config.validate(), Err(ClassifierError::Config(_))));

        let config = PredictConfig { wait_for_next: true, interval_ms: 10, ..PredictConfig::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(&path, "epochs = 5\nbatch_size = 8\n").unwrap();

        let config = TrainConfig::load(&path).unwrap();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.test_size, 0.3);
        assert_eq!(config.dataset_path, PathBuf::from(DATA_PATH));
    }

    #[test]
    fn test_predict_toml_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predict.toml");
        fs::write(&path, "samples_dir = \"/tmp/clips\"\ninterval_ms = 0\nmax_iterations = 4\n").unwrap();

        let config = PredictConfig::load(&path).unwrap();
        assert_eq!(config.samples_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.interval_ms, 0);
        assert_eq!(config.max_iterations, Some(4));
        assert_eq!(config.file_prefix, "test");
    }
}
