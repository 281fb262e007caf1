// projeto: mfcccnn
// file: src/neural/inference.rs
// Polling inference loop as an explicit state machine over numbered feature files

use burn::tensor::backend::Backend;
use log::{debug, info, warn};
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use crate::neural::config::PredictConfig;
use crate::neural::data::load_sample_features;
use crate::neural::storage::load_model;
use crate::neural::utils::{format_labels, ClassifierError};

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// Looking for the file of `counter`.
    Polling { counter: u64 },
    /// The file exists and is about to be classified.
    Classifying { counter: u64, path: PathBuf },
    /// No file for `counter`. The caller decides whether to resume or stop.
    Exhausted { counter: u64, path: PathBuf },
    /// Classification failed; terminal.
    Aborted { counter: u64, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePrediction {
    pub counter: u64,
    pub path: PathBuf,
    pub labels: Vec<usize>,
}

impl fmt::Display for FilePrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicted label: {}", format_labels(&self.labels))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Found(PathBuf),
    Classified(FilePrediction),
    Exhausted { counter: u64, path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Exhausted { counter: u64, path: PathBuf },
    IterationLimit { classified: u64 },
}

pub struct Poller<B: Backend> {
    config: PredictConfig,
    device: B::Device,
    state: PollState,
}

impl<B: Backend> Poller<B> {
    pub fn new(config: PredictConfig, device: B::Device) -> Self {
        let state = PollState::Polling { counter: config.start_counter };
        Self { config, device, state }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Leaves `Exhausted` to poll the same counter again.
    pub fn resume(&mut self) {
        if let PollState::Exhausted { counter, .. } = self.state {
            self.state = PollState::Polling { counter };
        }
    }

    /// Reloads the model from disk, then classifies the file. Nothing is cached between calls.
    fn classify(&self, counter: u64, path: PathBuf) -> Result<FilePrediction, ClassifierError> {
        let classifier = load_model::<B>(&self.config.topology_path, &self.config.weights_path, &self.device)?;
        info!("📥 [Poller] Loaded model from disk");

        let input = load_sample_features(&path)?.into_model_input();
        debug!("[Poller] {} has shape {:?}", path.display(), input.shape());
        let labels = classifier.predict(&input, &self.device)?;

        Ok(FilePrediction { counter, path, labels })
    }

    /// Performs a single transition.
    pub fn step(&mut self) -> Result<Step, ClassifierError> {
        match self.state.clone() {
            PollState::Polling { counter } => {
                let path = self.config.sample_path(counter);
                if path.is_file() {
                    self.state = PollState::Classifying { counter, path: path.clone() };
                    Ok(Step::Found(path))
                } else {
                    self.state = PollState::Exhausted { counter, path: path.clone() };
                    Ok(Step::Exhausted { counter, path })
                }
            }
            PollState::Classifying { counter, path } => match self.classify(counter, path) {
                Ok(prediction) => {
                    self.state = PollState::Polling { counter: counter + 1 };
                    Ok(Step::Classified(prediction))
                }
                Err(err) => {
                    self.state = PollState::Aborted { counter, reason: err.to_string() };
                    Err(err)
                }
            },
            PollState::Exhausted { counter, path } => Ok(Step::Exhausted { counter, path }),
            PollState::Aborted { counter, reason } => Err(ClassifierError::Aborted { counter, reason }),
        }
    }

    /// Runs until the next file is missing or the iteration limit is hit, writing one line per prediction.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<PollOutcome, ClassifierError> {
        let mut classified = 0;
        loop {
            match self.step()? {
                Step::Found(path) => debug!("[Poller] Found {}", path.display()),
                Step::Classified(prediction) => {
                    writeln!(out, "{}", prediction)?;
                    out.flush()?;
                    classified += 1;

                    if self.config.max_iterations.is_some_and(|max| classified >= max) {
                        return Ok(PollOutcome::IterationLimit { classified });
                    }
                    thread::sleep(self.config.interval());
                }
                Step::Exhausted { counter, path } => {
                    if !self.config.wait_for_next {
                        return Ok(PollOutcome::Exhausted { counter, path });
                    }
                    warn!("⏳ [Poller] {} not found, waiting", path.display());
                    thread::sleep(self.config.interval());
                    self.resume();
                }
            }
        }
    }

    /// Like [`Poller::run`], but a missing next file is a fatal `NotFound` error.
    /// Returns the number of predictions when the iteration limit stops the loop.
    pub fn run_until_missing<W: Write>(&mut self, out: &mut W) -> Result<u64, ClassifierError> {
        match self.run(out)? {
            PollOutcome::Exhausted { counter, path } => Err(ClassifierError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no feature file for counter {}: {}", counter, path.display()),
            ))),
            PollOutcome::IterationLimit { classified } => Ok(classified),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::model::{Classifier, ModelTopology};
    use crate::neural::storage::save_model;
    use burn::backend::NdArray;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    type TestBackend = NdArray<f32>;

    const T: usize = 16;
    const C: usize = 13;

    fn frames(offset: f32) -> Vec<Vec<f32>> {
        (0..T).map(|t| (0..C).map(|c| offset + (t * C + c) as f32 / 100.0).collect()).collect()
    }

    fn setup() -> (TempDir, PredictConfig) {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let classifier = Classifier::<TestBackend>::new(ModelTopology::for_input([T, C, 1], 2).unwrap(), &device);

        let config = PredictConfig {
            topology_path: dir.path().join("model.json"),
            weights_path: dir.path().join("model.bin"),
            samples_dir: dir.path().join("ExtAudio"),
            interval_ms: 0,
            ..PredictConfig::default()
        };
        save_model(&classifier.model, &classifier.topology, &config.topology_path, &config.weights_path).unwrap();
        fs::create_dir_all(&config.samples_dir).unwrap();
        (dir, config)
    }

    fn write_sample(path: &Path, mfcc: serde_json::Value) {
        fs::write(path, json!({ "mfcc": mfcc }).to_string()).unwrap();
    }

    #[test]
    fn test_single_file_then_exhausted() {
        let (_dir, config) = setup();
        write_sample(&config.sample_path(1), json!([frames(0.0)]));

        let mut poller = Poller::<TestBackend>::new(config.clone(), Default::default());
        let mut out = Vec::new();
        let outcome = poller.run(&mut out).unwrap();

        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0] == "Predicted label: [0]" || lines[0] == "Predicted label: [1]", "{}", lines[0]);

        assert_eq!(outcome, PollOutcome::Exhausted { counter: 2, path: config.sample_path(2) });
        assert!(matches!(poller.state(), PollState::Exhausted { counter: 2, .. }));
    }

    #[test]
    fn test_missing_second_file_is_fatal() {
        let (_dir, config) = setup();
        write_sample(&config.sample_path(1), json!([frames(0.0)]));

        let mut poller = Poller::<TestBackend>::new(config, Default::default());
        let mut out = Vec::new();
        let err = poller.run_until_missing(&mut out).unwrap_err();

        match err {
            ClassifierError::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::NotFound);
                assert!(e.to_string().contains("test2.json"), "{}", e);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_no_files_is_exhausted_immediately() {
        let (_dir, config) = setup();
        let mut poller = Poller::<TestBackend>::new(config, Default::default());
        let mut out = Vec::new();

        let outcome = poller.run(&mut out).unwrap();
        assert!(matches!(outcome, PollOutcome::Exhausted { counter: 1, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_state_transitions_step_by_step() {
        let (_dir, config) = setup();
        write_sample(&config.sample_path(1), json!([frames(0.0), frames(1.0)]));
        let mut poller = Poller::<TestBackend>::new(config.clone(), Default::default());

        assert_eq!(poller.state(), &PollState::Polling { counter: 1 });
        assert_eq!(poller.step().unwrap(), Step::Found(config.sample_path(1)));
        assert!(matches!(poller.state(), PollState::Classifying { counter: 1, .. }));

        match poller.step().unwrap() {
            Step::Classified(prediction) => {
                assert_eq!(prediction.counter, 1);
                assert_eq!(prediction.labels.len(), 2);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(poller.state(), &PollState::Polling { counter: 2 });

        assert!(matches!(poller.step().unwrap(), Step::Exhausted { counter: 2, .. }));
        // Exhausted is sticky until resumed.
        assert!(matches!(poller.step().unwrap(), Step::Exhausted { counter: 2, .. }));

        write_sample(&config.sample_path(2), json!([frames(0.5)]));
        poller.resume();
        assert_eq!(poller.step().unwrap(), Step::Found(config.sample_path(2)));
    }

    #[test]
    fn test_single_example_file_aborts_with_shape_error() {
        let (_dir, config) = setup();
        write_sample(&config.sample_path(1), json!(frames(0.0)));

        let mut poller = Poller::<TestBackend>::new(config, Default::default());
        let mut out = Vec::new();
        let err = poller.run(&mut out).unwrap_err();

        assert!(matches!(err, ClassifierError::Shape(_)), "{:?}", err);
        assert!(matches!(poller.state(), PollState::Aborted { counter: 1, .. }));
        assert!(matches!(poller.step(), Err(ClassifierError::Aborted { counter: 1, .. })));
        assert!(out.is_empty());
    }

    #[test]
    fn test_model_is_reloaded_every_iteration() {
        let (_dir, config) = setup();
        write_sample(&config.sample_path(1), json!([frames(0.0)]));
        write_sample(&config.sample_path(2), json!([frames(0.0)]));

        let mut poller = Poller::<TestBackend>::new(config.clone(), Default::default());
        poller.step().unwrap();
        assert!(matches!(poller.step().unwrap(), Step::Classified(_)));

        // Losing the artifact between iterations must surface on the next one.
        fs::remove_file(&config.weights_path).unwrap();
        poller.step().unwrap();
        assert!(matches!(poller.step(), Err(ClassifierError::Io(_))));
    }

    #[test]
    fn test_iteration_limit_stops_the_loop() {
        let (_dir, config) = setup();
        for i in 1..=3 {
            write_sample(&config.sample_path(i), json!([frames(i as f32)]));
        }
        let config = PredictConfig { max_iterations: Some(2), ..config };

        let mut poller = Poller::<TestBackend>::new(config, Default::default());
        let mut out = Vec::new();
        let outcome = poller.run(&mut out).unwrap();

        assert_eq!(outcome, PollOutcome::IterationLimit { classified: 2 });
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
        assert_eq!(poller.state(), &PollState::Polling { counter: 3 });
    }
}
