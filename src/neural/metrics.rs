// projeto: mfcccnn
// file: src/neural/metrics.rs
// Per-epoch training history, evaluation results and history plots

use log::info;
use plotly::common::Mode;
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::neural::utils::ClassifierError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub train: Evaluation,
    pub validation: Evaluation,
}

/// Loss and accuracy of every epoch, train and validation side by side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, epoch: EpochMetrics) {
        self.loss.push(epoch.train.loss);
        self.accuracy.push(epoch.train.accuracy);
        self.val_loss.push(epoch.validation.loss);
        self.val_accuracy.push(epoch.validation.accuracy);
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn best_epoch(&self) -> Option<(usize, f64)> {
        self.val_loss
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, loss)| (i + 1, loss))
    }

    pub fn print_summary(&self) {
        if let Some((epoch, val_loss)) = self.best_epoch() {
            let i = epoch - 1;
            info!("📈 [Metrics] Training Summary:");
            info!("   ├── Epochs: {}", self.epochs());
            info!("   ├── Best Epoch: {}", epoch);
            info!("   ├── Best Val Loss: {:.6}", val_loss);
            info!("   ├── Val Accuracy: {:.2}%", self.val_accuracy[i] * 100.0);
            info!("   └── Train Accuracy: {:.2}%", self.accuracy[i] * 100.0);
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ClassifierError> {
        let json = serde_json::to_string_pretty(self).map_err(ClassifierError::Json)?;
        fs::write(path, json)?;
        info!("📊 [Metrics] Training history saved to: {}", path.display());
        Ok(())
    }
}

fn line(x: &[usize], y: &[f64], name: &str) -> Box<Scatter<usize, f64>> {
    Scatter::new(x.to_vec(), y.to_vec()).name(name).mode(Mode::Lines)
}

/// Writes `accuracy.html` and `loss.html` (train vs validation per epoch) into `dir`.
pub fn plot_history(history: &TrainingHistory, dir: &Path) -> Result<Vec<PathBuf>, ClassifierError> {
    fs::create_dir_all(dir)?;
    let epochs: Vec<usize> = (1..=history.epochs()).collect();

    let mut accuracy = Plot::new();
    accuracy.add_trace(line(&epochs, &history.accuracy, "train accuracy"));
    accuracy.add_trace(line(&epochs, &history.val_accuracy, "validation accuracy"));
    accuracy.set_layout(
        Layout::new()
            .title("Accuracy eval")
            .x_axis(Axis::new().title("Epoch"))
            .y_axis(Axis::new().title("Accuracy")),
    );

    let mut loss = Plot::new();
    loss.add_trace(line(&epochs, &history.loss, "train error"));
    loss.add_trace(line(&epochs, &history.val_loss, "validation error"));
    loss.set_layout(
        Layout::new()
            .title("Error eval")
            .x_axis(Axis::new().title("Epoch"))
            .y_axis(Axis::new().title("Error")),
    );

    let accuracy_path = dir.join("accuracy.html");
    let loss_path = dir.join("loss.html");
    accuracy.write_html(&accuracy_path);
    loss.write_html(&loss_path);
    info!("📊 [Metrics] Plots written to {} and {}", accuracy_path.display(), loss_path.display());

    Ok(vec![accuracy_path, loss_path])
}
