// projeto: mfcccnn
// file: src/predict.rs
// Polling inference: classifies ExtAudio/test1.json, test2.json, ... with the saved model

use clap::Parser;
use log::{error, info};
use std::io;
use std::path::PathBuf;

use mfcccnn::neural::{ClassifierError, Poller, PredictConfig};
use mfcccnn::InferenceBackend;

#[derive(Parser, Debug)]
#[command(
    name = "mfcc-predict",
    version = "0.1.0",
    about = "Polls a directory for numbered MFCC feature files and prints the predicted class of each"
)]
struct Cli {
    /// TOML file with inference settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding <prefix><N>.json files
    #[arg(long)]
    samples_dir: Option<PathBuf>,

    /// Milliseconds to sleep between files
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Keep waiting when the next file is missing instead of exiting
    #[arg(long)]
    wait_for_next: bool,

    /// Stop after this many predictions
    #[arg(long)]
    max_iterations: Option<u64>,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<PredictConfig, ClassifierError> {
        let mut config = match &self.config {
            Some(path) => PredictConfig::load(path)?,
            None => PredictConfig::default(),
        };
        if let Some(samples_dir) = self.samples_dir {
            config.samples_dir = samples_dir;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if self.wait_for_next {
            config.wait_for_next = true;
        }
        if self.max_iterations.is_some() {
            config.max_iterations = self.max_iterations;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), ClassifierError> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = cli.into_config().and_then(run) {
        error!("❌ Inference stopped: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

fn run(config: PredictConfig) -> Result<(), ClassifierError> {
    info!(
        "🔎 Polling {} for {}<N>.json starting at {}",
        config.samples_dir.display(),
        config.file_prefix,
        config.start_counter
    );

    let mut poller = Poller::<InferenceBackend>::new(config, Default::default());
    let mut stdout = io::stdout().lock();

    let classified = poller.run_until_missing(&mut stdout)?;
    info!("🏁 Stopped after {} predictions", classified);
    Ok(())
}

// Exemplos de uso:
// cargo run --release --bin mfcc-predict
// cargo run --release --bin mfcc-predict -- --samples-dir ./ExtAudio --interval-ms 1000 --wait-for-next
