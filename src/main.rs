// projeto: mfcccnn
// file: src/main.rs
// Training pipeline: load MFCC dataset, split, build, train, evaluate, report and save the model

use burn::module::AutodiffModule;
use chrono::Utc;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;

use mfcccnn::neural::{
    evaluate, load_feature_dataset, plot_history, sample_predictions, save_model, split_dataset, train,
    Classifier, ClassifierError, ModelTopology, TrainConfig,
};
use mfcccnn::TrainingBackend;

#[derive(Parser, Debug)]
#[command(
    name = "mfcc-train",
    version = "0.1.0",
    about = "Trains the MFCC audio classifier and saves it to model.json / model.bin"
)]
struct Cli {
    /// TOML file with training settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feature dataset (JSON with "mfcc" and "labels")
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Examples per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Seed for the dataset split and batch order
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for the accuracy/loss plots and the history JSON
    #[arg(long)]
    plots_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<TrainConfig, ClassifierError> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };
        if let Some(dataset) = self.dataset {
            config.dataset_path = dataset;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(plots_dir) = self.plots_dir {
            config.plots_dir = plots_dir;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), ClassifierError> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let start_time = Instant::now();
    info!("🚀 MFCC classifier training started at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

    let result = cli.into_config().and_then(|config| run(&config));
    match result {
        Ok(()) => {
            info!("✅ Training finished in {:.2}s", start_time.elapsed().as_secs_f64());
        }
        Err(e) => {
            error!("❌ Training failed: {}", e);
            std::process::exit(1);
        }
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

fn run(config: &TrainConfig) -> Result<(), ClassifierError> {
    let device = Default::default();

    let record = load_feature_dataset(&config.dataset_path)?;
    let split = split_dataset(&record, config.test_size, config.validation_size, config.seed)?;

    let topology = ModelTopology::for_input(split.input_shape(), record.num_classes)?;
    for line in topology.summary() {
        info!("   {}", line);
    }
    let model = topology.init::<TrainingBackend>(&device);

    let (model, history) = train(model, &split, config, &device)?;
    history.print_summary();
    plot_history(&history, &config.plots_dir)?;
    history.save_json(&config.plots_dir.join("history.json"))?;

    let classifier = Classifier { model: model.valid(), topology };
    let test = evaluate(&classifier.model, &split.test, config.batch_size, &device)?;
    println!("\nTest accuracy: {} (loss {:.4})\n", test.accuracy, test.loss);

    let mut rng = rand::rng();
    for sample in sample_predictions(&classifier, &split.test, config.sample_predictions, &mut rng, &device)? {
        println!("{}", sample);
    }

    save_model(&classifier.model, &classifier.topology, &config.topology_path, &config.weights_path)?;
    println!("Saved model to disk");
    Ok(())
}

// Exemplos de uso:
// cargo run --release --bin mfcc-train
// cargo run --release --bin mfcc-train -- --dataset ./data.json --epochs 50 --batch-size 64 --verbose
// cargo run --release --bin mfcc-train -- --config train.toml
