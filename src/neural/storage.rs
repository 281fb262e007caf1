// projeto: mfcccnn
// file: src/neural/storage.rs
// Model artifact on disk: JSON topology plus a burn binary weights record

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::backend::Backend,
};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::neural::model::{Classifier, MfccCnn, ModelTopology, ARCHITECTURE};
use crate::neural::utils::ClassifierError;

fn recorder() -> BinFileRecorder<FullPrecisionSettings> {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

/// File the recorder actually uses for `weights_path`: it always writes a `.bin` extension.
pub fn weights_file(weights_path: &Path) -> PathBuf {
    weights_path.with_extension("bin")
}

/// Overwrites both files in place.
pub fn save_model<B: Backend>(
    model: &MfccCnn<B>,
    topology: &ModelTopology,
    topology_path: &Path,
    weights_path: &Path,
) -> Result<(), ClassifierError> {
    debug!("💾 [Storage] Writing topology to {}", topology_path.display());
    let json = serde_json::to_string_pretty(topology).map_err(ClassifierError::Json)?;
    fs::write(topology_path, json)?;

    let weights_path = weights_file(weights_path);
    debug!("💾 [Storage] Writing weights to {}", weights_path.display());
    model
        .clone()
        .save_file(weights_path.clone(), &recorder())
        .map_err(|e| ClassifierError::Storage(format!("failed to write {}: {:?}", weights_path.display(), e)))?;

    info!("💾 [Storage] Model saved ({} / {})", topology_path.display(), weights_path.display());
    Ok(())
}

pub fn load_topology(topology_path: &Path) -> Result<ModelTopology, ClassifierError> {
    let content = fs::read_to_string(topology_path)?;
    let topology: ModelTopology = serde_json::from_str(&content)?;
    if topology.architecture != ARCHITECTURE {
        return Err(ClassifierError::Storage(format!(
            "{} describes a '{}' model, expected '{}'",
            topology_path.display(),
            topology.architecture,
            ARCHITECTURE
        )));
    }
    Ok(topology)
}

/// Rebuilds the network from its topology and loads the weights into it.
pub fn load_model<B: Backend>(
    topology_path: &Path,
    weights_path: &Path,
    device: &B::Device,
) -> Result<Classifier<B>, ClassifierError> {
    let topology = load_topology(topology_path)?;
    let weights_path = weights_file(weights_path);
    if !weights_path.exists() {
        return Err(ClassifierError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("weights file {} not found", weights_path.display()),
        )));
    }

    let fresh: MfccCnn<B> = topology.init(device);
    let expected_params = fresh.num_params();
    let model = fresh
        .load_file(weights_path.clone(), &recorder(), device)
        .map_err(|e| ClassifierError::Storage(format!("failed to read {}: {:?}", weights_path.display(), e)))?;

    if model.num_params() != expected_params {
        return Err(ClassifierError::Storage(format!(
            "weights in {} hold {} parameters, topology expects {}",
            weights_path.display(),
            model.num_params(),
            expected_params
        )));
    }

    debug!("📥 [Storage] Model loaded from {} / {}", topology_path.display(), weights_path.display());
    Ok(Classifier { model, topology })
}
