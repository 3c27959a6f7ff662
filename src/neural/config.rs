// projeto: tempmlptrain
// file: src/neural/config.rs
// Configuração do pipeline de treinamento (defaults + arquivo TOML opcional)

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::neural::model::DROPOUT_RATE;
use crate::neural::utils::TrainingError;

pub const CSV_FILE: &str = "sensor_data.csv";
pub const LOOKBACK: usize = 24;
pub const EPOCHS: usize = 100;
pub const BATCH_SIZE: usize = 16;

pub const CHECKPOINT_FILE: &str = "temp_model_simple.json";
pub const QUANTIZED_FILE: &str = "temp_model.bin";
pub const HEADER_FILE: &str = "temp_model.h";
pub const HEADER_SYMBOL: &str = "temp_model";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub csv_file: String,
    pub lookback: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub dropout_rate: f64,
    pub validation_split: f64,
    pub train_split: f64,
    pub seed: Option<u64>,
    pub output_dir: String,
    pub history_csv: Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            csv_file: CSV_FILE.to_string(),
            lookback: LOOKBACK,
            epochs: EPOCHS,
            batch_size: BATCH_SIZE,
            learning_rate: 0.001,
            dropout_rate: DROPOUT_RATE,
            validation_split: 0.2,
            train_split: 0.8,
            seed: None,
            output_dir: ".".to_string(),
            history_csv: None,
        }
    }
}

impl TrainConfig {
    /// Loads a TOML file; keys that are absent keep their default value.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: TrainConfig = toml::from_str(&content)
            .map_err(|e| TrainingError::Config(format!("{}: {}", path.display(), e)))?;
        info!("⚙️ Configuração carregada de: {}", path.display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, TrainingError> {
        toml::to_string_pretty(self).map_err(|e| TrainingError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.csv_file.is_empty() {
            return Err(TrainingError::Config("csv_file must not be empty".into()));
        }
        if self.lookback == 0 {
            return Err(TrainingError::Config("lookback must be greater than zero".into()));
        }
        if self.epochs == 0 {
            return Err(TrainingError::Config("epochs must be greater than zero".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::Config("batch_size must be greater than zero".into()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(TrainingError::Config("learning_rate must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(TrainingError::Config("dropout_rate must be in [0, 1)".into()));
        }
        for (name, ratio) in [("train_split", self.train_split), ("validation_split", self.validation_split)] {
            if !(ratio > 0.0 && ratio < 1.0) {
                return Err(TrainingError::Config(format!("{} must be in (0, 1), got {}", name, ratio)));
            }
        }
        debug!("✅ Configuração validada");
        Ok(())
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.output_dir).join(file_name)
    }

    pub fn print_summary(&self) {
        info!("📋 Configuração:");
        info!("   ├── CSV: {}", self.csv_file);
        info!("   ├── Lookback: {} | Épocas: {} | Batch: {}", self.lookback, self.epochs, self.batch_size);
        info!("   ├── LR: {} | Dropout: {} | Val split: {}", self.learning_rate, self.dropout_rate, self.validation_split);
        info!("   └── Saída: {}", self.output_dir);
    }
}
