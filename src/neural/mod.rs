// projeto: tempmlptrain
// file: src/neural/mod.rs
// Module declarations for the temperature model training pipeline

pub mod config;   // TrainConfig, defaults and TOML loading
pub mod utils;    // Error type, Adam optimizer, activations and losses
pub mod data;     // CSV ingestion, feature derivation, windows and split
pub mod scaler;   // Min-max normalization and firmware constants
pub mod metrics;  // Training history and evaluation report
pub mod model;    // Dense regression network
pub mod quantize; // int8 export for the microcontroller
pub mod storage;  // Checkpoint, binary and C header files

pub use config::TrainConfig;
pub use data::load_readings;
pub use model::{FitOptions, NeuralNetwork};
pub use quantize::QuantizedModel;
pub use scaler::MinMaxScaler;
pub use storage::ModelCheckpoint;
pub use utils::{AdamOptimizer, TrainingError};
