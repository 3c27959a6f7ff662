// projeto: tempmlptrain
// file: src/neural/model.rs
// Rede feed-forward densa (64 → 32 → 16 → 1) com dropout e retropropagação manual

use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::neural::data::split_point;
use crate::neural::metrics::{MetricsTracker, TrainingMetrics};
use crate::neural::utils::{mae_loss, mse_loss, relu, relu_derivative, AdamOptimizer, TrainingError};

pub const HIDDEN_UNITS: [usize; 3] = [64, 32, 16];
pub const DROPOUT_RATE: f64 = 0.2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => relu(z),
            Activation::Linear => z.clone(),
        }
    }
}

/// Kernel is stored `(inputs, units)` so a batch goes through as `x.dot(w) + b`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn glorot_uniform(
        inputs: usize,
        units: usize,
        activation: Activation,
        rng: &mut StdRng,
    ) -> Result<Self, TrainingError> {
        let limit = (6.0 / (inputs + units) as f64).sqrt();
        let dist = Uniform::new(-limit, limit)
            .map_err(|e| TrainingError::ModelConfiguration(format!("weight init: {}", e)))?;
        Ok(DenseLayer {
            w: Array2::from_shape_fn((inputs, units), |_| dist.sample(rng)),
            b: Array1::zeros(units),
            activation,
        })
    }

    pub fn inputs(&self) -> usize {
        self.w.nrows()
    }

    pub fn units(&self) -> usize {
        self.w.ncols()
    }

    pub fn num_parameters(&self) -> usize {
        self.w.len() + self.b.len()
    }

    fn pre_activation(&self, input: &Array2<f64>) -> Array2<f64> {
        input.dot(&self.w) + &self.b
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Layer {
    Dense(DenseLayer),
    Dropout { rate: f64 },
}

/// Serializable snapshot of the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWeights {
    pub input_size: usize,
    pub layers: Vec<Layer>,
}

enum LayerCache {
    Dense { input: Array2<f64>, z: Array2<f64> },
    Dropout { mask: Array2<f64> },
}

pub struct DenseGradient {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
}

pub struct NeuralNetwork {
    input_size: usize,
    layers: Vec<Layer>,
}

impl NeuralNetwork {
    /// Builds `Dense(64, relu) → Dropout → Dense(32, relu) → Dense(16, relu) → Dense(1)`.
    pub fn new(input_size: usize, dropout_rate: f64, rng: &mut StdRng) -> Result<Self, TrainingError> {
        if input_size == 0 {
            return Err(TrainingError::ModelConfiguration("input size must be greater than zero".into()));
        }
        if !(0.0..1.0).contains(&dropout_rate) {
            return Err(TrainingError::ModelConfiguration(format!(
                "dropout rate must be in [0, 1), got {}",
                dropout_rate
            )));
        }

        let mut layers = Vec::with_capacity(HIDDEN_UNITS.len() + 2);
        let mut inputs = input_size;
        for (i, &units) in HIDDEN_UNITS.iter().enumerate() {
            layers.push(Layer::Dense(DenseLayer::glorot_uniform(inputs, units, Activation::Relu, rng)?));
            if i == 0 {
                layers.push(Layer::Dropout { rate: dropout_rate });
            }
            inputs = units;
        }
        layers.push(Layer::Dense(DenseLayer::glorot_uniform(inputs, 1, Activation::Linear, rng)?));

        let model = NeuralNetwork { input_size, layers };
        debug!("🛠️ Modelo inicializado com {} parâmetros", model.num_parameters());
        Ok(model)
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn num_parameters(&self) -> usize {
        self.dense_layers().map(DenseLayer::num_parameters).sum()
    }

    pub fn dense_layers(&self) -> impl Iterator<Item = &DenseLayer> {
        self.layers.iter().filter_map(|layer| match layer {
            Layer::Dense(dense) => Some(dense),
            Layer::Dropout { .. } => None,
        })
    }

    /// Keras-style names: dense, dropout, dense_1, …
    fn layer_names(&self) -> Vec<String> {
        let mut dense_count = 0;
        let mut dropout_count = 0;
        self.layers
            .iter()
            .map(|layer| {
                let (base, count) = match layer {
                    Layer::Dense(_) => ("dense", &mut dense_count),
                    Layer::Dropout { .. } => ("dropout", &mut dropout_count),
                };
                let name = if *count == 0 { base.to_string() } else { format!("{}_{}", base, count) };
                *count += 1;
                name
            })
            .collect()
    }

    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!("{:<22}{:<16}{:>10}", "Layer (type)", "Output Shape", "Param #")];
        let mut width = self.input_size;
        for (name, layer) in self.layer_names().iter().zip(&self.layers) {
            let (kind, params) = match layer {
                Layer::Dense(dense) => {
                    width = dense.units();
                    ("Dense", dense.num_parameters())
                }
                Layer::Dropout { .. } => ("Dropout", 0),
            };
            lines.push(format!(
                "{:<22}{:<16}{:>10}",
                format!("{} ({})", name, kind),
                format!("(None, {})", width),
                params
            ));
        }
        lines.push(format!("Total params: {}", self.num_parameters()));
        lines
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<(), TrainingError> {
        if x.ncols() != self.input_size {
            return Err(TrainingError::Shape(format!(
                "model expects {} inputs, got {}",
                self.input_size,
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Inference pass; dropout is the identity here.
    pub fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>, TrainingError> {
        self.check_input(x)?;
        let mut current = x.clone();
        for layer in &self.layers {
            if let Layer::Dense(dense) = layer {
                current = dense.activation.apply(&dense.pre_activation(&current));
            }
        }
        Ok(current)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        Ok(self.forward(x)?.column(0).to_owned())
    }

    fn forward_train(
        &self,
        x: &Array2<f64>,
        rng: &mut StdRng,
    ) -> (Array2<f64>, Vec<LayerCache>) {
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut current = x.clone();
        for layer in &self.layers {
            match layer {
                Layer::Dense(dense) => {
                    let z = dense.pre_activation(&current);
                    let out = dense.activation.apply(&z);
                    caches.push(LayerCache::Dense { input: current, z });
                    current = out;
                }
                Layer::Dropout { rate } => {
                    let keep = 1.0 - rate;
                    let mask = current.mapv(|_| if rng.random_bool(keep) { 1.0 / keep } else { 0.0 });
                    current = &current * &mask;
                    caches.push(LayerCache::Dropout { mask });
                }
            }
        }
        (current, caches)
    }

    /// Gradients for each layer (`None` for dropout), given dLoss/dOutput.
    fn backward(&self, caches: &[LayerCache], grad_output: Array2<f64>) -> Vec<Option<DenseGradient>> {
        let mut grads: Vec<Option<DenseGradient>> = Vec::with_capacity(self.layers.len());
        let mut delta = grad_output;
        for (layer, cache) in self.layers.iter().zip(caches).rev() {
            match (layer, cache) {
                (Layer::Dense(dense), LayerCache::Dense { input, z }) => {
                    let dz = match dense.activation {
                        Activation::Relu => &delta * &relu_derivative(z),
                        Activation::Linear => delta,
                    };
                    let dw = input.t().dot(&dz);
                    let db = dz.sum_axis(Axis(0));
                    delta = dz.dot(&dense.w.t());
                    grads.push(Some(DenseGradient { w: dw, b: db }));
                }
                (Layer::Dropout { .. }, LayerCache::Dropout { mask }) => {
                    delta = &delta * mask;
                    grads.push(None);
                }
                _ => unreachable!("layer cache out of sync with layers"),
            }
        }
        grads.reverse();
        grads
    }

    /// One optimizer step on a batch; returns the batch MSE and MAE.
    pub fn train_batch(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        optimizer: &mut AdamOptimizer,
        rng: &mut StdRng,
    ) -> Result<(f64, f64), TrainingError> {
        self.check_input(x)?;
        if x.nrows() != y.len() {
            return Err(TrainingError::Shape(format!("{} samples but {} targets", x.nrows(), y.len())));
        }
        let n = x.nrows() as f64;
        let (output, caches) = self.forward_train(x, rng);
        let predictions = output.column(0).to_owned();
        let (pred_vec, target_vec) = (predictions.to_vec(), y.to_vec());
        let loss = mse_loss(&pred_vec, &target_vec);
        let mae = mae_loss(&pred_vec, &target_vec);

        let error = (&predictions - y) * (2.0 / n);
        let grad_output = error.insert_axis(Axis(1));
        let grads = self.backward(&caches, grad_output);

        optimizer.step();
        for (i, (layer, grad)) in self.layers.iter_mut().zip(grads).enumerate() {
            if let (Layer::Dense(dense), Some(grad)) = (layer, grad) {
                optimizer.update(&format!("layer_{}/kernel", i), &mut dense.w, &grad.w);
                optimizer.update(&format!("layer_{}/bias", i), &mut dense.b, &grad.b);
            }
        }
        Ok((loss, mae))
    }

    /// Shuffled mini-batch pass over `(x, y)`; returns sample-weighted MSE and MAE.
    pub fn train_epoch(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        batch_size: usize,
        optimizer: &mut AdamOptimizer,
        rng: &mut StdRng,
    ) -> Result<(f64, f64), TrainingError> {
        if batch_size == 0 {
            return Err(TrainingError::ModelConfiguration("batch size must be greater than zero".into()));
        }
        let mut indices: Vec<usize> = (0..x.nrows()).collect();
        indices.shuffle(rng);

        let mut total_loss = 0.0;
        let mut total_mae = 0.0;
        for batch in indices.chunks(batch_size) {
            let bx = x.select(Axis(0), batch);
            let by = y.select(Axis(0), batch);
            let (loss, mae) = self.train_batch(&bx, &by, optimizer, rng)?;
            total_loss += loss * batch.len() as f64;
            total_mae += mae * batch.len() as f64;
        }
        let n = x.nrows().max(1) as f64;
        Ok((total_loss / n, total_mae / n))
    }

    /// MSE and MAE of the inference pass.
    pub fn evaluate(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(f64, f64), TrainingError> {
        let predictions = self.predict(x)?.to_vec();
        let targets = y.to_vec();
        if predictions.len() != targets.len() {
            return Err(TrainingError::Shape(format!(
                "{} predictions but {} targets",
                predictions.len(),
                targets.len()
            )));
        }
        Ok((mse_loss(&predictions, &targets), mae_loss(&predictions, &targets)))
    }

    /// Trains for a fixed number of epochs. The last `validation_split` share of
    /// the training data is held out (unshuffled) for per-epoch validation.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        options: FitOptions,
        optimizer: &mut AdamOptimizer,
        rng: &mut StdRng,
    ) -> Result<MetricsTracker, TrainingError> {
        let split_at = split_point(x.nrows(), 1.0 - options.validation_split);
        let x_fit = x.slice(ndarray::s![..split_at, ..]).to_owned();
        let y_fit = y.slice(ndarray::s![..split_at]).to_owned();
        let x_val = x.slice(ndarray::s![split_at.., ..]).to_owned();
        let y_val = y.slice(ndarray::s![split_at..]).to_owned();

        if x_fit.nrows() == 0 {
            return Err(TrainingError::DataProcessing(format!(
                "no training samples left after validation split ({} windows)",
                x.nrows()
            )));
        }
        info!("🎓 Treinando com {} amostras, validando com {}", x_fit.nrows(), x_val.nrows());

        let mut tracker = MetricsTracker::new();
        for epoch in 1..=options.epochs {
            let epoch_start = Instant::now();
            let (loss, mae) = self.train_epoch(&x_fit, &y_fit, options.batch_size, optimizer, rng)?;
            let (val_loss, val_mae) = if x_val.nrows() > 0 {
                let (vl, vm) = self.evaluate(&x_val, &y_val)?;
                (Some(vl), Some(vm))
            } else {
                (None, None)
            };
            let metrics = TrainingMetrics { epoch, loss, mae, val_loss, val_mae };
            info!("{} - {:.2}s", metrics.progress_line(options.epochs), epoch_start.elapsed().as_secs_f64());
            tracker.add_metrics(metrics);
        }
        Ok(tracker)
    }

    pub fn get_weights(&self) -> ModelWeights {
        ModelWeights {
            input_size: self.input_size,
            layers: self.layers.clone(),
        }
    }

    pub fn from_weights(weights: ModelWeights) -> Result<Self, TrainingError> {
        let mut expected_inputs = weights.input_size;
        for layer in &weights.layers {
            if let Layer::Dense(dense) = layer {
                if dense.inputs() != expected_inputs || dense.b.len() != dense.units() {
                    return Err(TrainingError::ModelConfiguration(format!(
                        "dense layer shape {:?} does not follow input width {}",
                        dense.w.dim(),
                        expected_inputs
                    )));
                }
                expected_inputs = dense.units();
            }
        }
        if expected_inputs != 1 {
            return Err(TrainingError::ModelConfiguration(format!(
                "model must end in a single output unit, got {}",
                expected_inputs
            )));
        }
        Ok(NeuralNetwork {
            input_size: weights.input_size,
            layers: weights.layers,
        })
    }
}
