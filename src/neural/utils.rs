// projeto: tempmlptrain
// file: src/neural/utils.rs
// Utility functions, optimizer, and error handling for the training pipeline

use ndarray::{Array, ArrayD, Dimension, IxDyn, ShapeError, Zip};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Data processing error: {0}")]
    DataProcessing(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid timestamp '{value}' at row {row}: {source}")]
    TimestampParse {
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Model configuration error: {0}")]
    ModelConfiguration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<ShapeError> for TrainingError {
    fn from(err: ShapeError) -> Self {
        TrainingError::Shape(err.to_string())
    }
}

/// Adam with per-parameter moment buffers keyed by name.
///
/// `step()` advances the shared timestep once per batch; every `update()`
/// inside that batch uses the same bias correction.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub t: usize,
    m: HashMap<String, ArrayD<f64>>,
    v: HashMap<String, ArrayD<f64>>,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        AdamOptimizer {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    pub fn step(&mut self) {
        self.t += 1;
    }

    pub fn update<D: Dimension>(
        &mut self,
        param_name: &str,
        param: &mut Array<f64, D>,
        gradient: &Array<f64, D>,
    ) {
        let (beta1, beta2, epsilon, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let t = self.t.max(1) as i32;
        let bias1 = 1.0 - beta1.powi(t);
        let bias2 = 1.0 - beta2.powi(t);

        let grad = gradient.view().into_dyn();
        let m = self
            .m
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(IxDyn(gradient.shape())));
        let v = self
            .v
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(IxDyn(gradient.shape())));

        Zip::from(&mut *m)
            .and(&mut *v)
            .and(&grad)
            .for_each(|m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
            });

        let mut param = param.view_mut().into_dyn();
        Zip::from(&mut param)
            .and(&*m)
            .and(&*v)
            .for_each(|p, &m, &v| {
                let m_hat = m / bias1;
                let v_hat = v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}

impl Default for AdamOptimizer {
    fn default() -> Self {
        AdamOptimizer::new(0.001, 0.9, 0.999, 1e-7)
    }
}

pub fn relu<D: Dimension>(x: &Array<f64, D>) -> Array<f64, D> {
    x.mapv(|val| val.max(0.0))
}

/// Derivative of relu evaluated at the pre-activation values.
pub fn relu_derivative<D: Dimension>(z: &Array<f64, D>) -> Array<f64, D> {
    z.mapv(|val| if val > 0.0 { 1.0 } else { 0.0 })
}

pub fn mse_loss(predictions: &[f64], targets: &[f64]) -> f64 {
    assert_eq!(predictions.len(), targets.len());
    if predictions.is_empty() {
        return 0.0;
    }
    let n = predictions.len() as f64;
    predictions.iter().zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>() / n
}

pub fn mae_loss(predictions: &[f64], targets: &[f64]) -> f64 {
    assert_eq!(predictions.len(), targets.len());
    if predictions.is_empty() {
        return 0.0;
    }
    let n = predictions.len() as f64;
    predictions.iter().zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>() / n
}

pub fn rmse(predictions: &[f64], targets: &[f64]) -> f64 {
    mse_loss(predictions, targets).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_adam_moves_against_gradient() {
        let mut optimizer = AdamOptimizer::default();
        let mut param = Array1::from_vec(vec![1.0, -1.0, 0.5]);
        let gradient = Array1::from_vec(vec![0.1, -0.2, 0.0]);
        optimizer.step();
        optimizer.update("test_param", &mut param, &gradient);

        // First Adam step is ~lr * sign(g)
        assert!((param[0] - (1.0 - 0.001)).abs() < 1e-6);
        assert!((param[1] - (-1.0 + 0.001)).abs() < 1e-6);
        assert_eq!(param[2], 0.5);
        assert_eq!(optimizer.t, 1);
    }

    #[test]
    fn test_adam_keeps_separate_moments_per_param() {
        let mut optimizer = AdamOptimizer::default();
        let mut w = Array2::<f64>::zeros((2, 2));
        let mut b = Array1::<f64>::zeros(2);
        optimizer.step();
        optimizer.update("w", &mut w, &Array2::from_elem((2, 2), 1.0));
        optimizer.update("b", &mut b, &Array1::from_elem(2, -1.0));
        assert!(w.iter().all(|&x| x < 0.0));
        assert!(b.iter().all(|&x| x > 0.0));
        assert_eq!(optimizer.m.len(), 2);
    }

    #[test]
    fn test_adam_minimizes_quadratic() {
        let mut optimizer = AdamOptimizer::new(0.1, 0.9, 0.999, 1e-7);
        let mut x = Array1::from_vec(vec![3.0]);
        for _ in 0..500 {
            let grad = x.mapv(|v| 2.0 * v);
            optimizer.step();
            optimizer.update("x", &mut x, &grad);
        }
        assert!(x[0].abs() < 0.1, "x = {}", x[0]);
    }

    #[test]
    fn test_relu_and_derivative() {
        let x = Array1::from_vec(vec![-1.0, 0.0, 2.5]);
        let r = relu(&x);
        assert_eq!(r.to_vec(), vec![0.0, 0.0, 2.5]);
        let d = relu_derivative(&x);
        assert_eq!(d.to_vec(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_loss_functions() {
        let predictions = vec![1.0, 2.0, 3.0];
        let targets = vec![1.5, 2.0, 2.0];
        assert!((mse_loss(&predictions, &targets) - (0.25 + 1.0) / 3.0).abs() < 1e-12);
        assert!((mae_loss(&predictions, &targets) - 0.5).abs() < 1e-12);
        assert!((rmse(&predictions, &targets) - ((1.25f64) / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(mse_loss(&[], &[]), 0.0);
    }
}
