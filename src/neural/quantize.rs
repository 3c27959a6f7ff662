// projeto: tempmlptrain
// file: src/neural/quantize.rs
// Quantização int8 dos pesos (escala simétrica por neurônio) para inferência no ESP32

use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::neural::model::{Activation, DenseLayer, NeuralNetwork};
use crate::neural::utils::TrainingError;

pub const MAGIC: [u8; 4] = *b"TQM1";
const QMAX: f32 = 127.0;

/// Dense layer with int8 kernel and f32 bias.
///
/// `weights` is row-major `(inputs, units)`; `scales[j]` dequantizes column `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedDense {
    pub inputs: u32,
    pub units: u32,
    pub activation: Activation,
    pub scales: Vec<f32>,
    pub weights: Vec<i8>,
    pub bias: Vec<f32>,
}

impl QuantizedDense {
    pub fn from_dense(dense: &DenseLayer) -> Self {
        let (inputs, units) = dense.w.dim();
        let scales: Vec<f32> = dense
            .w
            .columns()
            .into_iter()
            .map(|col| {
                let max_abs = col.iter().fold(0.0f32, |a, &w| a.max((w as f32).abs()));
                if max_abs > 0.0 { max_abs / QMAX } else { 1.0 }
            })
            .collect();

        let mut weights = Vec::with_capacity(inputs * units);
        for row in dense.w.rows() {
            for (j, &w) in row.iter().enumerate() {
                let q = ((w as f32) / scales[j]).round().clamp(-QMAX, QMAX);
                weights.push(q as i8);
            }
        }

        QuantizedDense {
            inputs: inputs as u32,
            units: units as u32,
            activation: dense.activation,
            scales,
            weights,
            bias: dense.b.iter().map(|&b| b as f32).collect(),
        }
    }

    #[cfg(test)]
    pub fn dequantized_weights(&self) -> Array2<f32> {
        let units = self.units as usize;
        Array2::from_shape_fn((self.inputs as usize, units), |(i, j)| {
            self.weights[i * units + j] as f32 * self.scales[j]
        })
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let units = self.units as usize;
        let mut out = self.bias.clone();
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row = &self.weights[i * units..(i + 1) * units];
            for (j, &q) in row.iter().enumerate() {
                out[j] += x * q as f32 * self.scales[j];
            }
        }
        if self.activation == Activation::Relu {
            out.iter_mut().for_each(|v| *v = v.max(0.0));
        }
        out
    }

    fn check(&self) -> Result<(), TrainingError> {
        let (inputs, units) = (self.inputs as usize, self.units as usize);
        if self.weights.len() != inputs * units || self.scales.len() != units || self.bias.len() != units {
            return Err(TrainingError::Serialization(format!(
                "quantized layer {}x{} has inconsistent buffers",
                inputs, units
            )));
        }
        Ok(())
    }
}

/// Compact inference model: dropout removed, kernels in int8.
///
/// On disk the bincode payload follows the 4-byte `MAGIC` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedModel {
    pub input_size: u32,
    pub layers: Vec<QuantizedDense>,
}

fn codec_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

impl QuantizedModel {
    pub fn from_network(model: &NeuralNetwork) -> Self {
        let layers: Vec<QuantizedDense> = model.dense_layers().map(QuantizedDense::from_dense).collect();
        debug!("🗜️ Quantizadas {} camadas densas", layers.len());
        QuantizedModel {
            input_size: model.input_size() as u32,
            layers,
        }
    }

    /// Buffer sizes per layer, each layer fed by the previous one, single output.
    pub fn validate(&self) -> Result<(), TrainingError> {
        let mut expected_inputs = self.input_size;
        for (i, layer) in self.layers.iter().enumerate() {
            layer.check()?;
            if layer.inputs != expected_inputs {
                return Err(TrainingError::Serialization(format!(
                    "quantized layer {} takes {} inputs but is fed {}",
                    i, layer.inputs, expected_inputs
                )));
            }
            expected_inputs = layer.units;
        }
        if self.layers.is_empty() || expected_inputs != 1 {
            return Err(TrainingError::Serialization(format!(
                "quantized model must end in a single output unit, got {}",
                expected_inputs
            )));
        }
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, TrainingError> {
        let payload = bincode::serde::encode_to_vec(self, codec_config())
            .map_err(|e| TrainingError::Serialization(format!("Failed to encode quantized model: {}", e)))?;
        let mut bytes = Vec::with_capacity(MAGIC.len() + payload.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TrainingError> {
        self.validate()?;
        self.encode()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrainingError> {
        let payload = bytes
            .strip_prefix(&MAGIC[..])
            .ok_or_else(|| TrainingError::Serialization(format!("bad magic {:?}", &bytes[..bytes.len().min(4)])))?;
        let (model, consumed): (QuantizedModel, usize) = bincode::serde::decode_from_slice(payload, codec_config())
            .map_err(|e| TrainingError::Serialization(format!("Failed to decode quantized model: {}", e)))?;
        if consumed != payload.len() {
            return Err(TrainingError::Serialization(format!(
                "{} trailing bytes after quantized model",
                payload.len() - consumed
            )));
        }
        model.validate()?;
        Ok(model)
    }

    pub fn predict_one(&self, input: &[f32]) -> Result<f32, TrainingError> {
        if input.len() != self.input_size as usize {
            return Err(TrainingError::Shape(format!(
                "quantized model expects {} inputs, got {}",
                self.input_size,
                input.len()
            )));
        }
        let mut current = input.to_vec();
        for layer in &self.layers {
            current = layer.forward(&current);
        }
        current
            .first()
            .copied()
            .ok_or_else(|| TrainingError::ModelConfiguration("quantized model has no output".into()))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        let mut out = Vec::with_capacity(x.nrows());
        for row in x.rows() {
            let input: Vec<f32> = row.iter().map(|&v| v as f32).collect();
            out.push(self.predict_one(&input)? as f64);
        }
        Ok(Array1::from_vec(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model(input_size: usize) -> NeuralNetwork {
        NeuralNetwork::new(input_size, 0.2, &mut StdRng::seed_from_u64(7)).unwrap()
    }

    #[test]
    fn test_quantization_error_is_bounded_by_half_step() {
        let net = model(12);
        let quantized = QuantizedModel::from_network(&net);
        assert_eq!(quantized.layers.len(), 4);
        for (dense, q) in net.dense_layers().zip(&quantized.layers) {
            let deq = q.dequantized_weights();
            for ((i, j), &w) in dense.w.indexed_iter() {
                let err = (w as f32 - deq[[i, j]]).abs();
                assert!(err <= q.scales[j] / 2.0 + 1e-6, "w={} deq={}", w, deq[[i, j]]);
            }
            assert!(q.weights.iter().all(|&v| (-127..=127).contains(&v)));
        }
    }

    #[test]
    fn test_zero_column_gets_unit_scale() {
        let dense = DenseLayer {
            w: Array2::from_shape_vec((2, 2), vec![0.0, 0.25, 0.0, -1.0]).unwrap(),
            b: ndarray::Array1::from_vec(vec![0.1, 0.2]),
            activation: Activation::Linear,
        };
        let q = QuantizedDense::from_dense(&dense);
        assert_eq!(q.scales[0], 1.0);
        assert_eq!(q.weights, vec![0, 32, 0, -127]);
        assert_eq!(q.bias, vec![0.1f32, 0.2f32]);
    }

    #[test]
    fn test_bytes_round_trip_and_magic() {
        let quantized = QuantizedModel::from_network(&model(8));
        let bytes = quantized.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"TQM1");
        let restored = QuantizedModel::from_bytes(&bytes).unwrap();
        assert_eq!(restored, quantized);

        let mut corrupted = bytes.clone();
        corrupted[0] = b'X';
        assert!(QuantizedModel::from_bytes(&corrupted).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(QuantizedModel::from_bytes(&trailing).is_err());

        assert!(QuantizedModel::from_bytes(&bytes[..3]).is_err());
    }

    #[test]
    fn test_decode_rejects_broken_layer_chain() {
        let mut quantized = QuantizedModel::from_network(&model(8));
        quantized.input_size = 9;
        assert!(quantized.to_bytes().is_err());

        let bytes = quantized.encode().unwrap();
        assert!(QuantizedModel::from_bytes(&bytes).is_err());

        let mut quantized = QuantizedModel::from_network(&model(8));
        quantized.layers[2].inputs = 20;
        quantized.layers[2].weights = vec![0; 20 * 16];
        assert!(QuantizedModel::from_bytes(&quantized.encode().unwrap()).is_err());

        let mut quantized = QuantizedModel::from_network(&model(8));
        quantized.layers.pop();
        assert!(QuantizedModel::from_bytes(&quantized.encode().unwrap()).is_err());
    }

    #[test]
    fn test_quantized_predictions_track_float_model() {
        let net = model(16);
        let quantized = QuantizedModel::from_network(&net);
        let x = Array2::from_shape_fn((10, 16), |(r, c)| ((r * 5 + c) % 9) as f64 / 8.0);
        let float_preds = net.predict(&x).unwrap();
        let quant_preds = quantized.predict(&x).unwrap();
        for (a, b) in float_preds.iter().zip(quant_preds.iter()) {
            assert!((a - b).abs() < 0.05, "float {} quantized {}", a, b);
        }
        assert!(quantized.predict_one(&[0.0; 3]).is_err());
    }

    #[test]
    fn test_quantized_is_smaller_than_float_weights() {
        let net = model(96);
        let bytes = QuantizedModel::from_network(&net).to_bytes().unwrap();
        assert!(bytes.len() < net.num_parameters() * 4);
    }
}
