// projeto: tempmlptrain
// file: src/neural/storage.rs
// Exportação do modelo: checkpoint JSON, binário quantizado e header C para o firmware

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::neural::metrics::MetricsTracker;
use crate::neural::model::{ModelWeights, NeuralNetwork};
use crate::neural::scaler::MinMaxScaler;
use crate::neural::utils::TrainingError;

pub const BYTES_PER_LINE: usize = 12;

/// Full-precision snapshot with everything needed to rebuild the inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub weights: ModelWeights,
    pub feature_names: Vec<String>,
    pub scaler: MinMaxScaler,
    pub lookback: usize,
    pub history: MetricsTracker,
    pub created_at: DateTime<Utc>,
}

impl ModelCheckpoint {
    pub fn new(model: &NeuralNetwork, scaler: &MinMaxScaler, lookback: usize, history: &MetricsTracker) -> Self {
        ModelCheckpoint {
            weights: model.get_weights(),
            feature_names: scaler.feature_names.clone(),
            scaler: scaler.clone(),
            lookback,
            history: history.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrainingError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrainingError::Serialization(format!("Failed to serialize checkpoint: {}", e)))?;
        fs::write(path, json)?;
        info!("💾 Checkpoint salvo em: {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| TrainingError::Serialization(format!("Failed to parse checkpoint: {}", e)))
    }

    pub fn into_network(self) -> Result<NeuralNetwork, TrainingError> {
        if self.weights.input_size != self.lookback * self.feature_names.len() {
            return Err(TrainingError::ModelConfiguration(format!(
                "checkpoint input size {} does not match lookback {} x {} features",
                self.weights.input_size,
                self.lookback,
                self.feature_names.len()
            )));
        }
        NeuralNetwork::from_weights(self.weights)
    }
}

pub fn save_quantized<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), TrainingError> {
    let path = path.as_ref();
    fs::write(path, bytes)?;
    info!("💾 Modelo quantizado salvo em: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Hex literals, `BYTES_PER_LINE` per line, each line indented two spaces.
pub fn to_c_array(bytes: &[u8]) -> String {
    bytes
        .chunks(BYTES_PER_LINE)
        .map(|chunk| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
            format!("  {}", hex.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n")
}

pub fn render_header(symbol: &str, bytes: &[u8]) -> String {
    format!(
        "const unsigned char {symbol}[] = {{\n{}\n}};\nconst unsigned int {symbol}_len = {};\n",
        to_c_array(bytes),
        bytes.len()
    )
}

pub fn write_header<P: AsRef<Path>>(path: P, symbol: &str, bytes: &[u8]) -> Result<(), TrainingError> {
    let path = path.as_ref();
    fs::write(path, render_header(symbol, bytes))?;
    info!("💾 Header C salvo em: {}", path.display());
    Ok(())
}

/// Reads back the array body and the `_len` constant of a generated header.
pub fn parse_header(text: &str) -> Result<(Vec<u8>, usize), TrainingError> {
    let open = text
        .find('{')
        .ok_or_else(|| TrainingError::Serialization("header has no array body".into()))?;
    let close = text[open..]
        .find("};")
        .map(|i| open + i)
        .ok_or_else(|| TrainingError::Serialization("header array is not closed".into()))?;

    let mut bytes = Vec::new();
    for token in text[open + 1..close].split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let hex = token
            .strip_prefix("0x")
            .ok_or_else(|| TrainingError::Serialization(format!("bad byte literal '{}'", token)))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|e| TrainingError::Serialization(format!("bad byte literal '{}': {}", token, e)))?;
        bytes.push(byte);
    }

    let len = text[close..]
        .lines()
        .find_map(|line| {
            let (decl, value) = line.split_once('=')?;
            decl.trim_end().ends_with("_len").then(|| value.trim().trim_end_matches(';').trim().to_string())
        })
        .ok_or_else(|| TrainingError::Serialization("header has no _len constant".into()))?;
    let len = len
        .parse::<usize>()
        .map_err(|e| TrainingError::Serialization(format!("bad _len value '{}': {}", len, e)))?;

    debug!("🔍 Header lido: {} bytes, _len = {}", bytes.len(), len);
    Ok((bytes, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::metrics::TrainingMetrics;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn test_c_array_layout() {
        let bytes: Vec<u8> = (0u8..26).collect();
        let body = to_c_array(&bytes);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "  0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b,"
        );
        assert_eq!(lines[2], "  0x18, 0x19");
        assert!(to_c_array(&[]).is_empty());
    }

    #[test]
    fn test_header_round_trip() {
        let bytes: Vec<u8> = (0..301u32).map(|i| (i * 37 % 256) as u8).collect();
        let header = render_header("temp_model", &bytes);
        assert!(header.starts_with("const unsigned char temp_model[] = {\n"));
        assert!(header.contains("};\nconst unsigned int temp_model_len = 301;"));

        let (parsed, len) = parse_header(&header).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(parsed, bytes);
    }

    #[test]
    fn test_header_lines_rebuild_bytes_in_chunks() {
        let bytes: Vec<u8> = (0..40u8).rev().collect();
        let body = to_c_array(&bytes);
        for (line, chunk) in body.lines().zip(bytes.chunks(BYTES_PER_LINE)) {
            let decoded: Vec<u8> = line
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| u8::from_str_radix(t.trim_start_matches("0x"), 16).unwrap())
                .collect();
            assert_eq!(decoded, chunk);
        }
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        assert!(parse_header("no array here").is_err());
        assert!(parse_header("const unsigned char x[] = {\n  0xzz\n};\nconst unsigned int x_len = 1;").is_err());
        assert!(parse_header("const unsigned char x[] = {\n  0x01\n};\n").is_err());
    }

    #[test]
    fn test_checkpoint_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");

        let model = NeuralNetwork::new(2 * 4, 0.2, &mut StdRng::seed_from_u64(3)).unwrap();
        let data = Array2::from_shape_fn((5, 4), |(r, c)| (r + c) as f64);
        let names: Vec<String> = ["temperature", "humidity", "hour", "day"].iter().map(|s| s.to_string()).collect();
        let scaler = MinMaxScaler::fit(&data, &names).unwrap();
        let mut history = MetricsTracker::new();
        history.add_metrics(TrainingMetrics { epoch: 1, loss: 0.2, mae: 0.3, val_loss: None, val_mae: None });

        let checkpoint = ModelCheckpoint::new(&model, &scaler, 2, &history);
        checkpoint.save(&path).unwrap();

        let loaded = ModelCheckpoint::load(&path).unwrap();
        assert_eq!(loaded.lookback, 2);
        assert_eq!(loaded.feature_names, names);
        assert_eq!(loaded.scaler, scaler);
        assert_eq!(loaded.history.history.len(), 1);

        let x = Array2::from_shape_fn((3, 8), |(r, c)| (r * c) as f64 / 10.0);
        let restored = loaded.into_network().unwrap();
        let a = model.predict(&x).unwrap();
        let b = restored.predict(&x).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-12);
        }
    }

    #[test]
    fn test_write_header_and_quantized_files() {
        let dir = tempdir().unwrap();
        let bytes = vec![0x54u8, 0x51, 0x4d, 0x31, 0xff];
        save_quantized(dir.path().join("m.bin"), &bytes).unwrap();
        write_header(dir.path().join("m.h"), "m", &bytes).unwrap();

        assert_eq!(fs::read(dir.path().join("m.bin")).unwrap(), bytes);
        let text = fs::read_to_string(dir.path().join("m.h")).unwrap();
        let (parsed, len) = parse_header(&text).unwrap();
        assert_eq!((parsed, len), (bytes.clone(), 5));
    }
}
