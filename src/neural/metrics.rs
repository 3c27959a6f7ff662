// projeto: tempmlptrain
// file: src/neural/metrics.rs
// Training history and evaluation report

use csv::Writer;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::neural::utils::TrainingError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub mae: f64,
    pub val_loss: Option<f64>,
    pub val_mae: Option<f64>,
}

impl TrainingMetrics {
    pub fn progress_line(&self, total_epochs: usize) -> String {
        let mut line = format!(
            "Epoch {}/{} - loss: {:.6} - mae: {:.6}",
            self.epoch, total_epochs, self.loss, self.mae
        );
        if let (Some(val_loss), Some(val_mae)) = (self.val_loss, self.val_mae) {
            line.push_str(&format!(" - val_loss: {:.6} - val_mae: {:.6}", val_loss, val_mae));
        }
        line
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsTracker {
    pub history: Vec<TrainingMetrics>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        MetricsTracker { history: Vec::new() }
    }

    pub fn add_metrics(&mut self, metrics: TrainingMetrics) {
        self.history.push(metrics);
    }

    /// Epoch with the lowest validation loss, or the lowest training loss
    /// when no validation data was available.
    pub fn get_best_metrics(&self) -> Option<&TrainingMetrics> {
        self.history.iter().min_by(|a, b| {
            let ka = a.val_loss.unwrap_or(a.loss);
            let kb = b.val_loss.unwrap_or(b.loss);
            ka.total_cmp(&kb)
        })
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.history.last()
    }

    pub fn print_summary(&self) {
        if let (Some(best), Some(last)) = (self.get_best_metrics(), self.get_latest_metrics()) {
            info!("📈 Resumo do treinamento:");
            info!("   ├── Épocas: {}", self.history.len());
            info!("   ├── Melhor época: {}", best.epoch);
            info!("   ├── Loss final: {:.6} | MAE final: {:.6}", last.loss, last.mae);
            match (last.val_loss, last.val_mae) {
                (Some(vl), Some(vm)) => info!("   └── Val loss final: {:.6} | Val MAE final: {:.6}", vl, vm),
                _ => info!("   └── Sem dados de validação"),
            }
        }
    }

    pub fn save_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TrainingError> {
        let path = path.as_ref();
        let mut writer = Writer::from_path(path)?;
        for metrics in &self.history {
            writer.serialize(metrics)?;
        }
        writer.flush()?;
        info!("📊 Histórico de treinamento salvo em: {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePrediction {
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// MSE on the normalized target
    pub test_loss: f64,
    pub test_mae: f64,
    /// RMSE in °C after denormalization
    pub rmse_celsius: f64,
    pub quantized_rmse_celsius: Option<f64>,
    pub samples: Vec<SamplePrediction>,
}

impl EvaluationReport {
    pub fn sample_lines(&self) -> Vec<String> {
        self.samples
            .iter()
            .map(|s| format!("  Actual: {:.2}°C, Predicted: {:.2}°C", s.actual, s.predicted))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn metrics(epoch: usize, loss: f64, val_loss: Option<f64>) -> TrainingMetrics {
        TrainingMetrics {
            epoch,
            loss,
            mae: loss / 2.0,
            val_loss,
            val_mae: val_loss.map(|v| v / 2.0),
        }
    }

    #[test]
    fn test_best_epoch_uses_validation_loss() {
        let mut tracker = MetricsTracker::new();
        tracker.add_metrics(metrics(1, 0.5, Some(0.40)));
        tracker.add_metrics(metrics(2, 0.3, Some(0.20)));
        tracker.add_metrics(metrics(3, 0.1, Some(0.25)));
        assert_eq!(tracker.get_best_metrics().unwrap().epoch, 2);
        assert_eq!(tracker.get_latest_metrics().unwrap().epoch, 3);
    }

    #[test]
    fn test_best_epoch_without_validation() {
        let mut tracker = MetricsTracker::new();
        tracker.add_metrics(metrics(1, 0.5, None));
        tracker.add_metrics(metrics(2, 0.3, None));
        assert_eq!(tracker.get_best_metrics().unwrap().epoch, 2);
    }

    #[test]
    fn test_progress_line() {
        let line = metrics(3, 0.5, Some(0.25)).progress_line(100);
        assert_eq!(line, "Epoch 3/100 - loss: 0.500000 - mae: 0.250000 - val_loss: 0.250000 - val_mae: 0.125000");
        let line = metrics(1, 0.5, None).progress_line(2);
        assert!(!line.contains("val_loss"));
    }

    #[test]
    fn test_save_to_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut tracker = MetricsTracker::new();
        tracker.add_metrics(metrics(1, 0.5, Some(0.4)));
        tracker.add_metrics(metrics(2, 0.3, None));
        tracker.save_to_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "epoch,loss,mae,val_loss,val_mae");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with(",,"));
    }

    #[test]
    fn test_sample_lines() {
        let report = EvaluationReport {
            test_loss: 0.01,
            test_mae: 0.05,
            rmse_celsius: 0.4,
            quantized_rmse_celsius: None,
            samples: vec![SamplePrediction { actual: 21.456, predicted: 21.0 }],
        };
        assert_eq!(report.sample_lines(), vec!["  Actual: 21.46°C, Predicted: 21.00°C"]);
    }
}
