// projeto: tempmlptrain
// file: src/neural/scaler.rs
// Normalização min-max por feature e constantes para o firmware

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::neural::utils::TrainingError;

/// Per-column min-max bounds, fitted once and reused for denormalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub feature_names: Vec<String>,
    pub data_min: Array1<f64>,
    pub data_max: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(data: &Array2<f64>, feature_names: &[String]) -> Result<Self, TrainingError> {
        if data.nrows() == 0 {
            return Err(TrainingError::DataProcessing("cannot fit scaler on empty data".into()));
        }
        if data.ncols() != feature_names.len() {
            return Err(TrainingError::Shape(format!(
                "{} columns but {} feature names",
                data.ncols(),
                feature_names.len()
            )));
        }

        let data_min = data.map_axis(Axis(0), |col| col.iter().fold(f64::INFINITY, |a, &b| a.min(b)));
        let data_max = data.map_axis(Axis(0), |col| col.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b)));

        Ok(MinMaxScaler {
            feature_names: feature_names.to_vec(),
            data_min,
            data_max,
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn range(&self, feature: usize) -> f64 {
        self.data_max[feature] - self.data_min[feature]
    }

    /// A constant column (max == min) maps to 0.
    pub fn normalize(&self, feature: usize, value: f64) -> f64 {
        let range = self.range(feature);
        if range == 0.0 {
            0.0
        } else {
            (value - self.data_min[feature]) / range
        }
    }

    pub fn denormalize(&self, feature: usize, value: f64) -> f64 {
        value * self.range(feature) + self.data_min[feature]
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, TrainingError> {
        if data.ncols() != self.n_features() {
            return Err(TrainingError::Shape(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                data.ncols()
            )));
        }
        let mut scaled = data.clone();
        for (feature, mut column) in scaled.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|x| self.normalize(feature, x));
        }
        Ok(scaled)
    }

    pub fn denormalize_all(&self, feature: usize, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.denormalize(feature, v)).collect()
    }

    /// C declarations ready to paste into the firmware sources.
    pub fn firmware_constants(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.n_features() * 2);
        for (i, name) in self.feature_names.iter().enumerate() {
            let prefix = name.to_uppercase();
            lines.push(format!("const float {}_MIN = {:.2};", prefix, self.data_min[i]));
            lines.push(format!("const float {}_MAX = {:.2};", prefix, self.data_max[i]));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_fit_and_transform_into_unit_range() {
        let data = Array2::from_shape_vec((3, 2), vec![10.0, -5.0, 20.0, 0.0, 15.0, 5.0]).unwrap();
        let scaler = MinMaxScaler::fit(&data, &names(2)).unwrap();
        assert_eq!(scaler.data_min.to_vec(), vec![10.0, -5.0]);
        assert_eq!(scaler.data_max.to_vec(), vec![20.0, 5.0]);

        let scaled = scaler.transform(&data).unwrap();
        assert_eq!(scaled.column(0).to_vec(), vec![0.0, 1.0, 0.5]);
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_round_trip() {
        let data = Array2::from_shape_fn((50, 3), |(r, c)| (r as f64 * 0.37 + c as f64).sin() * 12.3 + c as f64);
        let scaler = MinMaxScaler::fit(&data, &names(3)).unwrap();
        let scaled = scaler.transform(&data).unwrap();
        for ((r, c), &original) in data.indexed_iter() {
            let back = scaler.denormalize(c, scaled[[r, c]]);
            assert!((back - original).abs() < 1e-9);
            let again = scaler.normalize(c, back);
            assert!((again - scaled[[r, c]]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_column() {
        let data = Array2::from_shape_fn((10, 2), |(r, c)| if c == 0 { 20.0 } else { r as f64 });
        let scaler = MinMaxScaler::fit(&data, &names(2)).unwrap();
        assert_eq!(scaler.data_min[0], scaler.data_max[0]);

        let scaled = scaler.transform(&data).unwrap();
        assert!(scaled.column(0).iter().all(|&v| v == 0.0));
        assert_eq!(scaler.denormalize(0, 0.0), 20.0);
        assert_eq!(scaler.denormalize(0, 0.73), 20.0);
    }

    #[test]
    fn test_firmware_constants() {
        let data = Array2::from_shape_vec((2, 2), vec![18.234, 30.0, 25.5, 60.0]).unwrap();
        let scaler = MinMaxScaler::fit(&data, &["temperature".to_string(), "humidity".to_string()]).unwrap();
        let lines = scaler.firmware_constants();
        assert_eq!(
            lines,
            vec![
                "const float TEMPERATURE_MIN = 18.23;",
                "const float TEMPERATURE_MAX = 25.50;",
                "const float HUMIDITY_MIN = 30.00;",
                "const float HUMIDITY_MAX = 60.00;",
            ]
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let data = Array2::<f64>::zeros((2, 3));
        assert!(MinMaxScaler::fit(&data, &names(2)).is_err());
        assert!(MinMaxScaler::fit(&Array2::zeros((0, 2)), &names(2)).is_err());
        let scaler = MinMaxScaler::fit(&Array2::zeros((2, 2)), &names(2)).unwrap();
        assert!(scaler.transform(&data).is_err());
    }
}
