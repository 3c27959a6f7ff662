// projeto: tempmlptrain
// file: src/neural/data.rs
// Leitura do CSV de sensores, derivação de features e criação das janelas temporais

use chrono::{Datelike, NaiveDateTime, Timelike};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

use crate::neural::utils::TrainingError;

pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M";
pub const TIMESTAMP_CANDIDATES: [&str; 2] = ["timestamp_x", "timestamp"];

/// Column holding the regression target inside every feature vector.
pub const TARGET_INDEX: usize = 0;

const INDOOR_FEATURES: [&str; 4] = ["temperature", "humidity", "hour", "day"];
const OUTDOOR_FEATURES: [&str; 7] = [
    "temperature",
    "humidity",
    "outdoor_temp",
    "outdoor_humidity",
    "outdoor_pressure",
    "hour",
    "day",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSet {
    IndoorOnly,
    IndoorOutdoor,
}

impl FeatureSet {
    pub fn detect(headers: &StringRecord) -> Self {
        if headers.iter().any(|h| h == "outdoor_temp") {
            FeatureSet::IndoorOutdoor
        } else {
            FeatureSet::IndoorOnly
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        match self {
            FeatureSet::IndoorOnly => &INDOOR_FEATURES,
            FeatureSet::IndoorOutdoor => &OUTDOOR_FEATURES,
        }
    }

    pub fn len(&self) -> usize {
        self.names().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutdoorReading {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub outdoor: Option<OutdoorReading>,
}

impl SensorReading {
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    /// Monday = 0 … Sunday = 6
    pub fn day(&self) -> u32 {
        self.timestamp.weekday().num_days_from_monday()
    }

    pub fn features(&self, feature_set: FeatureSet) -> Result<Vec<f64>, TrainingError> {
        let hour = self.hour() as f64;
        let day = self.day() as f64;
        match (feature_set, &self.outdoor) {
            (FeatureSet::IndoorOnly, _) => Ok(vec![self.temperature, self.humidity, hour, day]),
            (FeatureSet::IndoorOutdoor, Some(out)) => Ok(vec![
                self.temperature,
                self.humidity,
                out.temperature,
                out.humidity,
                out.pressure,
                hour,
                day,
            ]),
            (FeatureSet::IndoorOutdoor, None) => Err(TrainingError::DataProcessing(format!(
                "reading at {} has no outdoor data",
                self.timestamp
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorDataset {
    pub timestamp_column: String,
    pub feature_set: FeatureSet,
    pub readings: Vec<SensorReading>,
}

impl SensorDataset {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.feature_set.names().iter().map(|n| n.to_string()).collect()
    }

    /// Rows are readings in chronological order, columns follow `feature_set.names()`.
    pub fn feature_matrix(&self) -> Result<Array2<f64>, TrainingError> {
        let n_features = self.feature_set.len();
        let mut flat = Vec::with_capacity(self.readings.len() * n_features);
        for reading in &self.readings {
            flat.extend(reading.features(self.feature_set)?);
        }
        Ok(Array2::from_shape_vec((self.readings.len(), n_features), flat)?)
    }
}

pub fn load_readings<P: AsRef<Path>>(path: P) -> Result<SensorDataset, TrainingError> {
    let path = path.as_ref();
    info!("📥 Carregando dados de {}", path.display());
    let file = std::fs::File::open(path)?;
    let dataset = load_readings_from_reader(file)?;
    info!("✅ Carregadas {} leituras", dataset.len());
    Ok(dataset)
}

pub fn load_readings_from_reader<R: Read>(reader: R) -> Result<SensorDataset, TrainingError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let timestamp_column = select_timestamp_column(&headers)?;
    let feature_set = FeatureSet::detect(&headers);
    info!("🕐 Coluna de timestamp: {}", timestamp_column);
    match feature_set {
        FeatureSet::IndoorOutdoor => info!("🌤️ Dados externos detectados - treinando com 7 features"),
        FeatureSet::IndoorOnly => info!("🏠 Sem dados externos - treinando com 4 features internas"),
    }

    let ts_idx = column_index(&headers, &timestamp_column)?;
    let temp_idx = column_index(&headers, "temperature")?;
    let hum_idx = column_index(&headers, "humidity")?;
    let outdoor_idx = match feature_set {
        FeatureSet::IndoorOutdoor => Some((
            column_index(&headers, "outdoor_temp")?,
            column_index(&headers, "outdoor_humidity")?,
            column_index(&headers, "outdoor_pressure")?,
        )),
        FeatureSet::IndoorOnly => None,
    };

    let mut readings = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let raw_ts = record.get(ts_idx).unwrap_or_default();
        let timestamp = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT)
            .map_err(|source| TrainingError::TimestampParse {
                row,
                value: raw_ts.to_string(),
                source,
            })?;

        let outdoor = match outdoor_idx {
            Some((t, h, p)) => Some(OutdoorReading {
                temperature: parse_value(&record, &headers, t, row)?,
                humidity: parse_value(&record, &headers, h, row)?,
                pressure: parse_value(&record, &headers, p, row)?,
            }),
            None => None,
        };

        readings.push(SensorReading {
            timestamp,
            temperature: parse_value(&record, &headers, temp_idx, row)?,
            humidity: parse_value(&record, &headers, hum_idx, row)?,
            outdoor,
        });
    }

    // stable: equal timestamps keep file order
    readings.sort_by_key(|r| r.timestamp);
    debug!("🔧 {} leituras ordenadas por timestamp", readings.len());

    Ok(SensorDataset {
        timestamp_column,
        feature_set,
        readings,
    })
}

fn select_timestamp_column(headers: &StringRecord) -> Result<String, TrainingError> {
    TIMESTAMP_CANDIDATES
        .iter()
        .find(|candidate| headers.iter().any(|h| h == **candidate))
        .map(|c| c.to_string())
        .or_else(|| headers.get(0).map(|h| h.to_string()))
        .ok_or_else(|| TrainingError::MissingColumn("timestamp".to_string()))
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize, TrainingError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| TrainingError::MissingColumn(name.to_string()))
}

fn parse_value(
    record: &StringRecord,
    headers: &StringRecord,
    idx: usize,
    row: usize,
) -> Result<f64, TrainingError> {
    let raw = record.get(idx).unwrap_or_default();
    raw.parse::<f64>().map_err(|_| TrainingError::InvalidValue {
        column: headers.get(idx).unwrap_or_default().to_string(),
        row,
        value: raw.to_string(),
    })
}

/// Flattens `lookback` consecutive rows into one sample; the target is
/// column `TARGET_INDEX` of the row right after the window.
pub fn create_sequences(
    data: &Array2<f64>,
    lookback: usize,
) -> Result<(Array2<f64>, Array1<f64>), TrainingError> {
    if lookback == 0 {
        return Err(TrainingError::ModelConfiguration("lookback must be greater than zero".into()));
    }
    let (n_rows, n_features) = data.dim();
    let count = n_rows.saturating_sub(lookback);

    let mut sequences = Array2::zeros((count, lookback * n_features));
    let mut targets = Array1::zeros(count);

    for (sample, i) in (lookback..n_rows).enumerate() {
        let window = data.slice(s![i - lookback..i, ..]);
        sequences
            .row_mut(sample)
            .iter_mut()
            .zip(window.iter())
            .for_each(|(dst, &src)| *dst = src);
        targets[sample] = data[[i, TARGET_INDEX]];
    }

    debug!("✅ Criadas {} sequências de tamanho {}", count, lookback * n_features);
    Ok((sequences, targets))
}

#[derive(Debug, Clone)]
pub struct DataSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
    pub split_index: usize,
}

/// Positional split: `floor(ratio * n)` leading samples go to the first part.
pub fn chronological_split(x: &Array2<f64>, y: &Array1<f64>, ratio: f64) -> Result<DataSplit, TrainingError> {
    if x.nrows() != y.len() {
        return Err(TrainingError::Shape(format!(
            "{} sequences but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    let split_index = split_point(x.nrows(), ratio);
    Ok(DataSplit {
        x_train: x.slice(s![..split_index, ..]).to_owned(),
        y_train: y.slice(s![..split_index]).to_owned(),
        x_test: x.slice(s![split_index.., ..]).to_owned(),
        y_test: y.slice(s![split_index..]).to_owned(),
        split_index,
    })
}

pub fn split_point(total: usize, ratio: f64) -> usize {
    ((ratio * total as f64).floor() as usize).min(total)
}
