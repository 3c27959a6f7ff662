// projeto: tempmlptrain
// file: src/main.rs
// Treinamento do modelo de temperatura interna e exportação para o ESP32

mod neural;

use chrono::Utc;
use clap::Parser;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::neural::config::{CHECKPOINT_FILE, HEADER_FILE, HEADER_SYMBOL, QUANTIZED_FILE};
use crate::neural::data::{chronological_split, create_sequences, DataSplit, TARGET_INDEX};
use crate::neural::metrics::{EvaluationReport, MetricsTracker, SamplePrediction};
use crate::neural::storage::{parse_header, save_quantized, write_header};
use crate::neural::utils::rmse;
use crate::neural::{
    load_readings, AdamOptimizer, FitOptions, MinMaxScaler, ModelCheckpoint, NeuralNetwork, QuantizedModel,
    TrainConfig, TrainingError,
};

const SAMPLE_PREDICTIONS: usize = 10;

#[derive(Parser, Debug)]
#[command(
    name = "temp-train",
    author = "Júnior NSF",
    version,
    about = "Treina a rede densa de previsão de temperatura interna e gera o modelo para o ESP32",
    long_about = "Lê o CSV dos sensores, normaliza, cria janelas deslizantes, treina um MLP 64-32-16-1 e exporta checkpoint JSON, binário int8 e header C."
)]
struct Cli {
    /// Arquivo TOML com a configuração base
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSV com as leituras dos sensores
    #[arg(long)]
    csv_file: Option<String>,

    /// Número de leituras por janela
    #[arg(long, help = "Leituras horárias usadas em cada predição")]
    lookback: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, help = "Learning rate para Adam optimizer")]
    learning_rate: Option<f64>,

    /// Semente para inicialização e embaralhamento reprodutíveis
    #[arg(long)]
    seed: Option<u64>,

    /// Diretório dos arquivos gerados
    #[arg(long)]
    output_dir: Option<String>,

    /// Salvar o histórico por época neste CSV
    #[arg(long)]
    history_csv: Option<String>,

    /// Modo verboso de logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    /// TOML first (or defaults), then command-line overrides.
    fn build_config(&self) -> Result<TrainConfig, TrainingError> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_file(path)?,
            None => TrainConfig::default(),
        };
        if let Some(csv_file) = &self.csv_file {
            config.csv_file = csv_file.clone();
        }
        if let Some(lookback) = self.lookback {
            config.lookback = lookback;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if self.history_csv.is_some() {
            config.history_csv = self.history_csv.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// What a finished run produced.
struct RunSummary {
    report: EvaluationReport,
    quantized_len: usize,
    files: Vec<PathBuf>,
}

fn main() -> Result<(), TrainingError> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let start_time = Instant::now();
    info!("🚀 Treinamento do modelo de temperatura iniciado");
    info!("🕐 Iniciado em: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

    let result = cli.build_config().and_then(|config| run(&config));

    let elapsed = start_time.elapsed();
    match result {
        Ok(summary) => {
            info!(
                "✅ Concluído em {:.2}s | RMSE {:.2}°C | {} bytes quantizados | {} arquivos",
                elapsed.as_secs_f64(),
                summary.report.rmse_celsius,
                summary.quantized_len,
                summary.files.len()
            );
            info!("🏁 Finalizado em: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        }
        Err(e) => {
            error!("❌ Erro durante treinamento: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

fn run(config: &TrainConfig) -> Result<RunSummary, TrainingError> {
    config.print_summary();
    debug!("⚙️ Configuração efetiva:\n{}", config.to_toml()?);

    // Ingestão e features
    let dataset = load_readings(&config.csv_file)?;
    if dataset.is_empty() {
        return Err(TrainingError::DataProcessing(format!("{} has no readings", config.csv_file)));
    }
    let feature_names = dataset.feature_names();
    let raw = dataset.feature_matrix()?;
    debug!("🕐 Timestamp de {} usado para ordenar", dataset.timestamp_column);
    debug!("📋 Features: {}", feature_names.join(", "));

    // Normalização sobre o conjunto completo, antes da divisão
    let scaler = MinMaxScaler::fit(&raw, &feature_names)?;
    print_firmware_constants(&scaler);
    let scaled = scaler.transform(&raw)?;

    // Janelas
    let (x, y) = create_sequences(&scaled, config.lookback)?;
    if x.nrows() == 0 {
        return Err(TrainingError::DataProcessing(format!(
            "{} readings are not enough for a lookback of {}",
            dataset.len(),
            config.lookback
        )));
    }
    info!("✅ Criadas {} sequências", x.nrows());
    info!("📐 Input shape: ({}, {})", x.nrows(), x.ncols());

    let split = chronological_split(&x, &y, config.train_split)?;
    if split.x_train.nrows() == 0 || split.x_test.nrows() == 0 {
        return Err(TrainingError::DataProcessing(format!(
            "split of {} sequences left {} for training and {} for testing",
            x.nrows(),
            split.x_train.nrows(),
            split.x_test.nrows()
        )));
    }
    debug!("✂️ Divisão no índice {}", split.split_index);
    info!("📊 Amostras de treino: {}", split.x_train.nrows());
    info!("📊 Amostras de teste: {}", split.x_test.nrows());

    // Modelo
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    info!("🛠️ Construindo modelo feed-forward");
    let mut model = NeuralNetwork::new(x.ncols(), config.dropout_rate, &mut rng)?;
    for line in model.summary() {
        info!("{}", line);
    }

    info!("🎓 Iniciando treinamento por {} épocas", config.epochs);
    let mut optimizer = AdamOptimizer::new(config.learning_rate, 0.9, 0.999, 1e-7);
    let options = FitOptions {
        epochs: config.epochs,
        batch_size: config.batch_size,
        validation_split: config.validation_split,
    };
    let history = model.fit(&split.x_train, &split.y_train, options, &mut optimizer, &mut rng)?;
    history.print_summary();

    // Avaliação: o modelo quantizado é lido de volta dos bytes que vão para o firmware
    let quantized_bytes = QuantizedModel::from_network(&model).to_bytes()?;
    let quantized = QuantizedModel::from_bytes(&quantized_bytes)?;
    let report = evaluate(&model, &quantized, &scaler, &split)?;
    info!("🧪 Test Loss: {:.6}", report.test_loss);
    info!("🧪 Test MAE: {:.6}", report.test_mae);
    info!("🌡️ Actual Temperature RMSE: {:.2}°C", report.rmse_celsius);
    if let Some(q_rmse) = report.quantized_rmse_celsius {
        info!("🗜️ Quantized model RMSE: {:.2}°C", q_rmse);
    }
    println!();
    println!("Sample Predictions:");
    for line in report.sample_lines() {
        println!("{}", line);
    }

    // Exportação
    let files = export(config, &model, &quantized_bytes, &scaler, &history)?;
    let quantized_len = quantized_bytes.len();
    info!("📦 Model saved! Size: {:.2} KB", quantized_len as f64 / 1024.0);
    let names: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
    info!("📁 Files: {}", names.join(", "));
    info!("👉 Inclua {} no projeto do firmware", HEADER_FILE);
    info!("Input shape for ESP32: [{}, {}]", config.lookback, feature_names.len());

    Ok(RunSummary {
        report,
        quantized_len,
        files,
    })
}

fn print_firmware_constants(scaler: &MinMaxScaler) {
    println!();
    println!("COPY THESE VALUES TO ESP32 CODE");
    for line in scaler.firmware_constants() {
        println!("{}", line);
    }
    println!();
}

fn evaluate(
    model: &NeuralNetwork,
    quantized: &QuantizedModel,
    scaler: &MinMaxScaler,
    split: &DataSplit,
) -> Result<EvaluationReport, TrainingError> {
    info!("🔍 Avaliando no conjunto de teste");
    let (test_loss, test_mae) = model.evaluate(&split.x_test, &split.y_test)?;

    let actual = scaler.denormalize_all(TARGET_INDEX, &split.y_test.to_vec());
    let predicted = scaler.denormalize_all(TARGET_INDEX, &model.predict(&split.x_test)?.to_vec());
    let quantized_predicted = scaler.denormalize_all(TARGET_INDEX, &quantized.predict(&split.x_test)?.to_vec());

    let samples = actual
        .iter()
        .zip(&predicted)
        .take(SAMPLE_PREDICTIONS)
        .map(|(&actual, &predicted)| SamplePrediction { actual, predicted })
        .collect();

    Ok(EvaluationReport {
        test_loss,
        test_mae,
        rmse_celsius: rmse(&predicted, &actual),
        quantized_rmse_celsius: Some(rmse(&quantized_predicted, &actual)),
        samples,
    })
}

fn export(
    config: &TrainConfig,
    model: &NeuralNetwork,
    quantized_bytes: &[u8],
    scaler: &MinMaxScaler,
    history: &MetricsTracker,
) -> Result<Vec<PathBuf>, TrainingError> {
    info!("💾 Salvando modelo");
    fs::create_dir_all(&config.output_dir)?;

    let checkpoint_path = config.output_path(CHECKPOINT_FILE);
    ModelCheckpoint::new(model, scaler, config.lookback, history).save(&checkpoint_path)?;
    let restored = ModelCheckpoint::load(&checkpoint_path)?.into_network()?;
    debug!("🔁 Checkpoint relido: {} parâmetros", restored.num_parameters());

    let quantized_path = config.output_path(QUANTIZED_FILE);
    save_quantized(&quantized_path, quantized_bytes)?;

    let header_path = config.output_path(HEADER_FILE);
    write_header(&header_path, HEADER_SYMBOL, quantized_bytes)?;
    let (header_bytes, header_len) = parse_header(&fs::read_to_string(&header_path)?)?;
    if header_len != quantized_bytes.len() || header_bytes != quantized_bytes {
        return Err(TrainingError::Serialization(format!(
            "{} does not match the quantized model ({} bytes, _len = {})",
            header_path.display(),
            header_bytes.len(),
            header_len
        )));
    }

    let mut files = vec![header_path, quantized_path, checkpoint_path];
    if let Some(history_csv) = &config.history_csv {
        history.save_to_csv(history_csv)?;
        files.push(PathBuf::from(history_csv));
    }
    Ok(files)
}
