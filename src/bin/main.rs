//! emnist-svm Command Line Interface
//!
//! Download EMNIST, train and evaluate the digit / non-digit classifier,
//! and tune its hyperparameters.

use clap::{Args, Parser, Subcommand, ValueEnum};
use emnist_svm::config::{CvConfig, PipelineConfig};
use emnist_svm::core::{Result, SVMError};
use emnist_svm::data::{detection_class_name, DataSource, EmnistSplit, ImageDataset};
use emnist_svm::download::DatasetDownloader;
use emnist_svm::kernel::{Gamma, KernelChoice};
use emnist_svm::persistence::SerializableModel;
use emnist_svm::pipeline::{EvaluationReport, Pipeline};
use emnist_svm::utils::scaling::{ScalingMethod, ScalingParams};
use emnist_svm::utils::stats::sparse_vector_stats;
use emnist_svm::{ClassPrediction, Dataset, Sample, Svc};
use env_logger::Env;
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "emnist-svm")]
#[command(about = "Digit vs. non-digit detection on EMNIST with a support vector machine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the dataset files
    Download(DownloadArgs),
    /// Prepare the training split and train a model
    Train(TrainArgs),
    /// Evaluate a model on labeled data
    Evaluate(EvaluateArgs),
    /// Predict classes for every image in a file
    Predict(PredictArgs),
    /// Grid search over C and gamma
    Tune(TuneArgs),
    /// Run the whole experiment
    Run(RunArgs),
    /// Display model information
    Info(InfoArgs),
    /// Summarize a data file and draw some of its images
    Show(ShowArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Target directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// URL of the training file
    #[arg(long)]
    train_url: Option<String>,

    /// URL of the test file
    #[arg(long)]
    test_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "600")]
    timeout: u64,
}

/// Where the data lives and how it is prepared
#[derive(Args, Clone, Default)]
struct DataOpts {
    /// Training CSV file
    #[arg(long)]
    train: Option<PathBuf>,

    /// Test CSV file
    #[arg(long)]
    test: Option<PathBuf>,

    /// EMNIST split the files belong to
    #[arg(long)]
    split: Option<EmnistSplit>,

    /// Transpose images to the upright orientation
    #[arg(long)]
    fix_orientation: bool,

    /// Training samples per digit class
    #[arg(long)]
    per_digit: Option<usize>,

    /// Training samples for the whole non-digit class
    #[arg(long)]
    non_digit: Option<usize>,

    /// Seed for subsampling
    #[arg(long)]
    seed: Option<u64>,

    /// Pixel rescaling
    #[arg(long)]
    scaling: Option<CliScalingMethod>,
}

/// Classifier hyperparameters
#[derive(Args, Clone, Default)]
struct SvmOpts {
    /// Regularization parameter C
    #[arg(short = 'C', long)]
    c: Option<f64>,

    /// Kernel coefficient: scale, auto or a number
    #[arg(long)]
    gamma: Option<Gamma>,

    /// Kernel family
    #[arg(long)]
    kernel: Option<CliKernel>,

    /// Polynomial degree
    #[arg(long, default_value = "3")]
    degree: u32,

    /// Polynomial coef0
    #[arg(long, default_value = "0.0")]
    coef0: f64,

    /// Convergence tolerance
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Maximum passes per pairwise solve
    #[arg(short, long)]
    max_iterations: Option<usize>,

    /// Kernel cache size in MB
    #[arg(long)]
    cache_size: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliKernel {
    Linear,
    Rbf,
    #[value(name = "poly")]
    Polynomial,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliScalingMethod {
    /// Divide by 255
    #[value(name = "divide")]
    Divide,
    /// Min-Max scaling to [0, 1] range
    #[value(name = "minmax")]
    MinMax,
    /// Divide by the per-pixel standard deviation
    #[value(name = "standard")]
    StandardScore,
}

impl From<CliScalingMethod> for ScalingMethod {
    fn from(cli_method: CliScalingMethod) -> Self {
        match cli_method {
            CliScalingMethod::Divide => ScalingMethod::Divide { divisor: 255.0 },
            CliScalingMethod::MinMax => ScalingMethod::MinMax {
                min_val: 0.0,
                max_val: 1.0,
            },
            CliScalingMethod::StandardScore => ScalingMethod::StandardScore,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliCv {
    /// Validate on the test rows
    Predefined,
    /// Stratified k-fold on the training rows
    Kfold,
}

#[derive(Args)]
struct TrainArgs {
    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    data: DataOpts,

    #[command(flatten)]
    svm: SvmOpts,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Labeled data; the configured test file when omitted
    #[arg(long)]
    data: Option<PathBuf>,

    /// Evaluate every row instead of the configured test subsample
    #[arg(long)]
    all: bool,

    /// Show per-class metrics
    #[arg(long)]
    detailed: bool,

    /// Write the evaluation as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    opts: DataOpts,
}

#[derive(Args)]
struct PredictArgs {
    /// Trained model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input CSV file
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show the number of pairwise votes won
    #[arg(long)]
    votes: bool,
}

#[derive(Args)]
struct TuneArgs {
    /// C values to try
    #[arg(long = "c-values", value_delimiter = ',')]
    c_values: Vec<f64>,

    /// Gamma values to try
    #[arg(long = "gamma-values", value_delimiter = ',')]
    gamma_values: Vec<Gamma>,

    /// Validation scheme
    #[arg(long)]
    cv: Option<CliCv>,

    /// Folds for k-fold validation
    #[arg(long, default_value = "3")]
    folds: usize,

    /// Save the best candidate, refitted on the training rows
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the search results as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    data: DataOpts,

    #[command(flatten)]
    svm: SvmOpts,
}

#[derive(Args)]
struct RunArgs {
    /// Also run the grid search
    #[arg(long)]
    tune: bool,

    /// Save the final model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    data: DataOpts,

    #[command(flatten)]
    svm: SvmOpts,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

#[derive(Args)]
struct ShowArgs {
    /// CSV data file
    data: PathBuf,

    /// EMNIST split the file belongs to
    #[arg(long, default_value = "balanced")]
    split: EmnistSplit,

    /// Number of images to draw
    #[arg(long, default_value = "0")]
    images: usize,

    /// Transpose images before drawing
    #[arg(long)]
    fix_orientation: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = PipelineConfig::load(cli.config.as_deref()).and_then(|config| match cli.command
    {
        Commands::Download(args) => download_command(config, args),
        Commands::Train(args) => train_command(config, args),
        Commands::Evaluate(args) => evaluate_command(config, args),
        Commands::Predict(args) => predict_command(args),
        Commands::Tune(args) => tune_command(config, args),
        Commands::Run(args) => run_command(config, args),
        Commands::Info(args) => info_command(args),
        Commands::Show(args) => show_command(args),
    });

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

impl DataOpts {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.train {
            config.train = DataSource::csv(path);
        }
        if let Some(path) = &self.test {
            config.test = DataSource::csv(path);
        }
        if let Some(split) = self.split {
            config.split = split;
        }
        if self.fix_orientation {
            config.fix_orientation = true;
        }
        if let Some(n) = self.per_digit {
            config.train_quota.per_digit = n;
        }
        if let Some(n) = self.non_digit {
            config.train_quota.non_digit_total = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(scaling) = self.scaling {
            config.scaling = scaling.into();
        }
    }
}

impl SvmOpts {
    fn apply(&self, config: &mut PipelineConfig) {
        let params = &mut config.svm;
        if let Some(c) = self.c {
            params.optimizer.c = c;
        }
        if let Some(gamma) = self.gamma {
            params.gamma = gamma;
        }
        if let Some(kernel) = self.kernel {
            params.kernel = match kernel {
                CliKernel::Linear => KernelChoice::Linear,
                CliKernel::Rbf => KernelChoice::Rbf,
                CliKernel::Polynomial => KernelChoice::Polynomial {
                    degree: self.degree,
                    coef0: self.coef0,
                },
            };
        }
        if let Some(epsilon) = self.epsilon {
            params.optimizer.epsilon = epsilon;
        }
        if let Some(max_iterations) = self.max_iterations {
            params.optimizer.max_iterations = max_iterations;
        }
        if let Some(mb) = self.cache_size {
            params.optimizer.cache_size = mb * 1024 * 1024; // Convert MB to bytes
        }
    }
}

fn download_command(mut config: PipelineConfig, args: DownloadArgs) -> Result<()> {
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if args.train_url.is_some() {
        config.train_url = args.train_url;
    }
    if args.test_url.is_some() {
        config.test_url = args.test_url;
    }

    let urls = config.download_urls();
    if urls.is_empty() {
        return Err(SVMError::InvalidParameter(
            "no download URL given; pass --train-url/--test-url or set them in the config"
                .to_string(),
        ));
    }

    let downloader = DatasetDownloader::new(&config.data_dir, Duration::from_secs(args.timeout))?;
    for outcome in downloader.fetch_all(&urls)? {
        let status = if outcome.skipped { "present" } else { "downloaded" };
        println!("{} {} ({} bytes)", status, outcome.path.display(), outcome.bytes);
    }
    Ok(())
}

/// Load, prepare and rescale the training split
fn prepared_training_set(pipeline: &Pipeline) -> Result<(ImageDataset, ScalingParams)> {
    let config = pipeline.config();
    info!("Loading training data: {}", config.train.describe());
    let raw = config.train.load(Some(config.n_features))?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let train = pipeline.prepare_split(raw, Some(config.train_quota), &mut rng)?;

    let scaling = ScalingParams::fit(train.samples(), config.scaling);
    let scaled = train.with_samples(scaling.transform_samples(train.samples()));
    Ok((scaled, scaling))
}

fn train_command(mut config: PipelineConfig, args: TrainArgs) -> Result<()> {
    args.data.apply(&mut config);
    args.svm.apply(&mut config);
    let pipeline = Pipeline::new(config)?;

    let (train, scaling) = prepared_training_set(&pipeline)?;
    info!(
        "Training on {} samples, class counts {:?}",
        train.len(),
        train.class_counts()
    );

    let model = pipeline.train(&train)?;
    let info = model.info();
    info!("Training completed successfully");
    info!("Kernel: {}", info.kernel);
    info!("Support vectors: {}", info.n_support_vectors);

    SerializableModel::from_trained_model(&model, Some(&scaling)).save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);

    let accuracy = model.score(&train)?;
    println!("Training accuracy: {:.2}%", accuracy * 100.0);
    Ok(())
}

/// Apply the model's stored scaling
fn rescale(dataset: &ImageDataset, scaling: Option<&ScalingParams>) -> ImageDataset {
    match scaling {
        Some(params) => dataset.with_samples(params.transform_samples(dataset.samples())),
        None => dataset.clone(),
    }
}

fn print_evaluation(report: &EvaluationReport, detailed: bool) {
    println!("\nTest Results:");
    println!("  Accuracy: {:.2}%", report.accuracy * 100.0);
    println!("\nConfusion Matrix:\n{}", report.table());

    let metrics = &report.detection;
    println!("Digit Detection (digits positive):");
    println!("  True Positives:  {}", metrics.true_positives);
    println!("  True Negatives:  {}", metrics.true_negatives);
    println!("  False Positives: {}", metrics.false_positives);
    println!("  False Negatives: {}", metrics.false_negatives);
    println!("  Precision:       {:.4}", metrics.precision());
    println!("  Recall:          {:.4}", metrics.recall());
    println!("  F1 Score:        {:.4}", metrics.f1_score());
    println!("  Specificity:     {:.4}", metrics.specificity());

    if detailed {
        println!("\nPer-class Metrics:");
        println!("  {:>9} {:>9} {:>9} {:>9} {:>8}", "class", "precision", "recall", "f1", "support");
        for m in &report.per_class {
            println!(
                "  {:>9} {:>9.4} {:>9.4} {:>9.4} {:>8}",
                detection_class_name(m.class),
                m.precision,
                m.recall,
                m.f1_score,
                m.support
            );
        }
        println!(
            "  {:>9} {:>9.4} {:>9.4} {:>9.4}",
            "macro", report.macro_precision, report.macro_recall, report.macro_f1
        );
    }
}

fn evaluate_command(mut config: PipelineConfig, args: EvaluateArgs) -> Result<()> {
    args.opts.apply(&mut config);
    if let Some(path) = &args.data {
        config.test = DataSource::csv(path);
    }
    let pipeline = Pipeline::new(config)?;
    let config = pipeline.config();

    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;
    let model = serializable_model.to_trained_model()?;

    info!("Loading test data: {}", config.test.describe());
    let raw = config.test.load(Some(model.n_features()))?;
    let quota = if args.all {
        None
    } else {
        Some(config.test_quota)
    };
    let mut rng = StdRng::seed_from_u64(config.seed);
    let test = pipeline.prepare_split(raw, quota, &mut rng)?;
    let test = rescale(&test, serializable_model.scaling.as_ref());

    info!(
        "Evaluating model with {} support vectors on {} samples",
        serializable_model.metadata.n_support_vectors,
        test.len()
    );
    let report = pipeline.evaluate(&model, &test)?;

    println!("=== Model Evaluation ===");
    serializable_model.print_summary();
    print_evaluation(&report, args.detailed);

    if let Some(path) = args.report {
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &report)?;
        info!("Evaluation written to: {path:?}");
    }
    Ok(())
}

fn write_predictions<W: Write>(
    writer: &mut W,
    predictions: &[ClassPrediction],
    votes: bool,
) -> std::io::Result<()> {
    writeln!(writer, "# Predictions for {} samples", predictions.len())?;
    writeln!(
        writer,
        "# Format: sample_index predicted_class name{}",
        if votes { " votes" } else { "" }
    )?;
    for (i, pred) in predictions.iter().enumerate() {
        if votes {
            writeln!(
                writer,
                "{} {} {} {}",
                i,
                pred.class,
                detection_class_name(pred.class),
                pred.votes
            )?;
        } else {
            writeln!(writer, "{} {} {}", i, pred.class, detection_class_name(pred.class))?;
        }
    }
    Ok(())
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;
    let model = serializable_model.to_trained_model()?;

    info!("Loading prediction data from: {:?}", args.data);
    let dataset = DataSource::csv(&args.data).load(Some(model.n_features()))?;
    let dataset = rescale(&dataset, serializable_model.scaling.as_ref());

    let predictions = model.inner().predict_batch(dataset.samples());

    match args.output {
        Some(output_path) => {
            let mut writer = BufWriter::new(File::create(&output_path)?);
            write_predictions(&mut writer, &predictions, args.votes)?;
            writer.flush()?;
            info!("Predictions saved to: {output_path:?}");
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_predictions(&mut lock, &predictions, args.votes)?;
        }
    }
    Ok(())
}

fn tune_command(mut config: PipelineConfig, args: TuneArgs) -> Result<()> {
    args.data.apply(&mut config);
    args.svm.apply(&mut config);
    if !args.c_values.is_empty() {
        config.grid.c = args.c_values.clone();
    }
    if !args.gamma_values.is_empty() {
        config.grid.gamma = args.gamma_values.clone();
    }
    match args.cv {
        Some(CliCv::Predefined) => config.cv = CvConfig::Predefined,
        Some(CliCv::Kfold) => {
            config.cv = CvConfig::StratifiedKFold {
                k: args.folds,
                seed: config.seed,
            }
        }
        None => {}
    }

    let pipeline = Pipeline::new(config)?;
    let prepared = pipeline.prepare()?;
    let report = pipeline.tune(&prepared)?.report;

    println!("=== Grid Search Results ===");
    println!("Folds: {}", report.n_splits);
    println!("  {:>4} {:>10} {:>10} {:>10} {:>10}", "rank", "C", "gamma", "mean", "std");
    for r in &report.results {
        println!(
            "  {:>4} {:>10} {:>10} {:>10.4} {:>10.4}",
            r.rank,
            r.c,
            r.gamma.to_string(),
            r.mean_score,
            r.std_score
        );
    }
    println!(
        "Best: C={} gamma={} (accuracy {:.2}%)",
        report.best_c,
        report.best_gamma,
        report.best_score * 100.0
    );

    if let Some(path) = &args.output {
        let model = Svc::from_params(pipeline.config().svm.clone())
            .with_c(report.best_c)
            .with_gamma(report.best_gamma)
            .fit(&prepared.train)?;
        SerializableModel::from_trained_model(&model, Some(&prepared.scaling))
            .save_to_file(path)?;
        info!("Best model saved to: {path:?}");
    }

    if let Some(path) = &args.report {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &report)?;
        info!("Search results written to: {path:?}");
    }
    Ok(())
}

fn run_command(mut config: PipelineConfig, args: RunArgs) -> Result<()> {
    args.data.apply(&mut config);
    args.svm.apply(&mut config);
    if args.tune {
        config.tune = true;
    }
    if args.model.is_some() {
        config.model_path = args.model;
    }
    if args.report.is_some() {
        config.report_path = args.report;
    }

    let report = Pipeline::new(config)?.run()?;

    println!("=== Pipeline Summary ===");
    println!(
        "Loaded: {} training, {} test images",
        report.preparation.loaded_train, report.preparation.loaded_test
    );
    println!("Excluded letters: {:?}", report.preparation.excluded_letters);
    println!("Kernel: {}", report.model.kernel);
    println!("Support vectors: {}", report.model.n_support_vectors);
    print_evaluation(&report.baseline, false);

    if let Some(search) = &report.search {
        println!(
            "\nBest grid candidate: C={} gamma={} (validation accuracy {:.2}%)",
            search.best_c,
            search.best_gamma,
            search.best_score * 100.0
        );
    }
    if let Some(tuned) = &report.tuned {
        println!("Tuned test accuracy: {:.2}%", tuned.accuracy * 100.0);
    }
    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;

    serializable_model.print_summary();

    println!("\nPairwise Models:");
    for pair in &serializable_model.pairs {
        println!(
            "  {:>9} vs {:<9} support vectors: {:>5}  bias: {:.6}",
            detection_class_name(pair.positive),
            detection_class_name(pair.negative),
            pair.support_vectors.len(),
            pair.bias
        );
    }

    Ok(())
}

/// Draw an image with one character per pixel
fn render_image(sample: &Sample, side: usize) -> String {
    const SHADES: [char; 5] = [' ', '.', ':', '*', '#'];
    let max = sample.features.values.iter().copied().fold(0.0, f64::max);
    let mut out = String::with_capacity(side * (side + 1));
    for row in 0..side {
        for col in 0..side {
            let v = sample.features.get(row * side + col);
            let level = if max > 0.0 {
                ((v / max) * (SHADES.len() - 1) as f64).round() as usize
            } else {
                0
            };
            out.push(SHADES[level.min(SHADES.len() - 1)]);
        }
        out.push('\n');
    }
    out
}

fn show_command(args: ShowArgs) -> Result<()> {
    let dataset = DataSource::csv(&args.data).load(None)?;
    let dataset = if args.fix_orientation {
        emnist_svm::data::fix_orientation(&dataset)?
    } else {
        dataset
    };

    let stats = sparse_vector_stats(dataset.samples());
    println!("=== Dataset Summary ===");
    println!("File: {:?}", args.data);
    println!("Samples: {}", dataset.len());
    println!("Pixels per image: {}", dataset.dim());
    println!(
        "Inked pixels per image: mean {:.1}, min {}, max {}",
        stats.mean_nnz, stats.min_nnz, stats.max_nnz
    );
    println!("Largest pixel value: {}", stats.max_value);

    println!("\nClass Counts ({} split):", args.split);
    for (class, count) in dataset.class_counts() {
        let ch = args
            .split
            .char_for(class)
            .map_or_else(|| "?".to_string(), |c| c.to_string());
        let kind = if args.split.is_digit(class) { "digit" } else { "letter" };
        println!("  {class:>3} '{ch}' {kind:<6} {count}");
    }

    let side = (dataset.dim() as f64).sqrt().round() as usize;
    if args.images > 0 && side * side != dataset.dim() {
        return Err(SVMError::InvalidDataset(format!(
            "cannot draw images of {} pixels",
            dataset.dim()
        )));
    }
    for sample in dataset.samples().iter().take(args.images) {
        let ch = args.split.char_for(sample.class_index()).unwrap_or('?');
        println!("\nclass {} '{}':", sample.class_index(), ch);
        print!("{}", render_image(sample, side));
    }

    Ok(())
}
