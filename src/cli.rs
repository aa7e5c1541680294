//! `occlusion-lens` command line: classify photos and explain a label with an
//! occlusion heatmap.

use crate::commands;
use crate::error::AppError;
use crate::models::app_config::AppConfig;
use crate::services::classifier::model_manager::{ModelManager, ModelType};
use crate::services::classifier::Classifier;
use crate::services::session::PhotoSession;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "occlusion-lens")]
#[command(author, version)]
#[command(about = "Classify a photo on-device and show which regions drove the result")]
#[command(long_about = "Classify a photo with an ONNX image classifier, then sweep an occluding
block over it to find the regions that matter most for a chosen label.

EXAMPLES:
  # Classify one photo (or every image in a folder)
  occlusion-lens --model-dir ./models classify photo.jpg

  # Heatmap for the top label, written next to the photo
  occlusion-lens --model-dir ./models analyze photo.jpg

  # Heatmaps for specific labels into ./out
  occlusion-lens --model-dir ./models analyze photo.jpg --label bowl --label soylent --out ./out")]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Directory holding the ONNX model and its id2label config
    #[arg(long, value_name = "DIR")]
    model_dir: PathBuf,

    /// Model: mobilenet, base, large
    #[arg(long, default_value = "mobilenet", value_name = "MODEL")]
    model_type: String,

    /// Run inference on the CPU only
    #[arg(long)]
    cpu: bool,

    /// JSON config overriding sweep geometry, colours and brands
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a photo, or every image in a folder
    Classify {
        path: PathBuf,

        /// Number of predictions to print per image
        #[arg(long, default_value = "5", value_name = "N")]
        top_k: usize,
    },
    /// Compute occlusion heatmaps for labels of a photo
    Analyze {
        photo: PathBuf,

        /// Label to explain; defaults to the top prediction. Repeatable.
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,

        /// Where to write the PNGs; defaults to the photo's folder
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct AnalyzeOutput {
    label: String,
    found: bool,
    cached: bool,
    heatmap: Option<PathBuf>,
    outline: Option<PathBuf>,
    original_confidence: Option<f32>,
    failed_cells: Option<usize>,
}

pub fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Warn,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    // RUST_LOG, when set, overrides the flag-derived level
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError {
            message: format!("Failed to start async runtime: {}", e),
        })?;

    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> Result<(), AppError> {
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    let model_type: ModelType = cli.model_type.parse()?;

    let model_manager = ModelManager::new(cli.model_dir.clone());
    commands::classifier::load_model(&model_manager, Some(model_type), Some(!cli.cpu)).await?;
    let classifier: Arc<dyn Classifier> = Arc::new(model_manager);

    match cli.command {
        Commands::Classify { path, top_k } => {
            if path.is_dir() {
                let results = commands::heatmap::classify_folder(
                    classifier,
                    &path,
                    top_k,
                    config.sweep.input_size,
                    config.brands.clone(),
                )
                .await?;
                print_json(&results)
            } else {
                let session = PhotoSession::new(classifier, config)?;
                let result = commands::heatmap::classify_photo(&session, &path, Some(top_k)).await?;
                print_json(&result)
            }
        }
        Commands::Analyze { photo, labels, out } => {
            let session = PhotoSession::new(classifier, config)?;
            let result = commands::heatmap::classify_photo(&session, &photo, None).await?;

            let labels = if labels.is_empty() {
                result.predictions.first().map(|p| vec![p.class_name.clone()]).unwrap_or_default()
            } else {
                labels
            };
            let out_dir = out.unwrap_or_else(|| photo.parent().map(Path::to_path_buf).unwrap_or_default());

            let mut outputs = Vec::with_capacity(labels.len());
            for label in labels {
                outputs.push(analyze_one(&session, &label, &out_dir).await?);
            }
            print_json(&outputs)
        }
    }
}

async fn analyze_one(session: &PhotoSession, label: &str, out_dir: &Path) -> Result<AnalyzeOutput, AppError> {
    let Some(analysis) = session.analyze(label).await? else {
        log::warn!("No heatmap for '{}': label not among the photo's classifications", label);
        return Ok(AnalyzeOutput {
            label: label.to_string(),
            found: false,
            cached: false,
            heatmap: None,
            outline: None,
            original_confidence: None,
            failed_cells: None,
        });
    };

    let (heatmap, outline) = commands::heatmap::save_heatmap(&analysis.images, label, out_dir)?;
    log::info!("Wrote {} and {}", heatmap.display(), outline.display());

    Ok(AnalyzeOutput {
        label: analysis.label,
        found: true,
        cached: analysis.cached,
        heatmap: Some(heatmap),
        outline: Some(outline),
        original_confidence: Some(analysis.images.original_confidence),
        failed_cells: Some(analysis.images.report.failed),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
