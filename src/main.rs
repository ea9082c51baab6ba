use anyhow::Result;
use clap::Parser;
use onnx_classifier::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onnx-classifier")]
#[command(about = "ONNX-powered image classification service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory holding <model_id>.onnx files
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Directory of images offered for classification
    #[arg(long, default_value = "images")]
    images_dir: String,

    /// Label catalog (JSON list or one label per line); defaults to <images-dir>/imagenet_labels.json
    #[arg(long)]
    labels: Option<String>,

    /// Comma-separated list of allowed model identifiers
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,

    /// Load every configured model at startup
    #[arg(long)]
    preload: bool,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting ONNX classification service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);
    tracing::info!("Images directory: {}", args.images_dir);

    let config = Config::new(
        args.bind,
        args.models_dir,
        args.images_dir,
        args.labels,
        args.models,
        args.workers,
        args.preload,
        args.dev,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
