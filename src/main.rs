use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use card_porter::app::import_use_case::ImportCardUseCase;
use card_porter::app::ports::{CardOutputPort, OcrPort};
use card_porter::config::PorterConfig;
use card_porter::infra::json_writer::JsonCardWriter;
use card_porter::infra::openai_ocr::OpenAiOcr;
use card_porter::infra::sidecar_ocr::SidecarOcr;
use card_porter::logging;
use card_porter::metrics::ImportMetrics;
use card_porter::pipeline::batch::{collect_images, limit_images};
use card_porter::pipeline::ingestion::duplicate_index::DuplicateIndex;
use card_porter::pipeline::processing::quality_gate::schema::validate_record;
use card_porter::pipeline::{BatchOptions, BatchRunner};

#[derive(Parser)]
#[command(name = "card_porter")]
#[command(about = "Turn Riftbound card images into structured JSON records")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OcrBackend {
    /// Vision model over the chat-completions API
    Openai,
    /// Transcriptions stored next to each image as JSON
    Sidecar,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, normalize and write one record per card image
    Import {
        /// An image file or a directory of images
        input: PathBuf,
        /// Directory where records are written
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Vision model to use
        #[arg(long)]
        model: Option<String>,
        /// Sampling temperature (default 0 for determinism)
        #[arg(long)]
        temperature: Option<f32>,
        /// Nucleus sampling parameter
        #[arg(long)]
        top_p: Option<f32>,
        /// Sampling seed, when the model supports one
        #[arg(long)]
        seed: Option<i64>,
        /// Process cards without writing records
        #[arg(long)]
        dry_run: bool,
        /// Print each record to stdout
        #[arg(long)]
        print: bool,
        /// Show raw, normalized and final stages for the first N cards
        #[arg(long)]
        debug_samples: Option<usize>,
        /// Concurrent card workers
        #[arg(long)]
        workers: Option<usize>,
        /// Import at most N images, taken in sorted order
        #[arg(long)]
        limit: Option<usize>,
        /// Where card transcriptions come from
        #[arg(long, value_enum, default_value_t = OcrBackend::Openai)]
        ocr: OcrBackend,
        /// Duplicate index file, loaded before and saved after the run
        #[arg(long)]
        index: Option<PathBuf>,
        /// Configuration file (defaults to porter.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check written records against the card schema
    Validate {
        /// Directory of records
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    ImportMetrics::register_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            input,
            out_dir,
            model,
            temperature,
            top_p,
            seed,
            dry_run,
            print,
            debug_samples,
            workers,
            limit,
            ocr,
            index,
            config,
        } => {
            let mut config = PorterConfig::load(config.as_deref())?;
            // CLI flags win over the file
            if let Some(model) = model {
                config.ocr.model = model;
            }
            if let Some(temperature) = temperature {
                config.ocr.temperature = temperature;
            }
            if top_p.is_some() {
                config.ocr.top_p = top_p;
            }
            if seed.is_some() {
                config.ocr.seed = seed;
            }
            if let Some(out_dir) = out_dir {
                config.pipeline.out_dir = out_dir;
            }
            if let Some(workers) = workers {
                config.pipeline.workers = workers.max(1);
            }
            if let Some(samples) = debug_samples {
                config.pipeline.debug_samples = samples;
            }
            if index.is_some() {
                config.pipeline.index_path = index;
            }

            run_import(&input, config, ocr, dry_run, print, limit).await?;
        }
        Commands::Validate { dir } => {
            run_validate(&dir)?;
        }
    }

    Ok(())
}

async fn run_import(
    input: &Path,
    config: PorterConfig,
    backend: OcrBackend,
    dry_run: bool,
    print: bool,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let images = limit_images(collect_images(input)?, limit);
    println!("🔄 Importing {} card image(s) from {}", images.len(), input.display());

    let ocr: Arc<dyn OcrPort> = match backend {
        OcrBackend::Openai => {
            info!("Using model {}", config.ocr.model);
            Arc::new(OpenAiOcr::from_env(config.ocr.clone())?)
        }
        OcrBackend::Sidecar => Arc::new(SidecarOcr::new()),
    };
    let output: Arc<dyn CardOutputPort> = Arc::new(JsonCardWriter::new(&config.pipeline.out_dir)?);
    if dry_run {
        println!("   Dry run: records are printed, not written");
    }

    let index = match &config.pipeline.index_path {
        Some(path) => DuplicateIndex::load(path)
            .with_context(|| format!("Failed to load duplicate index {}", path.display()))?,
        None => DuplicateIndex::new(),
    };

    let runner = BatchRunner::new(
        ImportCardUseCase::new(ocr, output, dry_run),
        index,
        BatchOptions {
            workers: config.pipeline.workers,
            debug_samples: config.pipeline.debug_samples,
            print_json: print,
            index_path: config.pipeline.index_path.clone(),
        },
    );

    let summary = runner.run_until_interrupted(images).await?;
    summary.print();
    if summary.failed > 0 {
        warn!("{} card(s) failed", summary.failed);
    }
    Ok(())
}

fn run_validate(dir: &Path) -> anyhow::Result<()> {
    let mut records: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    records.sort();

    println!("🔍 Validating {} record(s) in {}", records.len(), dir.display());
    let mut invalid = 0;
    for path in &records {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let problems = validate_record(&text);
        if problems.is_empty() {
            continue;
        }
        invalid += 1;
        error!("{} is invalid", path.display());
        println!("❌ {}", path.display());
        for problem in problems {
            println!("   - {}", problem);
        }
    }

    println!("\n📊 Valid: {}, invalid: {}", records.len() - invalid, invalid);
    if invalid > 0 {
        bail!("{} invalid record(s)", invalid);
    }
    Ok(())
}
