use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use core_types::{Creative, EarlySignalSample, ProductCategory, TrainingCorpus};
use prediction_service::PredictionService;
use serde::Serialize;
use signal_scorer::TriageItem;

mod config_loader;
mod corpus_io;

#[derive(Parser, Debug)]
#[command(
    name = "creative-signals",
    about = "Early-signal scoring and attribute priors for ad creatives",
    version
)]
struct Cli {
    /// Engine config (TOML). Defaults to configs/engine.toml.
    #[arg(long, global = true, env = config_loader::CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one creative from its early-signal sample.
    Analyze(AnalyzeArgs),
    /// Train a Markov model from a JSONL corpus and print its report.
    Train(TrainArgs),
    /// Blend the early signal with the Markov prior.
    Predict(PredictArgs),
    /// Score a batch and split it into winners, potential and losers.
    Triage(TriageArgs),
    /// Train on a corpus and list untested combinations of proven attributes.
    Gaps(GapsArgs),
    /// Place an observed CVR against the category benchmark.
    Benchmark(BenchmarkArgs),
}

#[derive(Args, Debug, Clone)]
struct AnalyzeArgs {
    #[arg(long)]
    sample: PathBuf,
    #[arg(long)]
    creative: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct TrainArgs {
    #[arg(long)]
    corpus: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct PredictArgs {
    #[arg(long)]
    creative: PathBuf,
    #[arg(long)]
    sample: Option<PathBuf>,
    #[arg(long)]
    corpus: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct TriageArgs {
    #[arg(long)]
    batch: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct GapsArgs {
    #[arg(long)]
    corpus: PathBuf,
    #[arg(long)]
    category: Option<ProductCategory>,
}

#[derive(Args, Debug, Clone)]
struct BenchmarkArgs {
    #[arg(long)]
    category: ProductCategory,
    #[arg(long)]
    cvr: f64,
    #[arg(long)]
    ctr: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    let _guard = observability::init_tracing("creative-signals", level);

    let cfg_path = config_loader::engine_config_path(cli.config.as_deref());
    let cfg = config_loader::load_engine_config(&cfg_path).await?;
    let service = PredictionService::new(cfg).context("build prediction service")?;

    match cli.command {
        Commands::Analyze(args) => {
            let sample = corpus_io::read_json::<EarlySignalSample>(&args.sample).await?;
            let creative = corpus_io::read_json::<Creative>(&args.creative).await?;
            let classification = service
                .analyze_early_signals(&sample, &creative)
                .context("analyze early signals")?;
            print_json(&classification)
        }
        Commands::Train(args) => {
            let corpus = corpus_io::read_corpus(&args.corpus).await?;
            let report = service
                .train_markov_chain(&corpus)
                .context("train markov chain")?;
            print_json(&report)
        }
        Commands::Predict(args) => {
            if let Some(path) = args.corpus.as_deref() {
                train_from(&service, path).await?;
            }
            let creative = corpus_io::read_json::<Creative>(&args.creative).await?;
            let sample = match args.sample.as_deref() {
                Some(path) => Some(corpus_io::read_json::<EarlySignalSample>(path).await?),
                None => None,
            };
            let prediction = service
                .predict(sample.as_ref(), &creative)
                .context("blend prediction")?;
            print_json(&prediction)
        }
        Commands::Triage(args) => {
            let items = corpus_io::read_jsonl::<TriageItem>(&args.batch).await?;
            let report = service.triage(&items).context("triage batch")?;
            print_json(&report)
        }
        Commands::Gaps(args) => {
            let corpus = train_from(&service, &args.corpus).await?;
            let gaps = service
                .find_untested_gaps(&corpus, args.category)
                .context("find untested gaps")?;
            print_json(&gaps)
        }
        Commands::Benchmark(args) => {
            let comparison = service
                .compare_to_benchmark(args.category, args.cvr, args.ctr)
                .context("compare to benchmark")?;
            print_json(&comparison)
        }
    }
}

async fn train_from(service: &PredictionService, path: &Path) -> Result<TrainingCorpus> {
    let corpus = corpus_io::read_corpus(path).await?;
    let report = service
        .retrain(&corpus)
        .with_context(|| format!("train from {}", path.display()))?;
    tracing::info!(
        model_version = %report.model_version,
        trained_states = report.trained_state_count,
        "model ready for prediction"
    );
    Ok(corpus)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
