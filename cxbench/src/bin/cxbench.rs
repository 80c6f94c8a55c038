use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use cxbench::benchmark::{Benchmark, ResultsTable};
use cxbench::config::{Architecture, BenchmarkConfig, Pretrain, RunIdentity, TrainMode};
use cxbench::serde_utils::JSONReadWrite;
use cxbench::{Error, Result};
use log::{error, info};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
struct Args {
    /// Encoder architecture
    #[arg(long, value_enum, default_value_t = Architecture::Resnet18)]
    arch: Architecture,
    /// Pretraining source of the encoder
    #[arg(long, value_enum, default_value_t = Pretrain::Chestxray)]
    pretrain: Pretrain,
    /// Train cohorts of the checkpoint
    #[arg(long, value_enum, default_value_t = TrainMode::Corda)]
    train: TrainMode,
    /// Config file path
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
    /// Directory with the source manifests
    #[arg(short = 'd', long)]
    data_dir: Option<PathBuf>,
    /// Directory with the model checkpoints
    #[arg(short = 'm', long)]
    models_dir: Option<PathBuf>,
    /// Run output directory. Defaults to <logs_dir>/<version>/<arch>/<pretrain>/<train>
    #[arg(short = 'r', long)]
    out_dir: Option<PathBuf>,
    /// Seed for cohort subsampling
    #[arg(short = 's', long)]
    seed: Option<u64>,
    #[arg(short = 'b', long)]
    batch_size: Option<usize>,
    /// Skip confusion-matrix and ROC plots
    #[arg(long)]
    no_plots: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BenchmarkConfig> {
    let Some(path) = path else {
        return Ok(BenchmarkConfig::default());
    };
    if !path.is_file() {
        return Err(Error::MissingFile {
            kind: "config",
            path: path.to_path_buf(),
        });
    }
    BenchmarkConfig::read_json(path)
}

fn run(args: Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(models_dir) = args.models_dir {
        config.models_dir = models_dir;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.no_plots {
        config.plots = false;
    }

    let identity = RunIdentity {
        arch: args.arch,
        pretrain: args.pretrain,
        train: args.train,
    };

    let benchmark = Benchmark::prepare(identity, config)?;
    info!(
        "Benchmarking model {}: cohorts={}",
        identity.name(),
        benchmark.cohorts.len()
    );

    let out_dir = args.out_dir.unwrap_or_else(|| benchmark.config.run_dir(&identity));
    fs::create_dir_all(&out_dir)?;

    let mut table = ResultsTable::new();
    let summary = benchmark.run(&out_dir, &mut table)?;

    let csv_path = out_dir.join("benchmark.csv");
    table.write_csv(&csv_path)?;
    benchmark.config.write_json(out_dir.join("config.json"))?;
    summary.write_json(out_dir.join("summary.json"))?;

    info!("==== Benchmark Summary ====");
    for row in table.rows() {
        info!(
            "{:<20} acc={:.3} auc={:.3} sens={:.3} spec={:.3} f1={:.3} ba={:.3} dor={:.3}",
            row.test_cohort,
            row.accuracy,
            row.auc,
            row.sensitivity,
            row.specificity,
            row.fscore,
            row.balanced_accuracy,
            row.diagnostic_odds_ratio
        );
    }
    info!("elapsed_ms={}", summary.elapsed_ms);
    info!("Results -> {}", csv_path.display());

    Ok(())
}
