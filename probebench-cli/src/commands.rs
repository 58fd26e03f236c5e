//! Subcommand handlers.

use crate::{Commands, SETUP_FAILURE};
use anyhow::Context;
use probebench_core::{ConfigSources, load_config};
use probebench_ml::data::cifar::PIXELS;
use probebench_ml::data::{Cifar100Provider, DatasetProvider};
use probebench_ml::error::MlError;
use probebench_ml::experiment::{ExperimentOrchestrator, RunFailure, Stage};
use probebench_ml::nn::{Mlp, Network};
use probebench_ml::training::reproducibility::{SeedManager, components};
use probebench_ml::training::{CheckpointGate, CheckpointStore, GateDecision};
use probebench_ml::BenchConfig;
use std::path::{Path, PathBuf};

/// Dataset and checkpoint locations.
#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct DataArgs {
    /// Directory containing the CIFAR-100 binary files (train.bin, test.bin)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Checkpoint path
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

impl DataArgs {
    fn apply(&self, mut sources: ConfigSources) -> ConfigSources {
        if let Some(dir) = &self.data_dir {
            sources = sources.set("dataset.data_dir", dir);
        }
        if let Some(path) = &self.checkpoint {
            sources = sources.set("checkpoint.path", path);
        }
        sources
    }
}

#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Cap on training samples for feature extraction; the test split gets a fifth
    #[arg(long, conflicts_with = "full")]
    subset_size: Option<usize>,

    /// Extract features for both splits in full
    #[arg(long)]
    full: bool,

    /// Write the JSON results report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, mut sources: ConfigSources) -> ConfigSources {
        sources = self.data.apply(sources);
        if let Some(n) = self.subset_size {
            sources = sources.set("evaluation.subset_size", n);
        }
        if let Some(path) = &self.report {
            sources = sources.set("evaluation.report_path", path);
        }
        sources
    }
}

pub(crate) fn handle(
    command: Option<Commands>,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<u8> {
    let base = ConfigSources::new().workspace(workspace);
    let base = match config_file {
        Some(file) => base.file(file),
        None => base,
    };

    match command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let mut config = load(args.apply(base), workspace)?;
            if args.full {
                config.evaluation.subset_size = None;
            }
            Ok(run(&config))
        }
        Commands::Train(args) => {
            let config = load(args.apply(base), workspace)?;
            Ok(train(&config))
        }
        Commands::Inspect { checkpoint } => {
            let config = load(base, workspace)?;
            let path = checkpoint.unwrap_or(config.checkpoint.path);
            inspect(&path)
        }
        Commands::Config => {
            let config = load(base, workspace)?;
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(0)
        }
    }
}

fn load(sources: ConfigSources, workspace: &Path) -> anyhow::Result<BenchConfig> {
    let mut config: BenchConfig =
        load_config(&sources).map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.resolve_paths(workspace);
    config.validate()?;
    Ok(config)
}

/// Reference network factory: same shape and init seed on every call.
fn mlp_factory(
    config: &BenchConfig,
    provider: &dyn DatasetProvider,
) -> impl Fn() -> Result<Box<dyn Network>, MlError> + use<> {
    let hidden = config.model.hidden_layers.clone();
    let classes = provider.num_classes();
    let seed = SeedManager::new(config.seed).get_seed(components::NETWORK_INIT);
    move || -> Result<Box<dyn Network>, MlError> {
        Ok(Box::new(Mlp::new(PIXELS, &hidden, classes, seed)?))
    }
}

fn run(config: &BenchConfig) -> u8 {
    let provider = Cifar100Provider::new(&config.dataset.data_dir);
    let factory = mlp_factory(config, &provider);
    let outcome = ExperimentOrchestrator::new(config, &provider, &factory).run();
    if !outcome.report.results.is_empty() || !outcome.report.results.failures().is_empty() {
        println!("{}", outcome.report.render_table());
    }
    outcome.exit_code()
}

fn train(config: &BenchConfig) -> u8 {
    let provider = Cifar100Provider::new(&config.dataset.data_dir);
    let factory = mlp_factory(config, &provider);
    match CheckpointGate::new(config).ensure_trained(&provider, &factory) {
        Ok(GateDecision::Trained {
            outcome,
            passed: false,
        }) => {
            let failure = RunFailure::TrainingQuality {
                best_accuracy: outcome.best_accuracy,
                floor: config.quality.training_floor,
            };
            tracing::error!("{failure}");
            failure.exit_code()
        }
        Ok(_) => 0,
        Err(e) => {
            let failure = RunFailure::at(Stage::Training, e);
            tracing::error!("{failure}");
            failure.exit_code()
        }
    }
}

fn inspect(path: &Path) -> anyhow::Result<u8> {
    match CheckpointStore::new(path).load()? {
        Some(record) => {
            let summary = record.summary(path);
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(0)
        }
        None => {
            eprintln!("No checkpoint at {}", path.display());
            Ok(SETUP_FAILURE)
        }
    }
}
