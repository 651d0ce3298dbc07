//! `hs-search <run.json>`: tune a logistic regression on a CSV table and
//! print the search result as JSON. The run file may also be given through
//! `HS_RUN_CONFIG`. Logs go to stderr, filtered by `RUST_LOG`.

use anyhow::{Context, Result};
use hs_data::{encode_categorical_columns, ConfigObject, Table};
use hs_eval::{Dataset, FoldStrategy, LogisticParams, LogisticRegression, Strategy, Tuner};
use hs_optimizer::{ObjectiveDirection, SearchSpace};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Either a fold count or a full strategy object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Folds {
    Count(usize),
    Strategy(FoldStrategy),
}

impl From<Folds> for FoldStrategy {
    fn from(folds: Folds) -> Self {
        match folds {
            Folds::Count(n) => FoldStrategy::from(n),
            Folds::Strategy(strategy) => strategy,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunFile {
    /// CSV with a header row; relative paths start at the run file.
    data: PathBuf,
    target: String,
    #[serde(default)]
    features: Option<Vec<String>>,
    #[serde(default)]
    categorical: Vec<String>,
    #[serde(default)]
    mapping_file: Option<PathBuf>,
    space: Value,
    metric: String,
    #[serde(default = "default_folds")]
    folds: Folds,
    n_trials: usize,
    direction: ObjectiveDirection,
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
    #[serde(default)]
    keep_history: bool,
    /// Fixed model settings applied under every trial's assignment.
    #[serde(default)]
    model: Option<Value>,
}

fn default_folds() -> Folds {
    Folds::Count(5)
}

fn default_concurrency() -> usize {
    1
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("HS_RUN_CONFIG"))
        .map(PathBuf::from)
        .context("usage: hs-search <run.json> (or set HS_RUN_CONFIG)")?;

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading run file {}", path.display()))?;
    let run: RunFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing run file {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let dataset = load_dataset(&run, base)?;
    let space = SearchSpace::from_json(&run.space).context("invalid search space")?;
    let base_params = match &run.model {
        Some(model) => LogisticParams::from_config(&ConfigObject::from_value(model.clone(), "model")?)
            .context("invalid model settings")?,
        None => LogisticParams::default(),
    };
    info!("Fixed model settings: {:?}", base_params);

    let mut tuner = Tuner::new(space, run.metric.as_str(), run.direction)
        .with_folds(run.folds)
        .with_trials(run.n_trials)
        .with_strategy(run.strategy)
        .with_concurrency(run.concurrency)
        .with_history(run.keep_history);
    if let Some(seed) = run.seed {
        tuner = tuner.with_seed(seed);
    }

    let result = tuner.tune(&dataset, LogisticRegression::factory(base_params))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn load_dataset(run: &RunFile, base: &Path) -> Result<Dataset> {
    let data_path = base.join(&run.data);
    let mut table = Table::from_csv_path(&data_path)?;

    if !run.categorical.is_empty() {
        let map_file = match &run.mapping_file {
            Some(file) => base.join(file),
            None => data_path.with_extension("mappings.json"),
        };
        let columns: Vec<&str> = run.categorical.iter().map(String::as_str).collect();
        table = encode_categorical_columns(table, &columns, &map_file)?;
        info!("Encoded {:?}; mappings in {}", columns, map_file.display());
    }

    let dataset = match &run.features {
        Some(features) => {
            let features: Vec<&str> = features.iter().map(String::as_str).collect();
            Dataset::from_table_columns(&table, &run.target, &features)?
        }
        None => Dataset::from_table(&table, &run.target)?,
    };
    Ok(dataset)
}
