//! One-call hyperparameter search over a cross-validated model.

use hs_optimizer::{
    GridSearch, ObjectiveDirection, Proposer, RandomSearch, RunConfig, SearchResult, SearchSpace,
    TpeSearch, TrialRunner,
};
use hs_types::{config_error, internal_error, HsError, HsResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::cv::CrossValEvaluator;
use crate::dataset::Dataset;
use crate::folds::FoldStrategy;
use crate::metrics::Metric;
use crate::model::ModelFactory;

/// Which proposer drives the search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Random,
    Grid,
    #[default]
    Tpe,
}

impl FromStr for Strategy {
    type Err = HsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "grid" => Ok(Self::Grid),
            "tpe" => Ok(Self::Tpe),
            other => Err(config_error!(
                "unknown search strategy '{}' (expected random, grid or tpe)",
                other
            )),
        }
    }
}

/// Search configuration bundled with the evaluation setup.
///
/// ```ignore
/// let result = Tuner::new(space, "accuracy", ObjectiveDirection::Maximize)
///     .with_folds(FoldStrategy::k_fold(5).shuffled(Some(42)))
///     .with_trials(4)
///     .tune(&dataset, LogisticRegression::factory(LogisticParams::default()))?;
/// ```
#[derive(Debug, Clone)]
pub struct Tuner {
    space: SearchSpace,
    metric: Metric,
    direction: ObjectiveDirection,
    folds: FoldStrategy,
    n_trials: usize,
    strategy: Strategy,
    seed: Option<u64>,
    concurrency: usize,
    grid_steps: usize,
    timeout: Option<Duration>,
    keep_history: bool,
}

impl Tuner {
    /// Five unshuffled folds, ten TPE trials, sequential.
    pub fn new(
        space: SearchSpace,
        metric: impl Into<Metric>,
        direction: ObjectiveDirection,
    ) -> Self {
        Self {
            space,
            metric: metric.into(),
            direction,
            folds: FoldStrategy::k_fold(5),
            n_trials: 10,
            strategy: Strategy::Tpe,
            seed: None,
            concurrency: 1,
            grid_steps: 5,
            timeout: None,
            keep_history: false,
        }
    }

    pub fn with_folds(mut self, folds: impl Into<FoldStrategy>) -> Self {
        self.folds = folds.into();
        self
    }

    pub fn with_trials(mut self, n_trials: usize) -> Self {
        self.n_trials = n_trials;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parallel trials only apply to the random and grid strategies.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Points per real-valued axis for grid search.
    pub fn with_grid_steps(mut self, steps: usize) -> Self {
        self.grid_steps = steps.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_history(mut self, keep: bool) -> Self {
        self.keep_history = keep;
        self
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn proposer(&self) -> Box<dyn Proposer> {
        match (self.strategy, self.seed) {
            (Strategy::Grid, _) => Box::new(GridSearch::new(self.grid_steps)),
            (Strategy::Random, Some(seed)) => Box::new(RandomSearch::with_seed(seed)),
            (Strategy::Random, None) => Box::new(RandomSearch::new()),
            (Strategy::Tpe, Some(seed)) => Box::new(TpeSearch::new().with_seed(seed)),
            (Strategy::Tpe, None) => Box::new(TpeSearch::new()),
        }
    }

    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(self.n_trials, self.direction)
            .with_name(format!("{}-{:?}", self.metric.name(), self.strategy).to_lowercase())
            .with_concurrency(self.concurrency)
            .with_history(self.keep_history);
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }

    /// Search for the assignment with the best mean cross-validation score.
    pub fn tune<F: ModelFactory>(&self, dataset: &Dataset, factory: F) -> HsResult<SearchResult> {
        let evaluator = CrossValEvaluator::new(dataset, self.folds.clone(), self.metric.clone(), factory);
        let runner = TrialRunner::new(self.run_config());
        let mut proposer = self.proposer();

        info!(
            "Tuning on {} samples with {} folds, metric '{}', {:?} strategy",
            dataset.n_samples(),
            self.folds.n_splits(),
            self.metric.name(),
            self.strategy
        );

        if self.concurrency > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .build()
                .map_err(|e| internal_error!("failed to build trial thread pool: {}", e))?;
            pool.install(|| runner.run_parallel(&evaluator, &self.space, &mut proposer))
        } else {
            runner.run(&evaluator, &self.space, &mut proposer)
        }
    }
}
