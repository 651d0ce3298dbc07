//! Cross-validated scoring of one assignment.

use hs_optimizer::Evaluator;
use hs_types::{Assignment, EvalError};
use ndarray::Array1;
use std::sync::OnceLock;
use tracing::debug;

use crate::dataset::Dataset;
use crate::folds::{FoldStrategy, Split};
use crate::metrics::Metric;
use crate::model::ModelFactory;

/// Per-fold scores of `assignment`: a fresh model is built, fitted on each
/// training side and scored on the matching test side.
pub fn cross_val_score<F>(
    factory: &F,
    assignment: &Assignment,
    dataset: &Dataset,
    folds: &FoldStrategy,
    metric: &Metric,
) -> Result<Vec<f64>, EvalError>
where
    F: ModelFactory + ?Sized,
{
    metric.validate()?;
    let splits = folds.split(dataset.targets())?;
    score_splits(factory, assignment, dataset, &splits, metric)
}

fn score_splits<F>(
    factory: &F,
    assignment: &Assignment,
    dataset: &Dataset,
    splits: &[Split],
    metric: &Metric,
) -> Result<Vec<f64>, EvalError>
where
    F: ModelFactory + ?Sized,
{
    splits
        .iter()
        .enumerate()
        .map(|(fold, split)| {
            let train = dataset.subset(&split.train);
            let test = dataset.subset(&split.test);

            let mut model = factory.build(assignment)?;
            model.fit(&train)?;
            let predictions = model.predict(&test)?;
            let score = score_fold(metric, test.targets(), &predictions)?;

            debug!(
                "Fold {}/{}: {} = {:.6} ({} train, {} test)",
                fold + 1,
                splits.len(),
                metric.name(),
                score,
                train.n_samples(),
                test.n_samples()
            );
            Ok(score)
        })
        .collect()
}

/// Score one fold; metrics read plain slices.
fn score_fold(metric: &Metric, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64, EvalError> {
    match (y_true.as_slice(), y_pred.as_slice()) {
        (Some(t), Some(p)) => metric.score(t, p),
        _ => metric.score(&y_true.to_vec(), &y_pred.to_vec()),
    }
}

/// Scores assignments by the mean metric value across folds.
///
/// The metric is checked before any model is trained, so an unknown name
/// surfaces on the first evaluation. Splits are computed once and reused by
/// every trial, which keeps shuffled folds identical across trials.
pub struct CrossValEvaluator<'a, F> {
    dataset: &'a Dataset,
    folds: FoldStrategy,
    metric: Metric,
    factory: F,
    splits: OnceLock<Result<Vec<Split>, EvalError>>,
}

impl<'a, F: ModelFactory> CrossValEvaluator<'a, F> {
    pub fn new(dataset: &'a Dataset, folds: FoldStrategy, metric: Metric, factory: F) -> Self {
        Self {
            dataset,
            folds,
            metric,
            factory,
            splits: OnceLock::new(),
        }
    }

    pub fn metric(&self) -> &Metric {
        &self.metric
    }

    pub fn folds(&self) -> &FoldStrategy {
        &self.folds
    }

    fn splits(&self) -> Result<&[Split], EvalError> {
        let splits = self.splits.get_or_init(|| {
            let splits = self.folds.split(self.dataset.targets());
            if let Ok(splits) = &splits {
                debug!(
                    "Prepared {} folds over {} samples",
                    splits.len(),
                    self.dataset.n_samples()
                );
            }
            splits
        });
        splits.as_deref().map_err(Clone::clone)
    }
}

impl<F: ModelFactory> Evaluator for CrossValEvaluator<'_, F> {
    fn evaluate(&self, assignment: &Assignment) -> Result<f64, EvalError> {
        self.metric.validate()?;
        let splits = self.splits()?;
        let scores = score_splits(&self.factory, assignment, self.dataset, splits, &self.metric)?;
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}
