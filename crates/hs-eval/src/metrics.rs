//! Scoring functions: a registry of named metrics plus caller-supplied ones.
//!
//! Every named metric is higher-is-better; error metrics are registered in
//! negated form (`neg_mean_squared_error`, ...). Classification metrics
//! treat `1.0` as the positive class.

use hs_types::EvalError;
use std::fmt;
use std::sync::Arc;

/// Signature shared by named and custom metrics: `(y_true, y_pred) -> score`.
pub type MetricFn = dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync;

/// Names accepted by [`Metric::Named`].
pub const METRIC_NAMES: &[&str] = &[
    "accuracy",
    "balanced_accuracy",
    "precision",
    "recall",
    "f1",
    "neg_mean_absolute_error",
    "neg_mean_squared_error",
    "neg_root_mean_squared_error",
    "r2",
];

/// A caller-supplied scoring callable.
///
/// With `greater_is_better == false` the callable's value is negated, so
/// the tuner can keep maximizing.
#[derive(Clone)]
pub struct CustomMetric {
    name: String,
    func: Arc<MetricFn>,
    greater_is_better: bool,
}

impl CustomMetric {
    pub fn new<F>(name: impl Into<String>, func: F, greater_is_better: bool) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            greater_is_better,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn greater_is_better(&self) -> bool {
        self.greater_is_better
    }

    pub fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        let raw = (self.func)(y_true, y_pred);
        if self.greater_is_better {
            raw
        } else {
            -raw
        }
    }
}

impl fmt::Debug for CustomMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMetric")
            .field("name", &self.name)
            .field("greater_is_better", &self.greater_is_better)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Metric {
    Named(String),
    Custom(CustomMetric),
}

impl Metric {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn custom<F>(name: impl Into<String>, func: F, greater_is_better: bool) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(CustomMetric::new(name, func, greater_is_better))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Custom(custom) => custom.name(),
        }
    }

    /// Fails with `UnknownMetric` for names outside the registry.
    pub fn validate(&self) -> Result<(), EvalError> {
        match self {
            Self::Named(name) => named_metric(name).map(|_| ()),
            Self::Custom(_) => Ok(()),
        }
    }

    pub fn score(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64, EvalError> {
        if y_true.len() != y_pred.len() {
            return Err(EvalError::failure(format!(
                "metric '{}' got {} labels and {} predictions",
                self.name(),
                y_true.len(),
                y_pred.len()
            )));
        }
        match self {
            Self::Named(name) => Ok(named_metric(name)?(y_true, y_pred)),
            Self::Custom(custom) => Ok(custom.score(y_true, y_pred)),
        }
    }
}

impl From<&str> for Metric {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Metric {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<CustomMetric> for Metric {
    fn from(custom: CustomMetric) -> Self {
        Self::Custom(custom)
    }
}

fn named_metric(name: &str) -> Result<fn(&[f64], &[f64]) -> f64, EvalError> {
    let func: fn(&[f64], &[f64]) -> f64 = match name {
        "accuracy" => accuracy,
        "balanced_accuracy" => balanced_accuracy,
        "precision" => precision,
        "recall" => recall,
        "f1" => f1,
        "neg_mean_absolute_error" => neg_mean_absolute_error,
        "neg_mean_squared_error" => neg_mean_squared_error,
        "neg_root_mean_squared_error" => neg_root_mean_squared_error,
        "r2" => r2,
        _ => {
            return Err(EvalError::UnknownMetric {
                name: name.to_string(),
            })
        }
    };
    Ok(func)
}

pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Mean per-class recall over the classes present in `y_true`.
pub fn balanced_accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut classes: Vec<f64> = y_true.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();

    let recalls: Vec<f64> = classes
        .iter()
        .map(|&class| {
            let (hits, total) = y_true
                .iter()
                .zip(y_pred)
                .filter(|(&t, _)| t == class)
                .fold((0usize, 0usize), |(hits, total), (_, &p)| {
                    (hits + usize::from(p == class), total + 1)
                });
            hits as f64 / total as f64
        })
        .collect();
    recalls.iter().sum::<f64>() / recalls.len() as f64
}

struct Confusion {
    tp: f64,
    fp: f64,
    fn_: f64,
}

fn confusion(y_true: &[f64], y_pred: &[f64]) -> Confusion {
    let mut c = Confusion {
        tp: 0.0,
        fp: 0.0,
        fn_: 0.0,
    };
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == 1.0, p == 1.0) {
            (true, true) => c.tp += 1.0,
            (false, true) => c.fp += 1.0,
            (true, false) => c.fn_ += 1.0,
            (false, false) => {}
        }
    }
    c
}

/// Zero when nothing was predicted positive.
pub fn precision(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = confusion(y_true, y_pred);
    ratio(c.tp, c.tp + c.fp)
}

pub fn recall(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = confusion(y_true, y_pred);
    ratio(c.tp, c.tp + c.fn_)
}

pub fn f1(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = confusion(y_true, y_pred);
    ratio(2.0 * c.tp, 2.0 * c.tp + c.fp + c.fn_)
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let total: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    total / y_true.len() as f64
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let total: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    total / y_true.len() as f64
}

fn neg_mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    -mean_absolute_error(y_true, y_pred)
}

fn neg_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    -mean_squared_error(y_true, y_pred)
}

fn neg_root_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    -mean_squared_error(y_true, y_pred).sqrt()
}

/// Coefficient of determination. A constant `y_true` scores 1.0 when
/// predicted exactly and 0.0 otherwise.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
