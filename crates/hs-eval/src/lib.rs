//! # hs-eval
//!
//! Cross-validated evaluation for HyperSweep: datasets, fold strategies,
//! metrics, the reference logistic regression model and the [`Tuner`]
//! facade that wires them to the trial loop in `hs-optimizer`.

pub mod cv;
pub mod dataset;
pub mod folds;
pub mod linear;
pub mod metrics;
pub mod model;
pub mod tuner;

pub use cv::{cross_val_score, CrossValEvaluator};
pub use dataset::Dataset;
pub use folds::{FoldStrategy, Split};
pub use linear::{LogisticParams, LogisticRegression, Solver};
pub use metrics::{CustomMetric, Metric, METRIC_NAMES};
pub use model::{Model, ModelFactory};
pub use tuner::{Strategy, Tuner};
