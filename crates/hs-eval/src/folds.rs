//! Cross-validation fold strategies.

use hs_types::EvalError;
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A single train/test split, as row indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// How rows are partitioned into folds.
///
/// A plain count converts to an unshuffled [`FoldStrategy::KFold`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStrategy {
    KFold {
        n_splits: usize,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Keeps each class's share roughly equal across folds.
    StratifiedKFold {
        n_splits: usize,
        #[serde(default)]
        shuffle: bool,
        #[serde(default)]
        seed: Option<u64>,
    },
    Predefined(Vec<Split>),
}

impl FoldStrategy {
    pub fn k_fold(n_splits: usize) -> Self {
        Self::KFold {
            n_splits,
            shuffle: false,
            seed: None,
        }
    }

    pub fn stratified_k_fold(n_splits: usize) -> Self {
        Self::StratifiedKFold {
            n_splits,
            shuffle: false,
            seed: None,
        }
    }

    /// Shuffle rows before splitting; no effect on predefined splits.
    pub fn shuffled(self, seed: Option<u64>) -> Self {
        match self {
            Self::KFold { n_splits, .. } => Self::KFold {
                n_splits,
                shuffle: true,
                seed,
            },
            Self::StratifiedKFold { n_splits, .. } => Self::StratifiedKFold {
                n_splits,
                shuffle: true,
                seed,
            },
            predefined @ Self::Predefined(_) => predefined,
        }
    }

    pub fn n_splits(&self) -> usize {
        match self {
            Self::KFold { n_splits, .. } | Self::StratifiedKFold { n_splits, .. } => *n_splits,
            Self::Predefined(splits) => splits.len(),
        }
    }

    /// Partition `targets.len()` rows. Stratification reads class labels
    /// from `targets`; the other strategies only use its length.
    pub fn split(&self, targets: &Array1<f64>) -> Result<Vec<Split>, EvalError> {
        let n_samples = targets.len();
        match self {
            Self::KFold {
                n_splits,
                shuffle,
                seed,
            } => {
                check_counts(n_samples, *n_splits)?;
                let mut indices: Vec<usize> = (0..n_samples).collect();
                if *shuffle {
                    indices.shuffle(&mut rng(*seed));
                }
                Ok(contiguous_folds(&indices, *n_splits))
            }
            Self::StratifiedKFold {
                n_splits,
                shuffle,
                seed,
            } => {
                check_counts(n_samples, *n_splits)?;
                stratified_folds(targets, *n_splits, *shuffle, *seed)
            }
            Self::Predefined(splits) => {
                check_predefined(splits, n_samples)?;
                Ok(splits.clone())
            }
        }
    }
}

impl From<usize> for FoldStrategy {
    fn from(n_splits: usize) -> Self {
        Self::k_fold(n_splits)
    }
}

fn rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn check_counts(n_samples: usize, n_splits: usize) -> Result<(), EvalError> {
    if n_splits < 2 {
        return Err(EvalError::InvalidFolds {
            message: format!("n_splits must be at least 2, got {n_splits}"),
        });
    }
    if n_samples < n_splits {
        return Err(EvalError::InvalidFolds {
            message: format!("cannot split {n_samples} samples into {n_splits} folds"),
        });
    }
    Ok(())
}

/// The first `n % k` folds take one extra row.
fn contiguous_folds(indices: &[usize], n_splits: usize) -> Vec<Split> {
    let n_samples = indices.len();
    let base = n_samples / n_splits;
    let remainder = n_samples % n_splits;

    let mut splits = Vec::with_capacity(n_splits);
    let mut start = 0;
    for fold in 0..n_splits {
        let size = if fold < remainder { base + 1 } else { base };
        let end = start + size;
        splits.push(Split {
            train: indices[..start]
                .iter()
                .chain(&indices[end..])
                .copied()
                .collect(),
            test: indices[start..end].to_vec(),
        });
        start = end;
    }
    splits
}

fn stratified_folds(
    targets: &Array1<f64>,
    n_splits: usize,
    shuffle: bool,
    seed: Option<u64>,
) -> Result<Vec<Split>, EvalError> {
    let mut classes: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (row, &target) in targets.iter().enumerate() {
        if target.fract() != 0.0 {
            return Err(EvalError::InvalidFolds {
                message: format!("stratified folds need class labels, row {row} has {target}"),
            });
        }
        classes.entry(target as i64).or_default().push(row);
    }

    let smallest = classes.values().map(Vec::len).min().unwrap_or(0);
    if smallest < n_splits {
        warn!(
            "Least populated class has {} members, fewer than {} folds",
            smallest, n_splits
        );
    }

    let mut rng = rng(seed);
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    // The fold cursor carries across classes so fold sizes stay within one.
    let mut cursor = 0;
    for rows in classes.values_mut() {
        if shuffle {
            rows.shuffle(&mut rng);
        }
        for &row in rows.iter() {
            folds[cursor % n_splits].push(row);
            cursor += 1;
        }
    }

    Ok((0..n_splits)
        .map(|fold| {
            let mut test = folds[fold].clone();
            test.sort_unstable();
            let mut train: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != fold)
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();
            train.sort_unstable();
            Split { train, test }
        })
        .collect())
}

fn check_predefined(splits: &[Split], n_samples: usize) -> Result<(), EvalError> {
    let invalid = |message: String| Err(EvalError::InvalidFolds { message });
    if splits.is_empty() {
        return invalid("no predefined splits".into());
    }
    for (fold, split) in splits.iter().enumerate() {
        if split.train.is_empty() || split.test.is_empty() {
            return invalid(format!("split {fold} has an empty train or test side"));
        }
        if let Some(&row) = split.train.iter().chain(&split.test).find(|&&r| r >= n_samples) {
            return invalid(format!("split {fold} references row {row} of {n_samples}"));
        }
        if split.test.iter().any(|row| split.train.contains(row)) {
            return invalid(format!("split {fold} uses a row for both training and testing"));
        }
    }
    Ok(())
}
