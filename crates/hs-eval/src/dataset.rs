//! Numeric feature matrices with one target per row.

use hs_data::Table;
use hs_types::{EvalError, HsResult};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::TAU;
use tracing::info;

/// Feature matrix (one row per sample) plus targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    features: Array2<f64>,
    targets: Array1<f64>,
    feature_names: Vec<String>,
}

fn invalid(message: impl Into<String>) -> EvalError {
    EvalError::InvalidDataset {
        message: message.into(),
    }
}

impl Dataset {
    /// Rows must be non-empty, finite and match `targets`.
    pub fn new(features: Array2<f64>, targets: Array1<f64>) -> Result<Self, EvalError> {
        if features.nrows() == 0 {
            return Err(invalid("dataset has no rows"));
        }
        if features.nrows() != targets.len() {
            return Err(invalid(format!(
                "{} feature rows but {} targets",
                features.nrows(),
                targets.len()
            )));
        }
        if features.ncols() == 0 {
            return Err(invalid("dataset has no feature columns"));
        }
        if let Some(row) = features
            .axis_iter(Axis(0))
            .position(|r| r.iter().any(|v| !v.is_finite()))
        {
            return Err(invalid(format!("row {row} has a non-finite feature")));
        }
        if let Some(row) = targets.iter().position(|t| !t.is_finite()) {
            return Err(invalid(format!("row {row} has a non-finite target")));
        }

        let feature_names = (0..features.ncols()).map(|i| format!("x{i}")).collect();
        Ok(Self {
            features,
            targets,
            feature_names,
        })
    }

    /// Build from row vectors, which must all have the same width.
    pub fn from_rows(rows: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self, EvalError> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().position(|r| r.len() != width) {
            return Err(invalid(format!(
                "row {} has {} features, expected {}",
                row,
                rows[row].len(),
                width
            )));
        }
        let n_rows = rows.len();
        let features = Array2::from_shape_vec((n_rows, width), rows.concat())
            .map_err(|e| invalid(format!("cannot shape {n_rows}x{width} features: {e}")))?;
        Self::new(features, Array1::from(targets))
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self, EvalError> {
        if names.len() != self.n_features() {
            return Err(invalid(format!(
                "{} feature names for {} features",
                names.len(),
                self.n_features()
            )));
        }
        self.feature_names = names;
        Ok(self)
    }

    /// Two balanced classes, in the spirit of `make_classification`.
    ///
    /// The first half of the features (at least one) carry a class-dependent
    /// mean shift of +/-1; the rest are pure standard normal noise. Labels
    /// alternate 0, 1, 0, ... so every prefix is close to balanced.
    pub fn synthetic_binary(n_samples: usize, n_features: usize, seed: u64) -> Self {
        let n_features = n_features.max(1);
        let informative = (n_features / 2).max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let targets = Array1::from_shape_fn(n_samples, |i| (i % 2) as f64);
        let features = Array2::from_shape_fn((n_samples, n_features), |(i, j)| {
            let noise = standard_normal(&mut rng);
            if j < informative {
                noise + 2.0 * targets[i] - 1.0
            } else {
                noise
            }
        });

        Self {
            features,
            targets,
            feature_names: (0..n_features).map(|i| format!("x{i}")).collect(),
        }
    }

    /// Every column other than `target` becomes a feature, in table order.
    pub fn from_table(table: &Table, target: &str) -> HsResult<Self> {
        let features: Vec<&str> = table
            .names()
            .iter()
            .map(String::as_str)
            .filter(|name| *name != target)
            .collect();
        Self::from_table_columns(table, target, &features)
    }

    /// Build from selected columns; cells must be numbers or booleans.
    pub fn from_table_columns(table: &Table, target: &str, features: &[&str]) -> HsResult<Self> {
        let indexes = table.column_indexes(features)?;
        let targets = numeric_column(target, table.column(target)?)?;

        let mut matrix = Array2::zeros((table.n_rows(), features.len()));
        for ((name, index), mut column) in features
            .iter()
            .zip(indexes)
            .zip(matrix.axis_iter_mut(Axis(1)))
        {
            let values = table.column_at(index).unwrap_or_default();
            column.assign(&numeric_column(name, values)?);
        }

        let dataset = Self::new(matrix, targets)?
            .with_feature_names(features.iter().map(|s| s.to_string()).collect())?;
        info!(
            "Dataset ready: {} samples, {} features, target '{}'",
            dataset.n_samples(),
            dataset.n_features(),
            target
        );
        Ok(dataset)
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn targets(&self) -> &Array1<f64> {
        &self.targets
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_samples(&self) -> usize {
        self.targets.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }
}

fn numeric_column(name: &str, values: &[Value]) -> Result<Array1<f64>, EvalError> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            number.ok_or_else(|| {
                invalid(format!(
                    "column '{name}' row {row} is not numeric ({value}); encode categorical columns first"
                ))
            })
        })
        .collect()
}

/// Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn rejects_malformed_input() {
        assert!(Dataset::from_rows(vec![], vec![]).is_err());
        assert!(Dataset::from_rows(vec![vec![1.0]], vec![0.0, 1.0]).is_err());
        assert!(Dataset::from_rows(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 1.0]).is_err());
        assert!(Dataset::from_rows(vec![vec![f64::NAN]], vec![0.0]).is_err());
        assert!(Dataset::from_rows(vec![vec![]], vec![0.0]).is_err());
        assert!(Dataset::new(array![[1.0], [2.0]], array![0.0, f64::INFINITY]).is_err());

        let ok = Dataset::new(array![[1.0, 2.0], [3.0, 4.0]], array![0.0, 1.0]).unwrap();
        assert_eq!(ok.feature_names(), &["x0", "x1"]);
    }

    #[test]
    fn synthetic_data_is_seeded_and_balanced() {
        let a = Dataset::synthetic_binary(100, 6, 42);
        let b = Dataset::synthetic_binary(100, 6, 42);
        let c = Dataset::synthetic_binary(100, 6, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);

        assert_eq!(a.n_samples(), 100);
        assert_eq!(a.n_features(), 6);
        let positives = a.targets().iter().filter(|&&t| t == 1.0).count();
        assert_eq!(positives, 50);
    }

    #[test]
    fn informative_features_separate_classes() {
        let data = Dataset::synthetic_binary(400, 4, 1);
        let mean = |label: f64| {
            let rows: Vec<usize> = (0..data.n_samples())
                .filter(|&i| data.targets()[i] == label)
                .collect();
            data.features().select(Axis(0), &rows).column(0).mean().unwrap()
        };
        assert!(mean(1.0) - mean(0.0) > 1.5);
    }

    #[test]
    fn subset_keeps_order() {
        let data = Dataset::new(array![[0.0], [1.0], [2.0], [3.0]], array![0.0, 1.0, 0.0, 1.0])
            .unwrap();
        let sub = data.subset(&[3, 1]);
        assert_eq!(sub.features(), &array![[3.0], [1.0]]);
        assert_eq!(sub.targets(), &array![1.0, 1.0]);
    }

    #[test]
    fn from_table_uses_remaining_columns() {
        let table = Table::from_columns(vec![
            ("age", vec![json!(31), json!(45), json!(27)]),
            ("member", vec![json!(true), json!(false), json!(true)]),
            ("label", vec![json!(1), json!(0), json!(1)]),
            ("score", vec![json!(0.5), json!(0.25), json!(0.75)]),
        ])
        .unwrap();

        let data = Dataset::from_table(&table, "label").unwrap();
        assert_eq!(data.feature_names(), &["age", "member", "score"]);
        assert_eq!(data.features().row(1), array![45.0, 0.0, 0.25]);
        assert_eq!(data.targets(), &array![1.0, 0.0, 1.0]);

        let picked = Dataset::from_table_columns(&table, "label", &["score", "age"]).unwrap();
        assert_eq!(picked.features().row(0), array![0.5, 31.0]);
    }

    #[test]
    fn csv_with_categorical_columns_becomes_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("pets.csv");
        std::fs::write(&csv, "weight,color,adopted\n4.5,red,1\n3.0,blue,0\n5.25,red,1\n").unwrap();

        let table = Table::from_csv_path(&csv).unwrap();
        let table = hs_data::encode_categorical_columns(
            table,
            &["color"],
            dir.path().join("pets.mappings.json"),
        )
        .unwrap();

        let data = Dataset::from_table(&table, "adopted").unwrap();
        assert_eq!(data.feature_names(), &["weight", "color"]);
        assert_eq!(data.features().row(1), array![3.0, 1.0]);
        assert_eq!(data.targets(), &array![1.0, 0.0, 1.0]);
    }

    #[test]
    fn from_table_rejects_text_and_missing_columns() {
        let table = Table::from_columns(vec![
            ("color", vec![json!("red"), json!("blue")]),
            ("label", vec![json!(0), json!(1)]),
        ])
        .unwrap();
        let err = Dataset::from_table(&table, "label").unwrap_err();
        assert!(err.to_string().contains("encode categorical columns first"));

        assert!(Dataset::from_table(&table, "absent").is_err());
    }
}
