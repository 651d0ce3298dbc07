//! Column-oriented tables of JSON cells, loaded from CSV.

use hs_types::{DataError, HsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::index::find_indexes;

/// A named set of equally long columns.
///
/// Cells are JSON values so one table can hold numeric features, raw
/// categorical strings and the integer codes that replace them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns<I, S>(columns: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (name, values) in columns {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Append a column; names are unique and lengths must agree.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), DataError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(DataError::InvalidFormat {
                message: format!("duplicate column '{name}'"),
            });
        }
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    values.len(),
                    self.n_rows()
                ),
            });
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Load a CSV file with a header row.
    ///
    /// Each column gets one inferred type: integers if every non-empty cell
    /// parses as `i64`, floats if every one parses as a finite `f64`,
    /// strings otherwise. Empty cells become `null`.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let path = path.as_ref();
        info!("Loading table from: {}", path.display());

        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to open CSV file {}: {}", path.display(), e),
            })?;
        let table = Self::read_csv(reader)?;

        info!(
            "Loaded {} rows x {} columns from {}",
            table.n_rows(),
            table.n_columns(),
            path.display()
        );
        Ok(table)
    }

    /// Same as [`Table::from_csv_path`] for any reader.
    pub fn from_csv_reader<R: Read>(reader: R) -> HsResult<Self> {
        Self::read_csv(csv::ReaderBuilder::new().has_headers(true).from_reader(reader))
    }

    fn read_csv<R: Read>(mut reader: csv::Reader<R>) -> HsResult<Self> {
        let headers = reader
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV header: {e}"),
            })?
            .clone();

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| DataError::InvalidFormat {
                message: format!("CSV record at line {}: {}", line + 2, e),
            })?;
            for (cells, field) in raw.iter_mut().zip(record.iter()) {
                cells.push(field.trim().to_string());
            }
        }

        let mut table = Self::new();
        for (name, cells) in headers.iter().zip(raw) {
            let values = infer_column(&cells);
            debug!("Column '{}' parsed as {}", name, column_kind(&values));
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&[Value], DataError> {
        let index = self.position(name)?;
        Ok(&self.columns[index])
    }

    /// Swap in new values for an existing column of the same length.
    pub fn replace_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), DataError> {
        let index = self.position(name)?;
        if values.len() != self.columns[index].len() {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "replacement for '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    self.columns[index].len()
                ),
            });
        }
        self.columns[index] = values;
        Ok(())
    }

    /// Positions of the named columns, in the order requested.
    pub fn column_indexes(&self, names: &[&str]) -> Result<Vec<usize>, DataError> {
        let own: Vec<&str> = self.names.iter().map(String::as_str).collect();
        if let Some(missing) = names.iter().find(|name| !own.contains(*name)) {
            return Err(DataError::ColumnNotFound {
                column: missing.to_string(),
            });
        }
        Ok(find_indexes(names, &own))
    }

    pub fn column_at(&self, index: usize) -> Option<&[Value]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    fn position(&self, name: &str) -> Result<usize, DataError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::ColumnNotFound {
                column: name.to_string(),
            })
    }
}

fn infer_column(cells: &[String]) -> Vec<Value> {
    let mut present = cells.iter().filter(|c| !c.is_empty());
    if present.clone().all(|c| c.parse::<i64>().is_ok()) {
        return cells
            .iter()
            .map(|c| c.parse::<i64>().map_or(Value::Null, Value::from))
            .collect();
    }
    if present.all(|c| c.parse::<f64>().map_or(false, f64::is_finite)) {
        return cells
            .iter()
            .map(|c| {
                c.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            })
            .collect();
    }
    cells
        .iter()
        .map(|c| {
            if c.is_empty() {
                Value::Null
            } else {
                Value::String(c.clone())
            }
        })
        .collect()
}

fn column_kind(values: &[Value]) -> &'static str {
    match values.iter().find(|v| !v.is_null()) {
        Some(Value::Number(n)) if n.is_i64() => "integer",
        Some(Value::Number(_)) => "float",
        Some(_) => "string",
        None => "empty",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const CSV: &str = "id,color,size,weight\n1,red,S,1.5\n2,green,M,2\n3,red,L,\n";

    #[test]
    fn csv_columns_get_inferred_types() {
        let table = Table::from_csv_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.names(), &["id", "color", "size", "weight"]);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column("id").unwrap(), &[json!(1), json!(2), json!(3)]);
        assert_eq!(
            table.column("color").unwrap(),
            &[json!("red"), json!("green"), json!("red")]
        );
        assert_eq!(
            table.column("weight").unwrap(),
            &[json!(1.5), json!(2.0), Value::Null]
        );
    }

    #[test]
    fn csv_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let table = Table::from_csv_path(file.path()).unwrap();
        assert_eq!(table.n_columns(), 4);
        assert!(Table::from_csv_path(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn ragged_csv_is_rejected() {
        let err = Table::from_csv_reader("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn column_lookup_and_replacement() {
        let mut table = Table::from_columns(vec![
            ("a", vec![json!(1), json!(2)]),
            ("b", vec![json!("x"), json!("y")]),
            ("c", vec![json!(0.5), json!(0.25)]),
        ])
        .unwrap();

        assert_eq!(table.column_indexes(&["c", "a"]).unwrap(), vec![2, 0]);
        assert!(matches!(
            table.column_indexes(&["a", "zz"]),
            Err(DataError::ColumnNotFound { column }) if column == "zz"
        ));

        table.replace_column("b", vec![json!(0), json!(1)]).unwrap();
        assert_eq!(table.column("b").unwrap(), &[json!(0), json!(1)]);
        assert!(table.replace_column("b", vec![json!(0)]).is_err());
        assert!(table.column("missing").is_err());
    }

    #[test]
    fn columns_must_agree_in_length_and_name() {
        let mut table = Table::new();
        table.push_column("a", vec![json!(1)]).unwrap();
        assert!(table.push_column("b", vec![json!(1), json!(2)]).is_err());
        assert!(table.push_column("a", vec![json!(3)]).is_err());
    }
}
