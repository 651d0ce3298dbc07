//! Categorical column encoding with a JSON mapping file.
//!
//! The mapping file is `{column: {value: code}}`, written in the order the
//! columns were requested. Codes are assigned from 0 in order of first
//! occurrence; keys are the string form of the original value (strings
//! verbatim, everything else as its JSON text).
//!
//! Decoding reads a column's keys back as JSON scalars when every key
//! parses as a number, boolean or `null`, and as strings otherwise.
//! Fitting refuses any column that rule would not reproduce exactly.

use hs_types::{DataError, HsResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::table::Table;

/// Value to code mapping of one column, in first-occurrence order.
pub type ColumnMapping = IndexMap<String, i64>;

/// Per-column value to code mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMappings {
    columns: IndexMap<String, ColumnMapping>,
}

impl CategoryMappings {
    /// Assign codes to the distinct values of each listed column.
    ///
    /// Fails with `InvalidFormat` when two distinct values share a key
    /// (`"7"` and `7`) or a value would decode as something else (the
    /// string `"1"` in a column whose keys are all numeric).
    pub fn fit(table: &Table, columns: &[&str]) -> Result<Self, DataError> {
        let mut mappings = Self::default();
        for &column in columns {
            let mut mapping = ColumnMapping::new();
            let mut originals: Vec<&Value> = Vec::new();
            for value in table.column(column)? {
                let key = string_form(value);
                match mapping.get_index_of(&key) {
                    Some(index) if originals[index] != value => {
                        return Err(DataError::InvalidFormat {
                            message: format!(
                                "column '{column}': values {} and {} share the mapping key '{key}'",
                                originals[index], value
                            ),
                        });
                    }
                    Some(_) => {}
                    None => {
                        mapping.insert(key, originals.len() as i64);
                        originals.push(value);
                    }
                }
            }

            let typed = keys_are_scalars(&mapping);
            for (key, original) in mapping.keys().zip(&originals) {
                if restore(key, typed) != **original {
                    return Err(DataError::InvalidFormat {
                        message: format!(
                            "column '{column}': value {original} would not decode to itself"
                        ),
                    });
                }
            }

            debug!("Column '{}': {} categories", column, mapping.len());
            mappings.columns.insert(column.to_string(), mapping);
        }
        Ok(mappings)
    }

    pub fn get(&self, column: &str) -> Option<&ColumnMapping> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Replace every mapped column's values with their codes.
    pub fn encode(&self, table: &mut Table) -> Result<(), DataError> {
        for (column, mapping) in &self.columns {
            let codes = table
                .column(column)?
                .iter()
                .map(|value| {
                    let key = string_form(value);
                    mapping
                        .get(&key)
                        .map(|&code| Value::from(code))
                        .ok_or_else(|| DataError::UnknownCode {
                            column: column.clone(),
                            code: key,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.replace_column(column, codes)?;
        }
        Ok(())
    }

    /// Replace every mapped column's codes with the original values.
    pub fn decode(&self, table: &mut Table) -> Result<(), DataError> {
        for (column, mapping) in &self.columns {
            let typed = keys_are_scalars(mapping);
            let inverse: HashMap<i64, Value> = mapping
                .iter()
                .map(|(key, &code)| (code, restore(key, typed)))
                .collect();
            let values = table
                .column(column)?
                .iter()
                .map(|cell| {
                    cell.as_i64()
                        .and_then(|code| inverse.get(&code).cloned())
                        .ok_or_else(|| DataError::UnknownCode {
                            column: column.clone(),
                            code: cell.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.replace_column(column, values)?;
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> HsResult<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!("Saved {} column mappings to {}", self.columns.len(), path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to open mapping file {}: {}", path.display(), e),
        })?;
        let mappings: Self = serde_json::from_reader(BufReader::new(file))?;
        info!("Loaded {} column mappings from {}", mappings.columns.len(), path.display());
        Ok(mappings)
    }
}

/// Encode `columns` of `table` to integer codes and write the mapping file.
pub fn encode_categorical_columns<P: AsRef<Path>>(
    mut table: Table,
    columns: &[&str],
    map_file: P,
) -> HsResult<Table> {
    let mappings = CategoryMappings::fit(&table, columns)?;
    mappings.encode(&mut table)?;
    mappings.save(map_file)?;
    Ok(table)
}

/// Decode every column named in the mapping file back to its values.
pub fn decode_categorical_columns<P: AsRef<Path>>(mut table: Table, map_file: P) -> HsResult<Table> {
    let mappings = CategoryMappings::load(map_file)?;
    mappings.decode(&mut table)?;
    Ok(table)
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar(key: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(key) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => Some(value),
        _ => None,
    }
}

fn keys_are_scalars(mapping: &ColumnMapping) -> bool {
    mapping.keys().all(|key| scalar(key).is_some())
}

fn restore(key: &str, typed: bool) -> Value {
    typed
        .then(|| scalar(key))
        .flatten()
        .unwrap_or_else(|| Value::String(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_columns(vec![
            ("id", vec![json!(1), json!(2), json!(3), json!(4), json!(5)]),
            (
                "color",
                vec![json!("red"), json!("green"), json!("red"), json!("blue"), json!("green")],
            ),
            (
                "size",
                vec![json!("S"), json!("M"), json!("L"), json!("XL"), json!("M")],
            ),
        ])
        .unwrap()
    }

    fn codes(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&v| json!(v)).collect()
    }

    #[test]
    fn encodes_in_first_occurrence_order() {
        let dir = tempfile::tempdir().unwrap();
        let map_file = dir.path().join("mappings.json");

        let encoded = encode_categorical_columns(sample(), &["color", "size"], &map_file).unwrap();
        assert_eq!(encoded.column("color").unwrap(), codes(&[0, 1, 0, 2, 1]));
        assert_eq!(encoded.column("size").unwrap(), codes(&[0, 1, 2, 3, 1]));
        assert_eq!(encoded.column("id").unwrap(), sample().column("id").unwrap());

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&map_file).unwrap()).unwrap();
        assert_eq!(written["color"], json!({"red": 0, "green": 1, "blue": 2}));
        assert_eq!(written["size"], json!({"S": 0, "M": 1, "L": 2, "XL": 3}));
    }

    #[test]
    fn decode_restores_the_original_table() {
        let dir = tempfile::tempdir().unwrap();
        let map_file = dir.path().join("mappings.json");

        let encoded = encode_categorical_columns(sample(), &["color", "size"], &map_file).unwrap();
        let decoded = decode_categorical_columns(encoded, &map_file).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn non_string_values_round_trip() {
        let table = Table::from_columns(vec![(
            "flag",
            vec![json!(true), json!(7), Value::Null, json!(2.5), json!(true)],
        )])
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let map_file = dir.path().join("flags.json");

        let encoded = encode_categorical_columns(table.clone(), &["flag"], &map_file).unwrap();
        assert_eq!(encoded.column("flag").unwrap(), codes(&[0, 1, 2, 3, 0]));
        assert_eq!(decode_categorical_columns(encoded, &map_file).unwrap(), table);
    }

    #[test]
    fn numeric_looking_strings_round_trip_from_csv() {
        let table = Table::from_csv_reader("grade,score\n1,0.5\nA,0.7\n2,0.1\n".as_bytes()).unwrap();
        assert_eq!(table.column("grade").unwrap(), &[json!("1"), json!("A"), json!("2")]);

        let dir = tempfile::tempdir().unwrap();
        let map_file = dir.path().join("grades.json");
        let encoded = encode_categorical_columns(table.clone(), &["grade"], &map_file).unwrap();
        assert_eq!(encoded.column("grade").unwrap(), codes(&[0, 1, 2]));
        assert_eq!(decode_categorical_columns(encoded, &map_file).unwrap(), table);
    }

    #[test]
    fn colliding_or_ambiguous_values_are_rejected() {
        let mixed = Table::from_columns(vec![("k", vec![json!("7"), json!(7)])]).unwrap();
        match CategoryMappings::fit(&mixed, &["k"]) {
            Err(DataError::InvalidFormat { message }) => {
                assert!(message.contains("column 'k'"), "{message}");
                assert!(message.contains("share the mapping key '7'"), "{message}");
            }
            other => panic!("expected InvalidFormat, got {other:?}"),
        }

        // All keys parse as numbers, so "1" would come back as 1.
        let digits = Table::from_columns(vec![("k", vec![json!("1"), json!(2)])]).unwrap();
        assert!(matches!(
            CategoryMappings::fit(&digits, &["k"]),
            Err(DataError::InvalidFormat { .. })
        ));

        // A text key forces strings, so 7 would come back as "7".
        let text = Table::from_columns(vec![("k", vec![json!("A"), json!(7)])]).unwrap();
        assert!(CategoryMappings::fit(&text, &["k"]).is_err());
    }

    #[test]
    fn mapping_file_keeps_requested_and_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let map_file = dir.path().join("ordered.json");
        encode_categorical_columns(sample(), &["size", "color"], &map_file).unwrap();

        let text = std::fs::read_to_string(&map_file).unwrap();
        assert_eq!(
            text,
            r#"{"size":{"S":0,"M":1,"L":2,"XL":3},"color":{"red":0,"green":1,"blue":2}}"#
        );
        let loaded = CategoryMappings::load(&map_file).unwrap();
        assert_eq!(loaded.columns().collect::<Vec<_>>(), vec!["size", "color"]);
    }

    #[test]
    fn unknown_column_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = encode_categorical_columns(sample(), &["shape"], dir.path().join("m.json"))
            .unwrap_err();
        assert!(err.to_string().contains("Column not found: shape"));
    }

    #[test]
    fn unknown_code_is_a_data_error() {
        let mappings = CategoryMappings::fit(&sample(), &["color"]).unwrap();
        let mut table =
            Table::from_columns(vec![("color", codes(&[0, 1, 9]))]).unwrap();

        match mappings.decode(&mut table) {
            Err(DataError::UnknownCode { column, code }) => {
                assert_eq!(column, "color");
                assert_eq!(code, "9");
            }
            other => panic!("expected UnknownCode, got {other:?}"),
        }
    }

    #[test]
    fn missing_mapping_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_categorical_columns(sample(), dir.path().join("absent.json")).is_err());
    }
}
