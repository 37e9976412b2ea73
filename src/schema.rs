//! Declared table schemas, type inference and schema validation.

use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Column type of an in-memory table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ColumnType {
    /// Arrow type used for this column in memory
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }

    /// Classify an Arrow type; `None` for types without a counterpart
    pub fn from_data_type(data_type: &DataType) -> Option<ColumnType> {
        match data_type {
            DataType::Boolean => Some(ColumnType::Boolean),
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => Some(ColumnType::Int64),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(ColumnType::Float64),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(ColumnType::Utf8),
            _ => None,
        }
    }

    /// Type name in the transaction log schema
    pub fn delta_type_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Int64 => "long",
            ColumnType::Float64 => "double",
            ColumnType::Utf8 => "string",
        }
    }

    pub fn from_delta_type_name(name: &str) -> Option<ColumnType> {
        match name {
            "boolean" => Some(ColumnType::Boolean),
            "long" => Some(ColumnType::Int64),
            "double" => Some(ColumnType::Float64),
            "string" => Some(ColumnType::Utf8),
            _ => None,
        }
    }

    /// Find the most specific common type that accommodates both types
    pub fn common_type(&self, other: &ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => *a,
            (Int64, Float64) | (Float64, Int64) => Float64,
            // Booleans mixed with anything else stay textual
            _ => Utf8,
        }
    }
}

/// Whether declared column names must match headers exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMatch {
    Exact,
    CaseInsensitive,
}

impl HeaderMatch {
    pub fn matches(&self, declared: &str, header: &str) -> bool {
        match self {
            HeaderMatch::Exact => declared == header,
            HeaderMatch::CaseInsensitive => declared.eq_ignore_ascii_case(header),
        }
    }
}

/// A declared column; `None` type means the loader infers it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: Option<ColumnType>,
}

impl ColumnSpec {
    pub fn typed(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type: Some(column_type),
        }
    }

    pub fn inferred(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: None,
        }
    }
}

/// Ordered list of declared columns for one table
///
/// An open schema only requires its columns to be present; a closed schema
/// must match the table column-for-column, in order.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub header_match: HeaderMatch,
    pub closed: bool,
}

impl TableSchema {
    /// Stats table as published; headers are matched case-insensitively
    /// because the cleaner lowercases them afterwards
    pub fn character_stats() -> Self {
        Self {
            name: "CharacterStats".to_string(),
            columns: vec![
                ColumnSpec::typed("name", ColumnType::Utf8),
                ColumnSpec::inferred("ki blast"),
                ColumnSpec::inferred("melee combat"),
                ColumnSpec::inferred("speed"),
                ColumnSpec::inferred("special attack"),
                ColumnSpec::inferred("transformation"),
            ],
            header_match: HeaderMatch::CaseInsensitive,
            closed: false,
        }
    }

    pub fn character_info() -> Self {
        Self {
            name: "CharacterInfo".to_string(),
            columns: [
                "name",
                "ki",
                "maxKi",
                "race",
                "gender",
                "description",
                "image",
                "affiliation",
            ]
            .iter()
            .map(|name| ColumnSpec::typed(name, ColumnType::Utf8))
            .collect(),
            header_match: HeaderMatch::Exact,
            closed: false,
        }
    }

    /// Joined table as persisted, after the space-to-underscore rename
    pub fn character_info_full() -> Self {
        let info = Self::character_info().columns;
        let stats = Self::character_stats()
            .columns
            .into_iter()
            .skip(1)
            .map(|spec| ColumnSpec {
                name: spec.name.replace(' ', "_"),
                column_type: spec.column_type,
            });

        Self {
            name: "CharacterInfoFull".to_string(),
            columns: info.into_iter().chain(stats).collect(),
            header_match: HeaderMatch::Exact,
            closed: true,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Declared type of the column a header maps to, if any
    pub fn declared_type(&self, header: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|spec| self.header_match.matches(&spec.name, header))
            .and_then(|spec| spec.column_type)
    }

    /// Check a table against this schema
    pub fn validate(&self, batch: &RecordBatch) -> Result<(), PipelineError> {
        let schema = batch.schema();
        let fields = schema.fields();
        let fail = |reason: String| PipelineError::schema_validation(&self.name, reason);

        if self.closed {
            let actual: Vec<&str> = fields.iter().map(|f| f.name().as_str()).collect();
            let matches = actual.len() == self.columns.len()
                && self
                    .columns
                    .iter()
                    .zip(&actual)
                    .all(|(spec, name)| self.header_match.matches(&spec.name, name));
            if !matches {
                return Err(fail(format!(
                    "expected columns {:?}, found {:?}",
                    self.column_names(),
                    actual
                )));
            }
        }

        for spec in &self.columns {
            let mut candidates = fields
                .iter()
                .filter(|f| self.header_match.matches(&spec.name, f.name()));

            let field = match (candidates.next(), candidates.next()) {
                (Some(field), None) => field,
                (None, _) => return Err(fail(format!("missing column '{}'", spec.name))),
                (Some(_), Some(_)) => {
                    return Err(fail(format!("column '{}' is ambiguous", spec.name)));
                }
            };

            if let Some(expected) = spec.column_type {
                let actual = ColumnType::from_data_type(field.data_type());
                if actual != Some(expected) {
                    return Err(fail(format!(
                        "column '{}' has type {}, expected {:?}",
                        field.name(),
                        field.data_type(),
                        expected
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Value-level type inference for delimited sources
pub struct TypeInferrer;

impl TypeInferrer {
    const TRUE_TOKENS: [&'static str; 3] = ["True", "TRUE", "true"];
    const FALSE_TOKENS: [&'static str; 3] = ["False", "FALSE", "false"];

    /// Infer the type of a single non-null value
    pub fn infer_value_type(value: &str) -> ColumnType {
        if Self::parse_bool(value).is_some() {
            return ColumnType::Boolean;
        }
        if value.parse::<i64>().is_ok() {
            return ColumnType::Int64;
        }
        if value.parse::<f64>().is_ok() {
            return ColumnType::Float64;
        }
        ColumnType::Utf8
    }

    /// Infer the type of a column from its values
    ///
    /// A column without any non-null value is numeric (all missing), and an
    /// integer column with missing values is read as floating point, matching
    /// how the source dataframe library reads such columns.
    pub fn infer_column_type<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> ColumnType {
        let mut has_null = false;
        let inferred = values
            .into_iter()
            .filter_map(|value| {
                has_null |= value.is_none();
                value
            })
            .map(Self::infer_value_type)
            .reduce(|acc, t| acc.common_type(&t));

        match inferred {
            Some(ColumnType::Int64) if has_null => ColumnType::Float64,
            Some(column_type) => column_type,
            None => ColumnType::Float64,
        }
    }

    pub fn parse_bool(value: &str) -> Option<bool> {
        if Self::TRUE_TOKENS.contains(&value) {
            Some(true)
        } else if Self::FALSE_TOKENS.contains(&value) {
            Some(false)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, a)| a).collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    fn strings(values: &[&str]) -> ArrayRef {
        Arc::new(StringArray::from(values.to_vec()))
    }

    #[test]
    fn test_infer_value_types() {
        assert_eq!(TypeInferrer::infer_value_type("90"), ColumnType::Int64);
        assert_eq!(TypeInferrer::infer_value_type("-3"), ColumnType::Int64);
        assert_eq!(TypeInferrer::infer_value_type("9.5"), ColumnType::Float64);
        assert_eq!(TypeInferrer::infer_value_type("1e6"), ColumnType::Float64);
        assert_eq!(TypeInferrer::infer_value_type("True"), ColumnType::Boolean);
        assert_eq!(TypeInferrer::infer_value_type("false"), ColumnType::Boolean);
        assert_eq!(TypeInferrer::infer_value_type("Saiyan"), ColumnType::Utf8);
        // Thousands separators are not numbers
        assert_eq!(TypeInferrer::infer_value_type("60.000.000"), ColumnType::Utf8);
        // 0/1 are integers, not booleans
        assert_eq!(TypeInferrer::infer_value_type("1"), ColumnType::Int64);
    }

    #[test]
    fn test_type_promotion() {
        assert_eq!(
            ColumnType::Int64.common_type(&ColumnType::Float64),
            ColumnType::Float64
        );
        assert_eq!(
            ColumnType::Boolean.common_type(&ColumnType::Int64),
            ColumnType::Utf8
        );
        assert_eq!(
            ColumnType::Float64.common_type(&ColumnType::Utf8),
            ColumnType::Utf8
        );
        assert_eq!(
            ColumnType::Boolean.common_type(&ColumnType::Boolean),
            ColumnType::Boolean
        );
    }

    #[test]
    fn test_infer_column_type() {
        let ints = [Some("1"), Some("20")];
        assert_eq!(TypeInferrer::infer_column_type(ints), ColumnType::Int64);

        // Missing values turn an integer column into floating point
        let sparse_ints = [Some("1"), None, Some("20")];
        assert_eq!(TypeInferrer::infer_column_type(sparse_ints), ColumnType::Float64);

        let sparse_text = [Some("Kamehameha"), None];
        assert_eq!(TypeInferrer::infer_column_type(sparse_text), ColumnType::Utf8);

        let mixed = [Some("1"), Some("2.5")];
        assert_eq!(TypeInferrer::infer_column_type(mixed), ColumnType::Float64);

        let text = [Some("1"), Some("Kamehameha")];
        assert_eq!(TypeInferrer::infer_column_type(text), ColumnType::Utf8);

        let empty: [Option<&str>; 2] = [None, None];
        assert_eq!(TypeInferrer::infer_column_type(empty), ColumnType::Float64);
    }

    #[test]
    fn test_delta_type_names() {
        for t in [
            ColumnType::Boolean,
            ColumnType::Int64,
            ColumnType::Float64,
            ColumnType::Utf8,
        ] {
            assert_eq!(ColumnType::from_delta_type_name(t.delta_type_name()), Some(t));
        }
        assert_eq!(ColumnType::from_delta_type_name("timestamp"), None);
    }

    #[test]
    fn test_full_schema_columns() {
        let full = TableSchema::character_info_full();
        assert_eq!(
            full.column_names(),
            vec![
                "name",
                "ki",
                "maxKi",
                "race",
                "gender",
                "description",
                "image",
                "affiliation",
                "ki_blast",
                "melee_combat",
                "speed",
                "special_attack",
                "transformation",
            ]
        );
        assert!(full.closed);
    }

    #[test]
    fn test_validate_case_insensitive_headers() {
        let table = batch(vec![
            ("Name", strings(&["Goku"])),
            ("Ki Blast", Arc::new(Int64Array::from(vec![90]))),
            ("Melee Combat", Arc::new(Int64Array::from(vec![95]))),
            ("Speed", Arc::new(Float64Array::from(vec![90.0]))),
            ("Special Attack", strings(&["Kamehameha"])),
            ("Transformation", strings(&["SSJ"])),
            ("Extra", strings(&["ignored"])),
        ]);
        TableSchema::character_stats().validate(&table).unwrap();
    }

    #[test]
    fn test_validate_missing_column() {
        let table = batch(vec![("name", strings(&["Goku"]))]);
        let err = TableSchema::character_stats().validate(&table).unwrap_err();
        assert!(err.to_string().contains("missing column 'ki blast'"));
        assert!(matches!(err, PipelineError::SchemaValidation { .. }));
    }

    #[test]
    fn test_validate_ambiguous_column() {
        let table = batch(vec![
            ("name", strings(&["goku"])),
            ("Name", strings(&["Goku"])),
        ]);
        let err = TableSchema::character_stats().validate(&table).unwrap_err();
        assert!(err.to_string().contains("column 'name' is ambiguous"));
    }

    #[test]
    fn test_validate_wrong_type() {
        let info = TableSchema::character_info();
        let columns: Vec<(&str, ArrayRef)> = info
            .columns
            .iter()
            .map(|spec| {
                let array: ArrayRef = if spec.name == "ki" {
                    Arc::new(Int64Array::from(vec![9000]))
                } else {
                    strings(&["x"])
                };
                (spec.name.as_str(), array)
            })
            .collect();

        let err = info.validate(&batch(columns)).unwrap_err();
        assert!(err.to_string().contains("column 'ki' has type Int64"));
    }

    #[test]
    fn test_validate_closed_schema_order() {
        let full = TableSchema::character_info_full();
        let mut columns: Vec<(&str, ArrayRef)> = full
            .columns
            .iter()
            .map(|spec| (spec.name.as_str(), strings(&["x"])))
            .collect();
        full.validate(&batch(columns.clone())).unwrap();

        columns.swap(0, 1);
        let err = full.validate(&batch(columns)).unwrap_err();
        assert!(err.to_string().contains("expected columns"));
    }
}
