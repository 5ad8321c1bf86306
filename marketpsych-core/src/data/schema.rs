use super::table::{is_text_column, ASSET_CODE, TIMESTAMP};
use polars::prelude::*;

/// Columns every assembled RMA frame must carry.
pub struct RmaSchema;

impl RmaSchema {
    /// The required part of the schema. Score columns vary by asset class
    /// and are checked separately.
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new(ASSET_CODE.into(), DataType::String),
            Field::new(TIMESTAMP.into(), DataType::Datetime(TimeUnit::Milliseconds, None)),
        ])
    }

    /// Validate a frame: required columns present with the right type,
    /// every non-identifier column numeric.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        for (name, dtype) in actual.iter() {
            if !is_text_column(name.as_str()) && dtype != &DataType::Float64 {
                return Err(SchemaError::TypeMismatch {
                    column: name.to_string(),
                    expected: DataType::Float64,
                    actual: dtype.clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
