//! Feature validation
//!
//! Checks shape, type and range of an untrusted JSON value against the fixed
//! 9-attribute schema. Elements are scanned in ascending index order and the
//! first violation wins.

use crate::error::ValidationError;
use crate::types::{FeatureSchema, FeatureVector, FEATURE_COUNT};
use serde_json::Value;

/// Validator bound to a value range
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureValidator {
    schema: FeatureSchema,
}

impl FeatureValidator {
    /// Create validator for a schema
    #[inline]
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    /// Schema in use
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Validate raw input into a feature vector
    ///
    /// # Errors
    /// - `NotASequence` if `input` is not an array
    /// - `WrongLength` if it does not hold exactly 9 elements
    /// - `NotNumeric` / `OutOfRange` for the first offending element
    pub fn validate(&self, input: &Value) -> Result<FeatureVector, ValidationError> {
        let items = input.as_array().ok_or(ValidationError::NotASequence)?;

        if items.len() != FEATURE_COUNT {
            return Err(ValidationError::WrongLength {
                expected: FEATURE_COUNT,
                actual: items.len(),
            });
        }

        let mut values = [0.0; FEATURE_COUNT];
        for (index, item) in items.iter().enumerate() {
            let attribute = FeatureSchema::attribute(index);
            let value = item
                .as_f64()
                .ok_or(ValidationError::NotNumeric { index, attribute })?;

            if !self.schema.contains(value) {
                return Err(ValidationError::OutOfRange {
                    index,
                    attribute,
                    min: self.schema.min,
                    max: self.schema.max,
                });
            }
            values[index] = value;
        }

        Ok(FeatureVector::from_array(values))
    }
}

/// Validate against the default [1, 10] schema
///
/// # Errors
/// See [`FeatureValidator::validate`].
#[inline]
pub fn validate(input: &Value) -> Result<FeatureVector, ValidationError> {
    FeatureValidator::default().validate(input)
}
