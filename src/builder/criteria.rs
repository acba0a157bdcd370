//! Per-field constraint checks, applied as a chain of rules.

use crate::data::{to_f64, to_string};
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::Field;
use serde_json::Value;

pub trait FieldRule: Send + Sync {
    fn check(&self, name: &str, field: &Field, value: &Value) -> Result<()>;
}

/// Numeric `min`/`max` bounds.
#[derive(Debug, Clone, Default)]
pub struct RangeRule;

impl FieldRule for RangeRule {
    fn check(&self, name: &str, field: &Field, value: &Value) -> Result<()> {
        if !value.is_number() {
            return Ok(());
        }
        let Some(number) = to_f64(value) else {
            return Ok(());
        };
        if let Some(min) = field.min {
            if number < min as f64 {
                return Err(ApiError::field(
                    ErrorCode::MinLimitExceeded,
                    name,
                    format!("{} must be at least {}", name, min),
                ));
            }
        }
        if let Some(max) = field.max {
            if number > max as f64 {
                return Err(ApiError::field(
                    ErrorCode::MaxLimitExceeded,
                    name,
                    format!("{} must be at most {}", name, max),
                ));
            }
        }
        Ok(())
    }
}

/// String `minLength`/`maxLength` bounds, counted in characters.
#[derive(Debug, Clone, Default)]
pub struct LengthRule;

impl FieldRule for LengthRule {
    fn check(&self, name: &str, field: &Field, value: &Value) -> Result<()> {
        let Value::String(text) = value else {
            return Ok(());
        };
        let length = text.chars().count() as i64;
        if let Some(min) = field.min_length {
            if length < min {
                return Err(ApiError::field(
                    ErrorCode::MinLengthExceeded,
                    name,
                    format!("{} must be at least {} characters", name, min),
                ));
            }
        }
        if let Some(max) = field.max_length {
            if length > max {
                return Err(ApiError::field(
                    ErrorCode::MaxLengthExceeded,
                    name,
                    format!("{} must be at most {} characters", name, max),
                ));
            }
        }
        Ok(())
    }
}

/// Enum whitelist.
#[derive(Debug, Clone, Default)]
pub struct OptionsRule;

impl FieldRule for OptionsRule {
    fn check(&self, name: &str, field: &Field, value: &Value) -> Result<()> {
        if field.options.is_empty() {
            return Ok(());
        }
        let rendered = to_string(value);
        if field.options.iter().any(|option| option == &rendered) {
            Ok(())
        } else {
            Err(ApiError::field(
                ErrorCode::InvalidOption,
                name,
                format!("{} must be one of [{}]", name, field.options.join(", ")),
            ))
        }
    }
}

/// Allowed and forbidden character sets.
#[derive(Debug, Clone, Default)]
pub struct CharacterRule;

impl FieldRule for CharacterRule {
    fn check(&self, name: &str, field: &Field, value: &Value) -> Result<()> {
        let Value::String(text) = value else {
            return Ok(());
        };
        if !field.valid_chars.is_empty() && text.chars().any(|c| !field.valid_chars.contains(c)) {
            return Err(ApiError::field(
                ErrorCode::InvalidCharacters,
                name,
                format!("{} contains characters outside [{}]", name, field.valid_chars),
            ));
        }
        if !field.invalid_chars.is_empty() && text.chars().any(|c| field.invalid_chars.contains(c)) {
            return Err(ApiError::field(
                ErrorCode::InvalidCharacters,
                name,
                format!("{} contains forbidden characters [{}]", name, field.invalid_chars),
            ));
        }
        Ok(())
    }
}

/// The rule chain run on every accepted value.
pub struct FieldCriteria {
    rules: Vec<Box<dyn FieldRule>>,
}

impl Default for FieldCriteria {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(RangeRule),
                Box::new(LengthRule),
                Box::new(OptionsRule),
                Box::new(CharacterRule),
            ],
        }
    }
}

impl FieldCriteria {
    pub fn check(&self, name: &str, field: &Field, value: &Value) -> Result<()> {
        if value.is_null() {
            if field.nullable {
                return Ok(());
            }
            return Err(ApiError::field(
                ErrorCode::NotNullable,
                name,
                format!("{} can not be null", name),
            ));
        }
        for rule in &self.rules {
            rule.check(name, field, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(result: Result<()>) -> Option<ErrorCode> {
        result.err().map(|e| e.code)
    }

    #[test]
    fn null_requires_nullable() {
        let criteria = FieldCriteria::default();
        let field = Field::new("string");
        assert_eq!(code(criteria.check("a", &field, &Value::Null)), Some(ErrorCode::NotNullable));
        assert!(criteria.check("a", &field.nullable(), &Value::Null).is_ok());
    }

    #[test]
    fn numeric_and_length_bounds() {
        let criteria = FieldCriteria::default();
        let number = Field::new("int").with_range(Some(1), Some(10));
        assert_eq!(code(criteria.check("n", &number, &json!(0))), Some(ErrorCode::MinLimitExceeded));
        assert_eq!(code(criteria.check("n", &number, &json!(11))), Some(ErrorCode::MaxLimitExceeded));
        assert!(criteria.check("n", &number, &json!(10)).is_ok());

        let text = Field::new("string").with_length(Some(2), Some(3));
        assert_eq!(code(criteria.check("s", &text, &json!("a"))), Some(ErrorCode::MinLengthExceeded));
        assert_eq!(code(criteria.check("s", &text, &json!("abcd"))), Some(ErrorCode::MaxLengthExceeded));
        assert!(criteria.check("s", &text, &json!("äö")).is_ok());
    }

    #[test]
    fn options_and_characters() {
        let criteria = FieldCriteria::default();
        let color = Field::new("enum").with_options(["red", "blue"]);
        let err = criteria.check("color", &color, &json!("green")).expect_err("invalid option");
        assert_eq!(err.code, ErrorCode::InvalidOption);
        assert_eq!(err.field_name.as_deref(), Some("color"));

        let digits = Field::new("string").with_valid_chars("0123456789");
        assert_eq!(code(criteria.check("d", &digits, &json!("12a"))), Some(ErrorCode::InvalidCharacters));
        let no_spaces = Field::new("string").with_invalid_chars(" ");
        assert_eq!(code(criteria.check("s", &no_spaces, &json!("a b"))), Some(ErrorCode::InvalidCharacters));
    }
}
