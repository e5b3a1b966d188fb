//! Field validation against an object schema.
//!
//! Mirrors the platform's REST behaviour: every violation is collected,
//! nothing fails fast, and fields the schema does not know are accepted.
//! Per-field checks are a chain of [`FieldRule`]s applied in order.

use crate::core::{ErrorCode, FieldDef, Record, Schema, ValidationError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

/// Outcome of one rule for one field.
pub enum RuleOutcome {
    Pass,
    Violation(ValidationError),
    /// Report the violation and skip the remaining rules for this field.
    Halt(ValidationError),
}

/// One link in the per-field rule chain.
pub trait FieldRule: Send + Sync {
    fn check(&self, name: &str, def: &FieldDef, value: &Value, mode: ValidationMode) -> RuleOutcome;
}

/// Read-only fields cannot be written by the operation in progress.
#[derive(Debug, Clone, Default)]
pub struct AccessRule;

impl FieldRule for AccessRule {
    fn check(&self, name: &str, def: &FieldDef, _value: &Value, mode: ValidationMode) -> RuleOutcome {
        let writable = match mode {
            ValidationMode::Create => def.createable,
            ValidationMode::Update => def.updateable,
        };
        if writable {
            return RuleOutcome::Pass;
        }
        RuleOutcome::Halt(ValidationError::new(
            ErrorCode::InvalidFieldForInsertUpdate,
            name,
            format!(
                "Unable to create/update fields: {}. Please check the security settings of this field.",
                name
            ),
        ))
    }
}

/// Restricted picklists accept only declared values.
#[derive(Debug, Clone, Default)]
pub struct PicklistRule;

impl FieldRule for PicklistRule {
    fn check(&self, name: &str, def: &FieldDef, value: &Value, _mode: ValidationMode) -> RuleOutcome {
        if !def.is_restricted_picklist() || value.is_null() {
            return RuleOutcome::Pass;
        }
        let allowed = value
            .as_str()
            .is_some_and(|s| def.values.iter().any(|v| v == s));
        if allowed {
            return RuleOutcome::Pass;
        }
        RuleOutcome::Violation(ValidationError::new(
            ErrorCode::InvalidOrNullForRestrictedPicklist,
            name,
            format!("{}: bad value for restricted picklist field: {}", name, value),
        ))
    }
}

/// Text values may not exceed the field's `maxLength`, counted in characters.
#[derive(Debug, Clone, Default)]
pub struct MaxLengthRule;

impl FieldRule for MaxLengthRule {
    fn check(&self, name: &str, def: &FieldDef, value: &Value, _mode: ValidationMode) -> RuleOutcome {
        let (Some(max), Some(text)) = (def.max_length, value.as_str()) else {
            return RuleOutcome::Pass;
        };
        if max == 0 || text.chars().count() <= max {
            return RuleOutcome::Pass;
        }
        let head: String = text.chars().take(50).collect();
        RuleOutcome::Violation(ValidationError::new(
            ErrorCode::StringTooLong,
            name,
            format!("{}: data value too large: {}... (max length={})", name, head, max),
        ))
    }
}

pub struct FieldValidator {
    rules: Vec<Box<dyn FieldRule>>,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(AccessRule),
                Box::new(PicklistRule),
                Box::new(MaxLengthRule),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn FieldRule>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, fields: &Record, schema: &Schema, mode: ValidationMode) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if mode == ValidationMode::Create {
            for (name, def) in schema.fields() {
                if def.required && fields.get(name).is_none_or(Value::is_blank) {
                    errors.push(ValidationError::new(
                        ErrorCode::RequiredFieldMissing,
                        name.as_str(),
                        format!("Required fields are missing: [{}]", name),
                    ));
                }
            }
        }

        for (name, value) in fields.iter() {
            let Some(def) = schema.field(name) else {
                continue;
            };
            if value.is_null() && !def.required {
                continue;
            }
            for rule in &self.rules {
                match rule.check(name, def, value, mode) {
                    RuleOutcome::Pass => {}
                    RuleOutcome::Violation(err) => errors.push(err),
                    RuleOutcome::Halt(err) => {
                        errors.push(err);
                        break;
                    }
                }
            }
        }

        errors
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate with the default rule chain.
pub fn validate(fields: &Record, schema: &Schema, mode: ValidationMode) -> Vec<ValidationError> {
    FieldValidator::new().validate(fields, schema, mode)
}
