//! Input port and parameter definitions.
//!
//! Parameters carry their constraints so invalid values are rejected when
//! they are set, never at execution time.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::types::{Value, ValueType};
use serde::{Deserialize, Serialize};

/// Definition of one input or output of a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDefinition {
    /// Unique name within the node
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Description for documentation
    pub description: String,
}

impl PortDefinition {
    /// Create a new port definition.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name_to_display(&name),
            name,
            description: String::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Definition of a filter parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// Unique name within the node
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Type of the parameter
    pub value_type: ValueType,
    /// Default value
    pub default_value: Value,
    /// Description for documentation
    pub description: String,
    /// Constraints checked at set time
    pub constraints: Vec<Constraint>,
}

/// Constraints that can be applied to parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Constraint {
    /// Numeric value must be within range [min, max]
    Range { min: f64, max: f64 },
    /// Numeric value must be >= min
    MinValue(f64),
    /// Numeric value must be <= max
    MaxValue(f64),
    /// Numeric value (or every element) must be > 0
    Positive,
    /// Numeric value (or every element) must be >= 0
    NonNegative,
    /// String must be one of the listed options
    OneOf(Vec<String>),
    /// String/array must not be empty
    NotEmpty,
}

impl ParameterDefinition {
    /// Create a new parameter definition.
    pub fn new(name: impl Into<String>, value_type: ValueType, default_value: Value) -> Self {
        let name = name.into();
        Self {
            display_name: name_to_display(&name),
            name,
            value_type,
            default_value,
            description: String::new(),
            constraints: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a range constraint.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.constraints.push(Constraint::Range { min, max });
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Validate a value against this parameter's type and constraints.
    pub fn validate(&self, value: &Value) -> PipelineResult<()> {
        if !self.value_type.matches(value) {
            return Err(PipelineError::configuration(
                &self.name,
                format!("expected {}, got {}", self.value_type, value.value_type()),
            ));
        }

        for constraint in &self.constraints {
            constraint
                .validate(value)
                .map_err(|reason| PipelineError::configuration(&self.name, reason))?;
        }

        Ok(())
    }
}

impl Constraint {
    /// Validate a value against this constraint.
    ///
    /// Arrays are checked element-wise for numeric constraints.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if let (Value::Array(items), true) = (value, self.is_numeric()) {
            return items.iter().try_for_each(|item| self.validate(item));
        }

        match self {
            Constraint::Range { min, max } => {
                if let Some(num) = value.as_float() {
                    if num < *min || num > *max {
                        return Err(format!("value {} is out of range [{}, {}]", num, min, max));
                    }
                }
            }

            Constraint::MinValue(min) => {
                if let Some(num) = value.as_float() {
                    if num < *min {
                        return Err(format!("value {} is below minimum {}", num, min));
                    }
                }
            }

            Constraint::MaxValue(max) => {
                if let Some(num) = value.as_float() {
                    if num > *max {
                        return Err(format!("value {} is above maximum {}", num, max));
                    }
                }
            }

            Constraint::Positive => {
                if let Some(num) = value.as_float() {
                    if num <= 0.0 {
                        return Err(format!("value {} must be positive", num));
                    }
                }
            }

            Constraint::NonNegative => {
                if let Some(num) = value.as_float() {
                    if num < 0.0 {
                        return Err(format!("value {} must be non-negative", num));
                    }
                }
            }

            Constraint::OneOf(options) => {
                if let Some(s) = value.as_string() {
                    if !options.iter().any(|o| o == s) {
                        return Err(format!("'{}' is not one of {:?}", s, options));
                    }
                }
            }

            Constraint::NotEmpty => {
                let is_empty = match value {
                    Value::String(s) => s.is_empty(),
                    Value::Array(arr) => arr.is_empty(),
                    _ => false,
                };
                if is_empty {
                    return Err("value cannot be empty".to_string());
                }
            }
        }

        Ok(())
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Constraint::OneOf(_) | Constraint::NotEmpty)
    }

    /// Get a human-readable description of this constraint.
    pub fn description(&self) -> String {
        match self {
            Constraint::Range { min, max } => format!("between {} and {}", min, max),
            Constraint::MinValue(min) => format!("at least {}", min),
            Constraint::MaxValue(max) => format!("at most {}", max),
            Constraint::Positive => "positive".to_string(),
            Constraint::NonNegative => "non-negative".to_string(),
            Constraint::OneOf(options) => format!("one of {}", options.join("|")),
            Constraint::NotEmpty => "not empty".to_string(),
        }
    }
}

/// Convert snake_case name to Title Case display name.
fn name_to_display(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_validation() {
        let param = ParameterDefinition::new("alpha", ValueType::Float, Value::Float(1.0))
            .with_range(0.0, 1.0);
        assert!(param.validate(&Value::Float(0.25)).is_ok());
        assert!(param.validate(&Value::Integer(1)).is_ok());

        let err = param.validate(&Value::String("x".into())).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
        assert!(param.validate(&Value::Float(1.5)).is_err());
    }

    #[test]
    fn test_array_constraints() {
        let param = ParameterDefinition::new(
            "radius",
            ValueType::Array(Box::new(ValueType::Integer)),
            Value::Array(vec![Value::Integer(1), Value::Integer(1)]),
        )
        .with_constraint(Constraint::NonNegative);

        assert!(param
            .validate(&Value::Array(vec![Value::Integer(0), Value::Integer(2)]))
            .is_ok());
        assert!(param
            .validate(&Value::Array(vec![Value::Integer(1), Value::Integer(-1)]))
            .is_err());
    }

    #[test]
    fn test_one_of() {
        let c = Constraint::OneOf(vec!["clip".into(), "mirror".into()]);
        assert!(c.validate(&Value::String("mirror".into())).is_ok());
        assert!(c.validate(&Value::String("wrap".into())).is_err());
    }

    #[test]
    fn test_name_to_display() {
        assert_eq!(name_to_display("lower_bound"), "Lower Bound");
        assert_eq!(name_to_display("alpha"), "Alpha");
    }
}
