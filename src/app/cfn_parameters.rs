//! Template parameters and mapping tables.
//!
//! Parameters are the typed inputs of a template. Each [`ParameterDef`] can carry
//! constraints (allowed values, a pattern, length or numeric bounds) and the
//! registry refuses a declaration whose own `Default` would violate them.
//!
//! Mappings are static two-level lookup tables read with `Fn::FindInMap`. Every
//! top-level entry of a [`MappingTable`] must expose the same set of sub-keys so
//! that a lookup with a deploy-time key is well-formed for any key.
//!
//! Lookups never fail: a missing name yields `None`, which the resolver turns
//! into a diagnostic during the compile pass.

use std::fmt;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::app::cfn_errors::DeclarationError;

/// AWS pseudo parameters, always available to `Ref` without a declaration.
pub const PSEUDO_PARAMETERS: &[&str] = &[
    "AWS::AccountId",
    "AWS::NotificationARNs",
    "AWS::NoValue",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackId",
    "AWS::StackName",
    "AWS::URLSuffix",
];

pub fn is_pseudo_parameter(name: &str) -> bool {
    PSEUDO_PARAMETERS.contains(&name)
}

/// Parameter value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    String,
    Number,
    CommaDelimitedList,
}

/// The individual constraint check a parameter declaration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintCheck {
    /// MinLength is greater than MaxLength.
    LengthBounds,
    /// MinValue is greater than MaxValue.
    ValueBounds,
    /// AllowedPattern is not a valid regular expression.
    PatternSyntax,
    MinLength,
    MaxLength,
    AllowedValues,
    AllowedPattern,
    /// Default of a Number parameter is not numeric.
    NumericDefault,
    MinValue,
    MaxValue,
}

impl fmt::Display for ConstraintCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintCheck::LengthBounds => "LengthBounds",
            ConstraintCheck::ValueBounds => "ValueBounds",
            ConstraintCheck::PatternSyntax => "PatternSyntax",
            ConstraintCheck::MinLength => "MinLength",
            ConstraintCheck::MaxLength => "MaxLength",
            ConstraintCheck::AllowedValues => "AllowedValues",
            ConstraintCheck::AllowedPattern => "AllowedPattern",
            ConstraintCheck::NumericDefault => "NumericDefault",
            ConstraintCheck::MinValue => "MinValue",
            ConstraintCheck::MaxValue => "MaxValue",
        };
        f.write_str(name)
    }
}

/// A template parameter declaration.
///
/// Serializes to the CloudFormation `Parameters` entry shape; the name is the
/// section key and is not part of the entry itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterDef {
    #[serde(skip)]
    pub name: String,

    #[serde(rename = "Type")]
    pub parameter_type: ParameterType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_scalar_string"
    )]
    pub default: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_scalar_strings"
    )]
    pub allowed_values: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_pattern: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            description: None,
            default: None,
            allowed_values: Vec::new(),
            allowed_pattern: None,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            constraint_description: None,
            no_echo: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Number)
    }

    pub fn comma_delimited_list(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::CommaDelimitedList)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_pattern = Some(pattern.into());
        self
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_min_value(mut self, min_value: f64) -> Self {
        self.min_value = Some(min_value);
        self
    }

    pub fn with_max_value(mut self, max_value: f64) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn with_constraint_description(mut self, description: impl Into<String>) -> Self {
        self.constraint_description = Some(description.into());
        self
    }

    pub fn with_no_echo(mut self, no_echo: bool) -> Self {
        self.no_echo = Some(no_echo);
        self
    }

    /// Check the declaration's own consistency, then its default against it.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(self.constraint_error(
                    ConstraintCheck::LengthBounds,
                    format!("MinLength {} is greater than MaxLength {}", min, max),
                ));
            }
        }

        // JSON has no NaN or infinity, so such a bound cannot be written out
        for (name, bound) in [("MinValue", self.min_value), ("MaxValue", self.max_value)] {
            if let Some(bound) = bound.filter(|b| !b.is_finite()) {
                return Err(self.constraint_error(
                    ConstraintCheck::ValueBounds,
                    format!("{} {} is not a finite number", name, bound),
                ));
            }
        }

        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                return Err(self.constraint_error(
                    ConstraintCheck::ValueBounds,
                    format!("MinValue {} is greater than MaxValue {}", min, max),
                ));
            }
        }

        let pattern = match &self.allowed_pattern {
            Some(pattern) => Some(Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                self.constraint_error(
                    ConstraintCheck::PatternSyntax,
                    format!("AllowedPattern '{}' is not a valid expression: {}", pattern, e),
                )
            })?),
            None => None,
        };

        let Some(default) = &self.default else {
            return Ok(());
        };

        match self.parameter_type {
            ParameterType::CommaDelimitedList => {
                for item in default.split(',') {
                    self.check_value(item.trim(), pattern.as_ref())?;
                }
                Ok(())
            }
            _ => self.check_value(default, pattern.as_ref()),
        }
    }

    fn check_value(&self, value: &str, pattern: Option<&Regex>) -> Result<(), DeclarationError> {
        let length = value.chars().count();

        if let Some(min) = self.min_length {
            if length < min {
                return Err(self.constraint_error(
                    ConstraintCheck::MinLength,
                    format!(
                        "Default '{}' has length {}, shorter than MinLength {}",
                        value, length, min
                    ),
                ));
            }
        }

        if let Some(max) = self.max_length {
            if length > max {
                return Err(self.constraint_error(
                    ConstraintCheck::MaxLength,
                    format!(
                        "Default '{}' has length {}, longer than MaxLength {}",
                        value, length, max
                    ),
                ));
            }
        }

        if !self.allowed_values.is_empty() && !self.allowed_values.iter().any(|v| v == value) {
            return Err(self.constraint_error(
                ConstraintCheck::AllowedValues,
                format!(
                    "Default '{}' is not one of [{}]",
                    value,
                    self.allowed_values.join(", ")
                ),
            ));
        }

        if let Some(regex) = pattern {
            if !regex.is_match(value) {
                return Err(self.constraint_error(
                    ConstraintCheck::AllowedPattern,
                    format!(
                        "Default '{}' does not match AllowedPattern '{}'",
                        value,
                        self.allowed_pattern.as_deref().unwrap_or_default()
                    ),
                ));
            }
        }

        if self.parameter_type == ParameterType::Number {
            let number: f64 = value.trim().parse().map_err(|_| {
                self.constraint_error(
                    ConstraintCheck::NumericDefault,
                    format!("Default '{}' is not a number", value),
                )
            })?;

            if let Some(min) = self.min_value {
                if number < min {
                    return Err(self.constraint_error(
                        ConstraintCheck::MinValue,
                        format!("Default {} is less than MinValue {}", number, min),
                    ));
                }
            }

            if let Some(max) = self.max_value {
                if number > max {
                    return Err(self.constraint_error(
                        ConstraintCheck::MaxValue,
                        format!("Default {} is greater than MaxValue {}", number, max),
                    ));
                }
            }
        }

        Ok(())
    }

    fn constraint_error(&self, check: ConstraintCheck, detail: String) -> DeclarationError {
        DeclarationError::InvalidParameterConstraint {
            parameter: self.name.clone(),
            check,
            detail,
        }
    }
}

/// Accept `"443"` and `443` alike for scalar parameter fields.
fn scalar_to_string(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("Expected a string or number, found {}", other)),
    }
}

fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_scalar_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .into_iter()
        .map(|v| scalar_to_string(v).map_err(serde::de::Error::custom))
        .collect()
}

/// A scalar stored in a mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    List(Vec<String>),
}

impl From<&str> for MappingValue {
    fn from(value: &str) -> Self {
        MappingValue::String(value.to_string())
    }
}

impl From<String> for MappingValue {
    fn from(value: String) -> Self {
        MappingValue::String(value)
    }
}

impl From<i64> for MappingValue {
    fn from(value: i64) -> Self {
        MappingValue::Integer(value)
    }
}

impl From<bool> for MappingValue {
    fn from(value: bool) -> Self {
        MappingValue::Boolean(value)
    }
}

/// Two-level lookup table: top-level key, then sub-key, then value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable {
    entries: IndexMap<String, IndexMap<String, MappingValue>>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level entry with its sub-keys.
    pub fn with_entry<K, I, S, V>(mut self, top_key: K, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<MappingValue>,
    {
        let entry = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.entries.insert(top_key.into(), entry);
        self
    }

    pub fn entries(&self) -> &IndexMap<String, IndexMap<String, MappingValue>> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_top_key(&self, top_key: &str) -> bool {
        self.entries.contains_key(top_key)
    }

    /// Sub-keys shared by every entry (the table is uniform once declared).
    pub fn sub_keys(&self) -> Vec<&str> {
        self.entries
            .values()
            .next()
            .map(|entry| entry.keys().map(|k| k.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn contains_sub_key(&self, sub_key: &str) -> bool {
        self.entries
            .values()
            .next()
            .map(|entry| entry.contains_key(sub_key))
            .unwrap_or(false)
    }

    pub fn lookup(&self, top_key: &str, sub_key: &str) -> Option<&MappingValue> {
        self.entries.get(top_key).and_then(|entry| entry.get(sub_key))
    }

    fn validate(&self, name: &str) -> Result<(), DeclarationError> {
        let Some((_, first)) = self.entries.first() else {
            return Err(DeclarationError::EmptyMapping(name.to_string()));
        };
        if first.is_empty() {
            return Err(DeclarationError::EmptyMapping(name.to_string()));
        }

        let mut expected: Vec<String> = first.keys().cloned().collect();
        expected.sort();

        for (top_key, entry) in &self.entries {
            let mut found: Vec<String> = entry.keys().cloned().collect();
            found.sort();
            if found != expected {
                return Err(DeclarationError::InconsistentMappingShape {
                    mapping: name.to_string(),
                    top_key: top_key.clone(),
                    expected,
                    found,
                });
            }
        }

        Ok(())
    }
}

/// Declared parameters and mappings of one template.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    parameters: IndexMap<String, ParameterDef>,
    mappings: IndexMap<String, MappingTable>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_parameter(&mut self, parameter: ParameterDef) -> Result<(), DeclarationError> {
        if self.parameters.contains_key(&parameter.name) {
            return Err(DeclarationError::DuplicateParameterName(parameter.name));
        }
        parameter.validate()?;

        log_debug!(
            "Declared parameter {} ({:?})",
            parameter.name,
            parameter.parameter_type
        );
        self.parameters.insert(parameter.name.clone(), parameter);
        Ok(())
    }

    pub fn declare_mapping(
        &mut self,
        name: impl Into<String>,
        table: MappingTable,
    ) -> Result<(), DeclarationError> {
        let name = name.into();
        if self.mappings.contains_key(&name) {
            return Err(DeclarationError::DuplicateMappingName(name));
        }
        table.validate(&name)?;

        log_debug!("Declared mapping {} ({} entries)", name, table.entries.len());
        self.mappings.insert(name, table);
        Ok(())
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.get(name)
    }

    pub fn mapping(&self, name: &str) -> Option<&MappingTable> {
        self.mappings.get(name)
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.values()
    }

    pub fn mappings(&self) -> impl Iterator<Item = (&str, &MappingTable)> {
        self.mappings.iter().map(|(k, v)| (k.as_str(), v))
    }
}
