//! CloudFormation intrinsic functions as a closed expression algebra.
//!
//! Every property value, condition and output value in a template is an
//! [`Expression`]: either a literal or one of a fixed set of intrinsic functions.
//! Expressions render to the canonical JSON object form (`{"Ref": "MyVpc"}`,
//! `{"Fn::Join": ["", [...]]}`) and parse back to a structurally equal tree.
//!
//! `Ref` is the one function whose JSON form does not say what it points at: the
//! same `{"Ref": "X"}` names a parameter or a resource. Parsing therefore takes a
//! classifier that tells resource logical ids apart from parameter names.

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::app::cfn_schema::ValueKind;

/// Represents the type of CloudFormation intrinsic function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicFunctionType {
    /// Simple reference: {"Ref": "ResourceName"} or !Ref ResourceName
    Ref,
    /// Get attribute: {"Fn::GetAtt": ["Resource", "Attribute"]}
    GetAtt,
    /// Find in map: {"Fn::FindInMap": ["Map", "Key1", "Key2"]}
    FindInMap,
    /// Join array elements: {"Fn::Join": [",", ["a", "b"]]}
    Join,
    /// Select from array: {"Fn::Select": [0, array]}
    Select,
    /// String substitution: {"Fn::Sub": "text ${var}"} or {"Fn::Sub": ["text ${var}", {...}]}
    Sub,
    /// Condition reference: {"Condition": "ConditionName"}
    Condition,
    /// If condition: {"Fn::If": ["ConditionName", "TrueValue", "FalseValue"]}
    If,
    /// Get availability zones: {"Fn::GetAZs": "region"}
    GetAZs,
    /// Base64 encode: {"Fn::Base64": "text"}
    Base64,
    /// Equals condition: {"Fn::Equals": [value1, value2]}
    Equals,
    /// And condition: {"Fn::And": [condition1, condition2]}
    And,
    /// Or condition: {"Fn::Or": [condition1, condition2]}
    Or,
    /// Not condition: {"Fn::Not": \[condition\]}
    Not,
}

impl IntrinsicFunctionType {
    pub const ALL: [IntrinsicFunctionType; 14] = [
        IntrinsicFunctionType::Ref,
        IntrinsicFunctionType::GetAtt,
        IntrinsicFunctionType::FindInMap,
        IntrinsicFunctionType::Join,
        IntrinsicFunctionType::Select,
        IntrinsicFunctionType::Sub,
        IntrinsicFunctionType::Condition,
        IntrinsicFunctionType::If,
        IntrinsicFunctionType::GetAZs,
        IntrinsicFunctionType::Base64,
        IntrinsicFunctionType::Equals,
        IntrinsicFunctionType::And,
        IntrinsicFunctionType::Or,
        IntrinsicFunctionType::Not,
    ];

    /// Get the JSON function name for this intrinsic function
    pub fn json_name(&self) -> &'static str {
        match self {
            IntrinsicFunctionType::Ref => "Ref",
            IntrinsicFunctionType::GetAtt => "Fn::GetAtt",
            IntrinsicFunctionType::FindInMap => "Fn::FindInMap",
            IntrinsicFunctionType::Join => "Fn::Join",
            IntrinsicFunctionType::Select => "Fn::Select",
            IntrinsicFunctionType::Sub => "Fn::Sub",
            IntrinsicFunctionType::Condition => "Condition",
            IntrinsicFunctionType::If => "Fn::If",
            IntrinsicFunctionType::GetAZs => "Fn::GetAZs",
            IntrinsicFunctionType::Base64 => "Fn::Base64",
            IntrinsicFunctionType::Equals => "Fn::Equals",
            IntrinsicFunctionType::And => "Fn::And",
            IntrinsicFunctionType::Or => "Fn::Or",
            IntrinsicFunctionType::Not => "Fn::Not",
        }
    }

    pub fn from_json_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.json_name() == name)
    }
}

/// Detect if a JSON value is an intrinsic function call.
///
/// Only single-key objects whose key is a known function name qualify; any
/// other object is a plain map literal.
pub fn detect_intrinsic_function(value: &Value) -> Option<IntrinsicFunctionType> {
    match value {
        Value::Object(obj) if obj.len() == 1 => obj
            .keys()
            .next()
            .and_then(|k| IntrinsicFunctionType::from_json_name(k)),
        _ => None,
    }
}

static SUB_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]*)\}").unwrap_or_else(|e| panic!("invalid placeholder regex: {}", e))
});

/// Placeholder names in an `Fn::Sub` template, in order of appearance.
///
/// `${!Literal}` escapes are skipped.
pub fn sub_placeholders(template: &str) -> Vec<&str> {
    SUB_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !name.starts_with('!'))
        .collect()
}

/// Literal values. Lists and maps may nest further expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Boolean(bool),
    Integer(i64),
    List(Vec<Expression>),
    Map(IndexMap<String, Expression>),
}

impl Literal {
    pub fn kind(&self) -> ValueKind {
        match self {
            Literal::String(_) => ValueKind::String,
            Literal::Boolean(_) => ValueKind::Boolean,
            Literal::Integer(_) => ValueKind::Integer,
            Literal::List(_) => ValueKind::List,
            Literal::Map(_) => ValueKind::Map,
        }
    }
}

/// A property value, condition or output value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    ParamRef(String),
    ResourceRef(String),
    AttributeRef {
        logical_id: String,
        attribute: String,
    },
    MapLookup {
        map: String,
        key: Box<Expression>,
        sub_key: Box<Expression>,
    },
    Join {
        delimiter: String,
        values: Vec<Expression>,
    },
    Select {
        index: Box<Expression>,
        list: Box<Expression>,
    },
    Substitute {
        template: String,
        variables: IndexMap<String, Expression>,
    },
    ConditionRef(String),
    If {
        condition: String,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    RegionAZs(Box<Expression>),
    Base64(Box<Expression>),
    Equals(Box<Expression>, Box<Expression>),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    pub fn list(values: Vec<Expression>) -> Self {
        Expression::Literal(Literal::List(values))
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Expression)>,
        K: Into<String>,
    {
        Expression::Literal(Literal::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn param_ref(name: impl Into<String>) -> Self {
        Expression::ParamRef(name.into())
    }

    pub fn resource_ref(logical_id: impl Into<String>) -> Self {
        Expression::ResourceRef(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Expression::AttributeRef {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    pub fn find_in_map(map: impl Into<String>, key: Expression, sub_key: Expression) -> Self {
        Expression::MapLookup {
            map: map.into(),
            key: Box::new(key),
            sub_key: Box::new(sub_key),
        }
    }

    pub fn join(delimiter: impl Into<String>, values: Vec<Expression>) -> Self {
        Expression::Join {
            delimiter: delimiter.into(),
            values,
        }
    }

    pub fn select(index: Expression, list: Expression) -> Self {
        Expression::Select {
            index: Box::new(index),
            list: Box::new(list),
        }
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Expression::Substitute {
            template: template.into(),
            variables: IndexMap::new(),
        }
    }

    pub fn sub_with<I, K>(template: impl Into<String>, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, Expression)>,
        K: Into<String>,
    {
        Expression::Substitute {
            template: template.into(),
            variables: variables.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn condition(name: impl Into<String>) -> Self {
        Expression::ConditionRef(name.into())
    }

    pub fn if_(condition: impl Into<String>, then: Expression, otherwise: Expression) -> Self {
        Expression::If {
            condition: condition.into(),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn get_azs(region: Expression) -> Self {
        Expression::RegionAZs(Box::new(region))
    }

    pub fn base64(value: Expression) -> Self {
        Expression::Base64(Box::new(value))
    }

    pub fn equals(left: Expression, right: Expression) -> Self {
        Expression::Equals(Box::new(left), Box::new(right))
    }

    pub fn and(conditions: Vec<Expression>) -> Self {
        Expression::And(conditions)
    }

    pub fn or(conditions: Vec<Expression>) -> Self {
        Expression::Or(conditions)
    }

    pub fn not(condition: Expression) -> Self {
        Expression::Not(Box::new(condition))
    }

    /// The intrinsic function this expression is, or `None` for literals.
    pub fn function_type(&self) -> Option<IntrinsicFunctionType> {
        let function = match self {
            Expression::Literal(_) => return None,
            Expression::ParamRef(_) | Expression::ResourceRef(_) => IntrinsicFunctionType::Ref,
            Expression::AttributeRef { .. } => IntrinsicFunctionType::GetAtt,
            Expression::MapLookup { .. } => IntrinsicFunctionType::FindInMap,
            Expression::Join { .. } => IntrinsicFunctionType::Join,
            Expression::Select { .. } => IntrinsicFunctionType::Select,
            Expression::Substitute { .. } => IntrinsicFunctionType::Sub,
            Expression::ConditionRef(_) => IntrinsicFunctionType::Condition,
            Expression::If { .. } => IntrinsicFunctionType::If,
            Expression::RegionAZs(_) => IntrinsicFunctionType::GetAZs,
            Expression::Base64(_) => IntrinsicFunctionType::Base64,
            Expression::Equals(..) => IntrinsicFunctionType::Equals,
            Expression::And(_) => IntrinsicFunctionType::And,
            Expression::Or(_) => IntrinsicFunctionType::Or,
            Expression::Not(_) => IntrinsicFunctionType::Not,
        };
        Some(function)
    }

    /// Kind of a literal value; intrinsic functions have no static kind.
    pub fn literal_kind(&self) -> Option<ValueKind> {
        match self {
            Expression::Literal(literal) => Some(literal.kind()),
            _ => None,
        }
    }

    /// Direct sub-expressions, in operand order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(Literal::List(items)) => items.iter().collect(),
            Expression::Literal(Literal::Map(entries)) => entries.values().collect(),
            Expression::Literal(_)
            | Expression::ParamRef(_)
            | Expression::ResourceRef(_)
            | Expression::AttributeRef { .. }
            | Expression::ConditionRef(_) => Vec::new(),
            Expression::MapLookup { key, sub_key, .. } => vec![key, sub_key],
            Expression::Join { values, .. } => values.iter().collect(),
            Expression::Select { index, list } => vec![index, list],
            Expression::Substitute { variables, .. } => variables.values().collect(),
            Expression::If {
                then, otherwise, ..
            } => vec![then, otherwise],
            Expression::RegionAZs(inner) | Expression::Base64(inner) | Expression::Not(inner) => {
                vec![inner]
            }
            Expression::Equals(left, right) => vec![left, right],
            Expression::And(items) | Expression::Or(items) => items.iter().collect(),
        }
    }

    /// Visit this expression and every nested one, parents before children.
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Expression),
    {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Names this expression may depend on as resources: `Ref` and `Fn::GetAtt`
    /// targets plus `Fn::Sub` placeholders not bound by the variable map.
    ///
    /// Placeholders are reported by their leading segment (`${Vpc.CidrBlock}`
    /// yields `Vpc`); callers filter to declared resources.
    pub fn referenced_resources(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |expr| match expr {
            Expression::ResourceRef(id) => names.push(id.as_str()),
            Expression::AttributeRef { logical_id, .. } => names.push(logical_id.as_str()),
            Expression::Substitute {
                template,
                variables,
            } => {
                for placeholder in sub_placeholders(template) {
                    let head = placeholder.split('.').next().unwrap_or(placeholder);
                    if !variables.contains_key(head) {
                        names.push(head);
                    }
                }
            }
            _ => {}
        });
        names
    }

    /// Condition names used through `Condition` or as the first argument of
    /// `Fn::If`, in order of appearance.
    pub fn referenced_conditions(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |expr| match expr {
            Expression::ConditionRef(name) => names.push(name.as_str()),
            Expression::If { condition, .. } => names.push(condition.as_str()),
            _ => {}
        });
        names
    }

    /// Render to the canonical JSON form.
    pub fn to_value(&self) -> Value {
        match self {
            Expression::Literal(literal) => match literal {
                Literal::String(s) => Value::String(s.clone()),
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Integer(i) => Value::from(*i),
                Literal::List(items) => Value::Array(items.iter().map(|e| e.to_value()).collect()),
                Literal::Map(entries) => Value::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_value()))
                        .collect(),
                ),
            },
            Expression::ParamRef(name) | Expression::ResourceRef(name) => {
                function_value(IntrinsicFunctionType::Ref, Value::String(name.clone()))
            }
            Expression::AttributeRef {
                logical_id,
                attribute,
            } => function_value(
                IntrinsicFunctionType::GetAtt,
                Value::Array(vec![
                    Value::String(logical_id.clone()),
                    Value::String(attribute.clone()),
                ]),
            ),
            Expression::MapLookup { map, key, sub_key } => function_value(
                IntrinsicFunctionType::FindInMap,
                Value::Array(vec![Value::String(map.clone()), key.to_value(), sub_key.to_value()]),
            ),
            Expression::Join { delimiter, values } => function_value(
                IntrinsicFunctionType::Join,
                Value::Array(vec![
                    Value::String(delimiter.clone()),
                    Value::Array(values.iter().map(|v| v.to_value()).collect()),
                ]),
            ),
            Expression::Select { index, list } => function_value(
                IntrinsicFunctionType::Select,
                Value::Array(vec![index.to_value(), list.to_value()]),
            ),
            Expression::Substitute {
                template,
                variables,
            } => {
                let arg = if variables.is_empty() {
                    Value::String(template.clone())
                } else {
                    let vars: Map<String, Value> = variables
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_value()))
                        .collect();
                    Value::Array(vec![Value::String(template.clone()), Value::Object(vars)])
                };
                function_value(IntrinsicFunctionType::Sub, arg)
            }
            Expression::ConditionRef(name) => {
                function_value(IntrinsicFunctionType::Condition, Value::String(name.clone()))
            }
            Expression::If {
                condition,
                then,
                otherwise,
            } => function_value(
                IntrinsicFunctionType::If,
                Value::Array(vec![
                    Value::String(condition.clone()),
                    then.to_value(),
                    otherwise.to_value(),
                ]),
            ),
            Expression::RegionAZs(region) => {
                function_value(IntrinsicFunctionType::GetAZs, region.to_value())
            }
            Expression::Base64(inner) => function_value(IntrinsicFunctionType::Base64, inner.to_value()),
            Expression::Equals(left, right) => function_value(
                IntrinsicFunctionType::Equals,
                Value::Array(vec![left.to_value(), right.to_value()]),
            ),
            Expression::And(items) => function_value(
                IntrinsicFunctionType::And,
                Value::Array(items.iter().map(|e| e.to_value()).collect()),
            ),
            Expression::Or(items) => function_value(
                IntrinsicFunctionType::Or,
                Value::Array(items.iter().map(|e| e.to_value()).collect()),
            ),
            Expression::Not(inner) => function_value(
                IntrinsicFunctionType::Not,
                Value::Array(vec![inner.to_value()]),
            ),
        }
    }

    /// Parse the canonical JSON form.
    ///
    /// `is_resource` decides whether a `Ref` target is a resource logical id;
    /// everything else is treated as a parameter reference.
    pub fn from_value<F>(value: &Value, is_resource: &F) -> Result<Self>
    where
        F: Fn(&str) -> bool,
    {
        match value {
            Value::String(s) => Ok(Expression::string(s.clone())),
            Value::Bool(b) => Ok(Expression::boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Expression::integer)
                .ok_or_else(|| anyhow!("Unsupported non-integer number {}", n)),
            Value::Null => bail!("Null is not a valid template value"),
            Value::Array(items) => Ok(Expression::list(
                items
                    .iter()
                    .map(|item| Expression::from_value(item, is_resource))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Value::Object(obj) => match detect_intrinsic_function(value) {
                Some(function) => {
                    let arg = obj
                        .get(function.json_name())
                        .ok_or_else(|| anyhow!("Missing {} argument", function.json_name()))?;
                    parse_function(function, arg, is_resource)
                }
                None => {
                    let mut entries = IndexMap::new();
                    for (key, nested) in obj {
                        entries.insert(key.clone(), Expression::from_value(nested, is_resource)?);
                    }
                    Ok(Expression::Literal(Literal::Map(entries)))
                }
            },
        }
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::string(value)
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::string(value)
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::boolean(value)
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::integer(value)
    }
}

impl From<Vec<Expression>> for Expression {
    fn from(values: Vec<Expression>) -> Self {
        Expression::list(values)
    }
}

fn function_value(function: IntrinsicFunctionType, arg: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(function.json_name().to_string(), arg);
    Value::Object(obj)
}

fn expect_str<'v>(value: &'v Value, function: IntrinsicFunctionType, what: &str) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| anyhow!("{} {} must be a string, found {}", function.json_name(), what, value))
}

fn expect_array<'v>(
    value: &'v Value,
    function: IntrinsicFunctionType,
    len: Option<usize>,
) -> Result<&'v Vec<Value>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("{} expects a list argument, found {}", function.json_name(), value))?;
    if let Some(expected) = len {
        if items.len() != expected {
            bail!(
                "{} expects {} arguments, found {}",
                function.json_name(),
                expected,
                items.len()
            );
        }
    }
    Ok(items)
}

fn parse_function<F>(function: IntrinsicFunctionType, arg: &Value, is_resource: &F) -> Result<Expression>
where
    F: Fn(&str) -> bool,
{
    let parse = |v: &Value| Expression::from_value(v, is_resource);
    let parse_all = |items: &[Value]| items.iter().map(parse).collect::<Result<Vec<_>>>();

    let expr = match function {
        IntrinsicFunctionType::Ref => {
            let name = expect_str(arg, function, "target")?;
            if is_resource(name) {
                Expression::resource_ref(name)
            } else {
                Expression::param_ref(name)
            }
        }
        IntrinsicFunctionType::GetAtt => match arg {
            // Short form "Resource.Attribute"
            Value::String(s) => {
                let (logical_id, attribute) = s
                    .split_once('.')
                    .ok_or_else(|| anyhow!("Fn::GetAtt '{}' is not of the form Resource.Attribute", s))?;
                Expression::get_att(logical_id, attribute)
            }
            _ => {
                let items = expect_array(arg, function, Some(2))?;
                Expression::get_att(
                    expect_str(&items[0], function, "resource")?,
                    expect_str(&items[1], function, "attribute")?,
                )
            }
        },
        IntrinsicFunctionType::FindInMap => {
            let items = expect_array(arg, function, Some(3))?;
            Expression::find_in_map(
                expect_str(&items[0], function, "map name")?,
                parse(&items[1])?,
                parse(&items[2])?,
            )
        }
        IntrinsicFunctionType::Join => {
            let items = expect_array(arg, function, Some(2))?;
            let values = expect_array(&items[1], function, None)?;
            Expression::join(expect_str(&items[0], function, "delimiter")?, parse_all(values)?)
        }
        IntrinsicFunctionType::Select => {
            let items = expect_array(arg, function, Some(2))?;
            Expression::select(parse(&items[0])?, parse(&items[1])?)
        }
        IntrinsicFunctionType::Sub => match arg {
            Value::String(template) => Expression::sub(template.clone()),
            _ => {
                let items = expect_array(arg, function, Some(2))?;
                let template = expect_str(&items[0], function, "template")?;
                let vars = items[1]
                    .as_object()
                    .ok_or_else(|| anyhow!("Fn::Sub variables must be an object"))?;
                let mut variables = IndexMap::new();
                for (name, value) in vars {
                    variables.insert(name.clone(), parse(value)?);
                }
                Expression::Substitute {
                    template: template.to_string(),
                    variables,
                }
            }
        },
        IntrinsicFunctionType::Condition => {
            Expression::condition(expect_str(arg, function, "name")?)
        }
        IntrinsicFunctionType::If => {
            let items = expect_array(arg, function, Some(3))?;
            Expression::if_(
                expect_str(&items[0], function, "condition")?,
                parse(&items[1])?,
                parse(&items[2])?,
            )
        }
        IntrinsicFunctionType::GetAZs => Expression::get_azs(parse(arg)?),
        IntrinsicFunctionType::Base64 => Expression::base64(parse(arg)?),
        IntrinsicFunctionType::Equals => {
            let items = expect_array(arg, function, Some(2))?;
            Expression::equals(parse(&items[0])?, parse(&items[1])?)
        }
        IntrinsicFunctionType::And => Expression::and(parse_all(expect_array(arg, function, None)?)?),
        IntrinsicFunctionType::Or => Expression::or(parse_all(expect_array(arg, function, None)?)?),
        IntrinsicFunctionType::Not => {
            let items = expect_array(arg, function, Some(1))?;
            Expression::not(parse(&items[0])?)
        }
    };

    Ok(expr)
}
