//! Resource type schemas.
//!
//! A [`ResourceType`] describes what a resource of that type may contain: its
//! properties (name, value kind, required or optional) and the attributes other
//! resources can read with `Fn::GetAtt`. Types are plain data registered once in
//! a [`SchemaRegistry`]; the compiler has no built-in knowledge of any AWS
//! service.
//!
//! Types can be declared in code or loaded from a CloudFormation resource
//! specification document:
//!
//! ```json
//! {
//!   "ResourceTypes": {
//!     "AWS::EC2::Subnet": {
//!       "Properties": {
//!         "VpcId": { "PrimitiveType": "String", "Required": true },
//!         "Tags": { "Type": "List", "ItemType": "Tag", "Required": false }
//!       },
//!       "Attributes": { "SubnetId": { "PrimitiveType": "String" } }
//!     }
//!   }
//! }
//! ```

use std::fmt;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde_json::Value;

use crate::app::cfn_errors::DeclarationError;

/// The kind of value a property accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Boolean,
    Integer,
    List,
    /// Nested property object (e.g. a load balancer `HealthCheck`).
    Map,
    /// Accepts any value, including references.
    Any,
}

impl ValueKind {
    /// Whether a literal of kind `found` may be assigned to a property of this kind.
    pub fn accepts(&self, found: ValueKind) -> bool {
        *self == ValueKind::Any || *self == found
    }

    /// Map a resource specification `PrimitiveType` / `Type` pair onto a value kind.
    fn from_specification(primitive_type: Option<&str>, type_name: Option<&str>) -> Self {
        match (primitive_type, type_name) {
            (Some("String"), _) => ValueKind::String,
            (Some("Integer"), _) | (Some("Long"), _) => ValueKind::Integer,
            (Some("Boolean"), _) => ValueKind::Boolean,
            (Some(_), _) => ValueKind::Any,
            (None, Some("List")) => ValueKind::List,
            (None, Some(_)) => ValueKind::Map,
            (None, None) => ValueKind::Any,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "String",
            ValueKind::Boolean => "Boolean",
            ValueKind::Integer => "Integer",
            ValueKind::List => "List",
            ValueKind::Map => "Map",
            ValueKind::Any => "Any",
        };
        f.write_str(name)
    }
}

/// A single property of a resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
}

impl PropertyDef {
    pub fn required(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Schema for one resource type, e.g. `AWS::EC2::Subnet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    name: String,
    properties: Vec<PropertyDef>,
    attributes: Vec<String>,
    primary_identifier: Option<String>,
}

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            attributes: Vec::new(),
            primary_identifier: None,
        }
    }

    /// Add a property. A later definition with the same name replaces the earlier one.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        if !self.attributes.contains(&attribute) {
            self.attributes.push(attribute);
        }
        self
    }

    /// Declare the attribute that identifies the provisioned resource.
    ///
    /// The primary identifier is also readable with `Fn::GetAtt`.
    pub fn with_primary_identifier(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        self.primary_identifier = Some(attribute.clone());
        self.with_attribute(attribute)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn required_properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.properties.iter().filter(|p| p.required)
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn primary_identifier(&self) -> Option<&str> {
        self.primary_identifier.as_deref()
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

/// All resource types known to a template build.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: IndexMap<String, ResourceType>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type. Fails if the name is already taken.
    pub fn register_type(&mut self, resource_type: ResourceType) -> Result<(), DeclarationError> {
        if self.types.contains_key(resource_type.name()) {
            return Err(DeclarationError::DuplicateTypeName(
                resource_type.name().to_string(),
            ));
        }
        log_debug!(
            "Registered resource type {} ({} properties, {} attributes)",
            resource_type.name(),
            resource_type.properties().len(),
            resource_type.attributes().len()
        );
        self.types
            .insert(resource_type.name().to_string(), resource_type);
        Ok(())
    }

    pub fn property_defs_for(&self, type_name: &str) -> Result<&[PropertyDef], DeclarationError> {
        self.types
            .get(type_name)
            .map(|t| t.properties())
            .ok_or_else(|| DeclarationError::UnknownResourceType(type_name.to_string()))
    }

    pub fn resource_type(&self, type_name: &str) -> Option<&ResourceType> {
        self.types.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn has_attribute(&self, type_name: &str, attribute: &str) -> bool {
        self.types
            .get(type_name)
            .map(|t| t.has_attribute(attribute))
            .unwrap_or(false)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Build a registry from a resource specification JSON document.
    pub fn from_specification_json(json_content: &str) -> Result<Self> {
        let spec: Value = serde_json::from_str(json_content)
            .map_err(|e| anyhow!("Failed to parse resource specification: {}", e))?;
        let mut registry = Self::new();
        registry.register_specification(&spec)?;
        Ok(registry)
    }

    /// Register every entry of a specification's `ResourceTypes` object.
    ///
    /// Returns the number of types registered.
    pub fn register_specification(&mut self, spec: &Value) -> Result<usize> {
        let resource_types = spec
            .get("ResourceTypes")
            .and_then(|r| r.as_object())
            .ok_or_else(|| anyhow!("Resource specification has no ResourceTypes object"))?;

        let mut count = 0;
        for (type_name, type_data) in resource_types {
            let resource_type = resource_type_from_specification(type_name, type_data);
            self.register_type(resource_type)
                .with_context(|| format!("Failed to register {}", type_name))?;
            count += 1;
        }

        log_info!("Loaded {} resource types from specification", count);
        Ok(count)
    }
}

fn resource_type_from_specification(type_name: &str, type_data: &Value) -> ResourceType {
    let mut resource_type = ResourceType::new(type_name);

    if let Some(props_obj) = type_data.get("Properties").and_then(|p| p.as_object()) {
        for (prop_name, prop_data) in props_obj {
            let required = prop_data
                .get("Required")
                .and_then(|r| r.as_bool())
                .unwrap_or(false);

            let primitive_type = prop_data.get("PrimitiveType").and_then(|p| p.as_str());
            let type_name = prop_data.get("Type").and_then(|t| t.as_str());

            resource_type = resource_type.with_property(PropertyDef {
                name: prop_name.clone(),
                kind: ValueKind::from_specification(primitive_type, type_name),
                required,
            });
        }
    }

    if let Some(attrs_obj) = type_data.get("Attributes").and_then(|a| a.as_object()) {
        for attr_name in attrs_obj.keys() {
            resource_type = resource_type.with_attribute(attr_name.clone());
        }
    }

    if let Some(primary) = type_data.get("PrimaryIdentifier").and_then(|p| p.as_str()) {
        resource_type = resource_type.with_primary_identifier(primary);
    }

    resource_type
}
