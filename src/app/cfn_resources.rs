//! Resource, condition and output declarations.
//!
//! [`ResourceRegistry`] holds everything a template declares besides parameters
//! and mappings. Each declaration is checked against the [`SchemaRegistry`] when
//! it is made, so a bad property name or a literal of the wrong kind is reported
//! at the call that introduced it. Checks that need the whole template
//! (references between declarations) belong to the compile pass.

use indexmap::IndexMap;

use crate::app::cfn_errors::DeclarationError;
use crate::app::cfn_intrinsic_functions::Expression;
use crate::app::cfn_schema::SchemaRegistry;

/// A resource instance: logical id, type and property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDecl {
    pub logical_id: String,
    pub resource_type: String,
    pub properties: IndexMap<String, Expression>,
    pub condition: Option<String>,
    pub depends_on: Vec<String>,
    /// Rendered as the resource's `UpdatePolicy` attribute.
    pub update_policy: Option<Expression>,
}

impl ResourceDecl {
    pub fn new(logical_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            resource_type: resource_type.into(),
            properties: IndexMap::new(),
            condition: None,
            depends_on: Vec::new(),
            update_policy: None,
        }
    }

    /// Set a property. Setting the same name twice keeps the first position.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    pub fn with_update_policy(mut self, policy: impl Into<Expression>) -> Self {
        self.update_policy = Some(policy.into());
        self
    }

    /// Property values followed by the update policy, if any.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.properties.values().chain(self.update_policy.iter())
    }

    pub fn property(&self, name: &str) -> Option<&Expression> {
        self.properties.get(name)
    }
}

/// A named boolean expression over parameters and other conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionDef {
    pub name: String,
    pub expression: Expression,
}

/// A template output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDecl {
    pub name: String,
    pub value: Expression,
    pub description: Option<String>,
    pub export: Option<Expression>,
    pub condition: Option<String>,
}

impl OutputDecl {
    pub fn new(name: impl Into<String>, value: impl Into<Expression>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            export: None,
            condition: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_export(mut self, name: impl Into<Expression>) -> Self {
        self.export = Some(name.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Declared resources, conditions and outputs, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: IndexMap<String, ResourceDecl>,
    conditions: IndexMap<String, ConditionDef>,
    outputs: IndexMap<String, OutputDecl>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource after checking it against its type's schema.
    ///
    /// Checks run in a fixed order and the first failure is returned: duplicate
    /// logical id, unknown type, missing required property, unknown property,
    /// then literal kind mismatch. Non-literal values are left to the compile
    /// pass.
    pub fn declare_resource(
        &mut self,
        schemas: &SchemaRegistry,
        decl: ResourceDecl,
    ) -> Result<(), DeclarationError> {
        if self.resources.contains_key(&decl.logical_id) {
            return Err(DeclarationError::DuplicateResourceId(decl.logical_id));
        }

        let resource_type = schemas
            .resource_type(&decl.resource_type)
            .ok_or_else(|| DeclarationError::UnknownResourceType(decl.resource_type.clone()))?;

        if let Some(missing) = resource_type
            .required_properties()
            .find(|p| !decl.properties.contains_key(&p.name))
        {
            return Err(DeclarationError::MissingRequiredProperty {
                logical_id: decl.logical_id.clone(),
                resource_type: decl.resource_type.clone(),
                property: missing.name.clone(),
            });
        }

        for (name, value) in &decl.properties {
            let Some(definition) = resource_type.property(name) else {
                return Err(DeclarationError::UnknownProperty {
                    logical_id: decl.logical_id.clone(),
                    resource_type: decl.resource_type.clone(),
                    property: name.clone(),
                });
            };

            if let Some(found) = value.literal_kind() {
                if !definition.kind.accepts(found) {
                    return Err(DeclarationError::PropertyTypeMismatch {
                        logical_id: decl.logical_id.clone(),
                        property: name.clone(),
                        expected: definition.kind,
                        found,
                    });
                }
            }
        }

        log_debug!(
            "Declared resource {} ({}, {} properties)",
            decl.logical_id,
            decl.resource_type,
            decl.properties.len()
        );
        self.resources.insert(decl.logical_id.clone(), decl);
        Ok(())
    }

    pub fn declare_condition(
        &mut self,
        name: impl Into<String>,
        expression: Expression,
    ) -> Result<(), DeclarationError> {
        let name = name.into();
        if self.conditions.contains_key(&name) {
            return Err(DeclarationError::DuplicateConditionName(name));
        }
        log_debug!("Declared condition {}", name);
        self.conditions
            .insert(name.clone(), ConditionDef { name, expression });
        Ok(())
    }

    pub fn declare_output(&mut self, output: OutputDecl) -> Result<(), DeclarationError> {
        if self.outputs.contains_key(&output.name) {
            return Err(DeclarationError::DuplicateOutputName(output.name));
        }
        log_debug!("Declared output {}", output.name);
        self.outputs.insert(output.name.clone(), output);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&ResourceDecl> {
        self.resources.get(logical_id)
    }

    pub fn contains_resource(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    pub fn condition(&self, name: &str) -> Option<&ConditionDef> {
        self.conditions.get(name)
    }

    pub fn contains_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputDecl> {
        self.outputs.get(name)
    }

    /// Resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDecl> {
        self.resources.values()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &ConditionDef> {
        self.conditions.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputDecl> {
        self.outputs.values()
    }

    /// Declaration index of a resource.
    pub fn resource_index(&self, logical_id: &str) -> Option<usize> {
        self.resources.get_index_of(logical_id)
    }

    pub fn condition_index(&self, name: &str) -> Option<usize> {
        self.conditions.get_index_of(name)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}
