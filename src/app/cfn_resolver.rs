//! Reference validation for the compile pass.
//!
//! The resolver walks every expression in a frozen template and reports each
//! name that does not resolve. Nothing stops at the first problem: every
//! diagnostic is collected and returned, so one compile run shows all of them.

use indexmap::IndexMap;

use crate::app::cfn_errors::{Diagnostic, DiagnosticKind, Location, ReferentKind, Section};
use crate::app::cfn_intrinsic_functions::{
    sub_placeholders, Expression, IntrinsicFunctionType, Literal,
};
use crate::app::cfn_parameters::{is_pseudo_parameter, ParameterRegistry};
use crate::app::cfn_resources::{ConditionDef, OutputDecl, ResourceDecl, ResourceRegistry};
use crate::app::cfn_schema::SchemaRegistry;

/// Read-only view of the declared names an expression may refer to.
#[derive(Debug, Clone, Copy)]
pub struct ResolverScope<'a> {
    pub schemas: &'a SchemaRegistry,
    pub parameters: &'a ParameterRegistry,
    pub resources: &'a ResourceRegistry,
    pub allow_pseudo_parameters: bool,
}

impl<'a> ResolverScope<'a> {
    fn is_parameter(&self, name: &str) -> bool {
        self.parameters.is_parameter(name)
            || (self.allow_pseudo_parameters && is_pseudo_parameter(name))
    }
}

/// Validates expressions against a [`ResolverScope`].
#[derive(Debug, Clone, Copy)]
pub struct ExpressionResolver<'a> {
    scope: ResolverScope<'a>,
}

impl<'a> ExpressionResolver<'a> {
    pub fn new(scope: ResolverScope<'a>) -> Self {
        Self { scope }
    }

    /// Validate an expression found at `location` in a resource or output.
    pub fn validate(&self, expr: &Expression, location: &Location) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.visit(expr, location, false, &mut diagnostics);
        diagnostics
    }

    /// Validate a resource's properties, `UpdatePolicy`, `Condition` and `DependsOn`.
    pub fn validate_resource(&self, resource: &ResourceDecl) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let base = Location::new(Section::Resources, resource.logical_id.as_str(), "");

        for (name, value) in &resource.properties {
            let location = base.child("Properties").child(name);
            self.visit(value, &location, false, &mut diagnostics);
        }

        if let Some(policy) = &resource.update_policy {
            self.visit(policy, &base.child("UpdatePolicy"), false, &mut diagnostics);
        }

        if let Some(condition) = &resource.condition {
            self.check_condition_name(condition, &base.child("Condition"), &mut diagnostics);
        }

        for (i, dependency) in resource.depends_on.iter().enumerate() {
            if !self.scope.resources.contains_resource(dependency) {
                diagnostics.push(Diagnostic::unresolved(
                    ReferentKind::Resource,
                    base.child("DependsOn").child(&format!("[{}]", i)),
                    format!("DependsOn target '{}' is not a declared resource", dependency),
                ));
            }
        }

        log_trace!(
            "Validated resource {}: {} diagnostic(s)",
            resource.logical_id,
            diagnostics.len()
        );
        diagnostics
    }

    /// Validate a condition body. Only parameters and other conditions may be
    /// referenced from here.
    pub fn validate_condition(&self, condition: &ConditionDef) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let location = Location::new(Section::Conditions, condition.name.as_str(), "");
        self.visit(&condition.expression, &location, true, &mut diagnostics);
        diagnostics
    }

    pub fn validate_output(&self, output: &OutputDecl) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let base = Location::new(Section::Outputs, output.name.as_str(), "");

        self.visit(&output.value, &base.child("Value"), false, &mut diagnostics);
        if let Some(export) = &output.export {
            let location = base.child("Export").child("Name");
            self.visit(export, &location, false, &mut diagnostics);
        }
        if let Some(condition) = &output.condition {
            self.check_condition_name(condition, &base.child("Condition"), &mut diagnostics);
        }

        diagnostics
    }

    fn check_condition_name(&self, name: &str, location: &Location, out: &mut Vec<Diagnostic>) {
        if !self.scope.resources.contains_condition(name) {
            out.push(Diagnostic::unresolved(
                ReferentKind::Condition,
                location.clone(),
                format!("Condition '{}' is not declared", name),
            ));
        }
    }

    fn check_parameter_ref(&self, name: &str, location: &Location, out: &mut Vec<Diagnostic>) {
        let is_parameter = self.scope.is_parameter(name);
        if is_parameter && self.scope.resources.contains_resource(name) {
            out.push(ambiguous(name, location));
        } else if !is_parameter {
            out.push(Diagnostic::unresolved(
                ReferentKind::Parameter,
                location.clone(),
                format!("Parameter '{}' is not declared", name),
            ));
        }
    }

    fn check_resource_ref(
        &self,
        logical_id: &str,
        location: &Location,
        in_condition: bool,
        out: &mut Vec<Diagnostic>,
    ) {
        if in_condition {
            out.push(Diagnostic::unresolved(
                ReferentKind::Parameter,
                location.clone(),
                format!(
                    "Conditions may only reference parameters and conditions, found resource '{}'",
                    logical_id
                ),
            ));
        } else if !self.scope.resources.contains_resource(logical_id) {
            out.push(Diagnostic::unresolved(
                ReferentKind::Resource,
                location.clone(),
                format!("Resource '{}' is not declared", logical_id),
            ));
        } else if self.scope.is_parameter(logical_id) {
            out.push(ambiguous(logical_id, location));
        }
    }

    fn check_attribute_ref(
        &self,
        logical_id: &str,
        attribute: &str,
        location: &Location,
        in_condition: bool,
        out: &mut Vec<Diagnostic>,
    ) {
        if in_condition {
            out.push(Diagnostic::unresolved(
                ReferentKind::Resource,
                location.clone(),
                format!(
                    "Conditions cannot read resource attributes, found '{}.{}'",
                    logical_id, attribute
                ),
            ));
            return;
        }

        let Some(resource) = self.scope.resources.resource(logical_id) else {
            out.push(Diagnostic::unresolved(
                ReferentKind::Resource,
                location.clone(),
                format!("Resource '{}' is not declared", logical_id),
            ));
            return;
        };

        if !self
            .scope
            .schemas
            .has_attribute(&resource.resource_type, attribute)
        {
            out.push(Diagnostic::unresolved(
                ReferentKind::Attribute,
                location.clone(),
                format!(
                    "Resource '{}' ({}) has no attribute '{}'",
                    logical_id, resource.resource_type, attribute
                ),
            ));
        }
    }

    fn check_map_lookup(
        &self,
        map: &str,
        key: &Expression,
        sub_key: &Expression,
        location: &Location,
        out: &mut Vec<Diagnostic>,
    ) {
        let Some(table) = self.scope.parameters.mapping(map) else {
            out.push(Diagnostic::unresolved(
                ReferentKind::Mapping,
                location.clone(),
                format!("Mapping '{}' is not declared", map),
            ));
            return;
        };

        // A missing top-level key falls back to the uniform sub-key set
        let top_key = literal_str(key).filter(|top_key| {
            let found = table.contains_top_key(top_key);
            if !found {
                out.push(Diagnostic::unresolved(
                    ReferentKind::MappingKey,
                    location.child("[1]"),
                    format!("Mapping '{}' has no top-level key '{}'", map, top_key),
                ));
            }
            found
        });

        if let Some(second) = literal_str(sub_key) {
            let found = match top_key {
                Some(top_key) => table.lookup(top_key, second).is_some(),
                None => table.contains_sub_key(second),
            };
            if !found {
                out.push(Diagnostic::unresolved(
                    ReferentKind::MappingKey,
                    location.child("[2]"),
                    format!("Mapping '{}' has no second-level key '{}'", map, second),
                ));
            }
        }
    }

    fn check_select(
        &self,
        index: &Expression,
        list: &Expression,
        location: &Location,
        out: &mut Vec<Diagnostic>,
    ) {
        let index = match index {
            Expression::Literal(Literal::Integer(i)) => *i,
            Expression::Literal(Literal::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => i,
                Err(_) => return,
            },
            _ => return,
        };

        if index < 0 {
            out.push(Diagnostic::new(
                DiagnosticKind::SelectIndexOutOfRange,
                location.child("[0]"),
                format!("Select index {} is negative", index),
            ));
            return;
        }

        if let Expression::Literal(Literal::List(items)) = list {
            if index as usize >= items.len() {
                out.push(Diagnostic::new(
                    DiagnosticKind::SelectIndexOutOfRange,
                    location.child("[0]"),
                    format!(
                        "Select index {} is out of range for a list of {} element(s)",
                        index,
                        items.len()
                    ),
                ));
            }
        }
    }

    fn check_sub_template(
        &self,
        template: &str,
        variables: &IndexMap<String, Expression>,
        location: &Location,
        in_condition: bool,
        out: &mut Vec<Diagnostic>,
    ) {
        for placeholder in sub_placeholders(template) {
            match placeholder.split_once('.') {
                Some((head, _)) if variables.contains_key(head) => {}
                Some((logical_id, attribute)) => {
                    self.check_attribute_ref(logical_id, attribute, location, in_condition, out)
                }
                None if variables.contains_key(placeholder) => {}
                None => {
                    if self.scope.resources.contains_resource(placeholder) {
                        self.check_resource_ref(placeholder, location, in_condition, out);
                    } else {
                        self.check_parameter_ref(placeholder, location, out);
                    }
                }
            }
        }
    }

    fn visit(&self, expr: &Expression, location: &Location, in_condition: bool, out: &mut Vec<Diagnostic>) {
        match expr {
            Expression::Literal(Literal::String(_))
            | Expression::Literal(Literal::Boolean(_))
            | Expression::Literal(Literal::Integer(_)) => {}
            Expression::Literal(Literal::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.visit(item, &location.child(&format!("[{}]", i)), in_condition, out);
                }
            }
            Expression::Literal(Literal::Map(entries)) => {
                if entries.len() == 1 {
                    if let Some((key, _)) = entries.first() {
                        if IntrinsicFunctionType::from_json_name(key).is_some() {
                            out.push(Diagnostic::new(
                                DiagnosticKind::SerializationFailure,
                                location.clone(),
                                format!(
                                    "Map literal with the single key '{}' would serialize as an intrinsic function",
                                    key
                                ),
                            ));
                        }
                    }
                }
                for (key, value) in entries {
                    self.visit(value, &location.child(key), in_condition, out);
                }
            }
            Expression::ParamRef(name) => self.check_parameter_ref(name, location, out),
            Expression::ResourceRef(logical_id) => {
                self.check_resource_ref(logical_id, location, in_condition, out)
            }
            Expression::AttributeRef {
                logical_id,
                attribute,
            } => self.check_attribute_ref(logical_id, attribute, location, in_condition, out),
            Expression::MapLookup { map, key, sub_key } => {
                let at = location.child("Fn::FindInMap");
                self.check_map_lookup(map, key, sub_key, &at, out);
                self.visit(key, &at.child("[1]"), in_condition, out);
                self.visit(sub_key, &at.child("[2]"), in_condition, out);
            }
            Expression::Join { values, .. } => {
                let at = location.child("Fn::Join").child("[1]");
                for (i, value) in values.iter().enumerate() {
                    self.visit(value, &at.child(&format!("[{}]", i)), in_condition, out);
                }
            }
            Expression::Select { index, list } => {
                let at = location.child("Fn::Select");
                self.check_select(index, list, &at, out);
                self.visit(index, &at.child("[0]"), in_condition, out);
                self.visit(list, &at.child("[1]"), in_condition, out);
            }
            Expression::Substitute {
                template,
                variables,
            } => {
                let at = location.child("Fn::Sub");
                self.check_sub_template(template, variables, &at, in_condition, out);
                for (name, value) in variables {
                    self.visit(value, &at.child("[1]").child(name), in_condition, out);
                }
            }
            Expression::ConditionRef(name) => {
                self.check_condition_name(name, &location.child("Condition"), out)
            }
            Expression::If {
                condition,
                then,
                otherwise,
            } => {
                let at = location.child("Fn::If");
                self.check_condition_name(condition, &at.child("[0]"), out);
                self.visit(then, &at.child("[1]"), in_condition, out);
                self.visit(otherwise, &at.child("[2]"), in_condition, out);
            }
            Expression::RegionAZs(region) => {
                self.visit(region, &location.child("Fn::GetAZs"), in_condition, out)
            }
            Expression::Base64(inner) => {
                self.visit(inner, &location.child("Fn::Base64"), in_condition, out)
            }
            Expression::Equals(left, right) => {
                let at = location.child("Fn::Equals");
                self.visit(left, &at.child("[0]"), in_condition, out);
                self.visit(right, &at.child("[1]"), in_condition, out);
            }
            Expression::And(items) | Expression::Or(items) => {
                let name = if matches!(expr, Expression::And(_)) {
                    "Fn::And"
                } else {
                    "Fn::Or"
                };
                let at = location.child(name);
                for (i, item) in items.iter().enumerate() {
                    self.visit(item, &at.child(&format!("[{}]", i)), in_condition, out);
                }
            }
            Expression::Not(inner) => {
                self.visit(inner, &location.child("Fn::Not").child("[0]"), in_condition, out)
            }
        }
    }
}

fn literal_str(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::Literal(Literal::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn ambiguous(name: &str, location: &Location) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::AmbiguousReference,
        location.clone(),
        format!("'{}' is declared as both a parameter and a resource", name),
    )
}
