//! Template builder, compile pass and the CloudFormation document model.
//!
//! # Core Components
//!
//! - [`TemplateBuilder`] - Caller-owned registries plus the compile pass
//! - [`CompiledTemplate`] - The immutable result of a successful compile
//! - [`CloudFormationTemplate`] - Serde model of the JSON/YAML document
//! - [`Resource`], [`Output`], [`DependsOn`] - Document sections
//!
//! # Compile pass
//!
//! [`TemplateBuilder::compile`] borrows the builder immutably, validates every
//! expression (optionally spread over worker threads), runs cycle detection on
//! the dependency graph and, when nothing was reported, assembles a document
//! with resources in deployment order. All problems are returned together in a
//! [`CompileReport`].
//!
//! # Document round-trip
//!
//! A compiled document can be written with [`CompiledTemplate::to_file`], read
//! back with [`CloudFormationTemplate::from_file`] and turned into a builder
//! again with [`TemplateBuilder::from_document`]. Recompiling yields the same
//! bytes.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::app::cfn_config::{CompilerConfig, OutputFormat};
use crate::app::cfn_dag::DependencyGraph;
use crate::app::cfn_errors::{
    CompileReport, DeclarationError, Diagnostic, DiagnosticKind, Location, Section,
};
use crate::app::cfn_intrinsic_functions::Expression;
use crate::app::cfn_parameters::{MappingTable, ParameterDef, ParameterRegistry};
use crate::app::cfn_resolver::{ExpressionResolver, ResolverScope};
use crate::app::cfn_resources::{ConditionDef, OutputDecl, ResourceDecl, ResourceRegistry};
use crate::app::cfn_schema::{ResourceType, SchemaRegistry};

/// Represents resource dependencies in CloudFormation templates.
///
/// CloudFormation accepts either a single logical id or a list. A single
/// dependency is written as a plain string.
#[derive(Debug, Clone, PartialEq)]
pub enum DependsOn {
    /// A single resource dependency
    Single(String),
    /// Multiple resource dependencies
    Multiple(Vec<String>),
}

impl Default for DependsOn {
    fn default() -> Self {
        DependsOn::Multiple(Vec::new())
    }
}

impl DependsOn {
    /// Build the most compact form for a dependency list, or `None` when empty.
    pub fn from_ids(ids: &[String]) -> Option<Self> {
        match ids {
            [] => None,
            [single] => Some(DependsOn::Single(single.clone())),
            _ => Some(DependsOn::Multiple(ids.to_vec())),
        }
    }

    /// Convert dependencies to a vector for uniform processing.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DependsOn::Single(s) => vec![s.clone()],
            DependsOn::Multiple(v) => v.clone(),
        }
    }
}

impl Serialize for DependsOn {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DependsOn::Single(s) => s.serialize(serializer),
            DependsOn::Multiple(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DependsOn {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(DependsOn::Single(s)),
            Value::Array(arr) => {
                let strings: Result<Vec<String>, _> = arr
                    .into_iter()
                    .map(|v| {
                        v.as_str()
                            .map(|s| s.to_string())
                            .ok_or_else(|| serde::de::Error::custom("Expected string in array"))
                    })
                    .collect();
                Ok(DependsOn::Multiple(strings?))
            }
            _ => Err(serde::de::Error::custom("Expected string or array")),
        }
    }
}

/// A CloudFormation template document.
///
/// Sections serialize in the fixed order AWSTemplateFormatVersion, Description,
/// Parameters, Mappings, Conditions, Resources, Outputs. Every section keeps
/// its entries in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CloudFormationTemplate {
    #[serde(
        rename = "AWSTemplateFormatVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub aws_template_format_version: Option<String>,

    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Parameters", default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParameterDef>,

    #[serde(rename = "Mappings", default, skip_serializing_if = "IndexMap::is_empty")]
    pub mappings: IndexMap<String, MappingTable>,

    #[serde(rename = "Conditions", default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: IndexMap<String, Value>,

    #[serde(rename = "Resources", default)]
    pub resources: IndexMap<String, Resource>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

/// A resource entry in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<Value>,
}

/// An output entry in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Export configuration for an output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    pub name: Value,
}

impl CloudFormationTemplate {
    /// Load a template from a JSON or YAML file.
    ///
    /// The format follows the extension; files without a known extension are
    /// parsed as JSON when they start with `{` and as YAML otherwise.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => {
                if content.trim_start().starts_with('{') {
                    Self::from_json(&content)
                } else {
                    Self::from_yaml(&content)
                }
            }
        }
    }

    pub fn from_json(json_content: &str) -> Result<Self> {
        serde_json::from_str::<CloudFormationTemplate>(json_content)
            .map_err(|e| anyhow!("Failed to parse JSON: {}", e))
    }

    pub fn from_yaml(yaml_content: &str) -> Result<Self> {
        serde_yaml::from_str::<CloudFormationTemplate>(yaml_content)
            .map_err(|e| anyhow!("Failed to parse YAML: {}", e))
    }

    /// Pretty JSON with two-space indentation and a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        Ok(content)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => self.to_json_string(),
            OutputFormat::Yaml => self.to_yaml_string(),
        }
    }

    /// Save the template, choosing YAML for `.yaml`/`.yml` and JSON otherwise.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = self.render(OutputFormat::from_path(path))?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write template {}", path.display()))?;
        Ok(())
    }

    /// Compare this template against `source` and describe every difference.
    ///
    /// Resource order is part of the comparison.
    pub fn verify_against(&self, source: &CloudFormationTemplate) -> Vec<String> {
        let mut discrepancies = Vec::new();

        if self.aws_template_format_version != source.aws_template_format_version {
            discrepancies.push(format!(
                "AWSTemplateFormatVersion mismatch: expected {:?}, found {:?}",
                source.aws_template_format_version, self.aws_template_format_version
            ));
        }

        if self.description != source.description {
            discrepancies.push(format!(
                "Description mismatch: expected {:?}, found {:?}",
                source.description, self.description
            ));
        }

        compare_section("parameter", &source.parameters, &self.parameters, &mut discrepancies);
        compare_section("mapping", &source.mappings, &self.mappings, &mut discrepancies);
        compare_section("condition", &source.conditions, &self.conditions, &mut discrepancies);
        compare_section("resource", &source.resources, &self.resources, &mut discrepancies);
        compare_section("output", &source.outputs, &self.outputs, &mut discrepancies);

        let source_order: Vec<&String> = source.resources.keys().collect();
        let self_order: Vec<&String> = self.resources.keys().collect();
        if discrepancies.is_empty() && source_order != self_order {
            discrepancies.push(format!(
                "Resource order mismatch: expected {:?}, found {:?}",
                source_order, self_order
            ));
        }

        discrepancies
    }
}

fn cycle_diagnostics(graph: &DependencyGraph, section: Section, label: &str) -> Vec<Diagnostic> {
    graph
        .detect_cycles()
        .into_iter()
        .map(|cycle| {
            let first = cycle.first().cloned().unwrap_or_default();
            let message = format!("{}: {} -> {}", label, cycle.join(" -> "), first);
            Diagnostic::new(
                DiagnosticKind::CyclicDependency { cycle },
                Location::new(section, first, ""),
                message,
            )
        })
        .collect()
}

fn compare_section<T: PartialEq>(
    label: &str,
    expected: &IndexMap<String, T>,
    found: &IndexMap<String, T>,
    discrepancies: &mut Vec<String>,
) {
    for (key, value) in expected {
        match found.get(key) {
            None => discrepancies.push(format!("Missing {}: {}", label, key)),
            Some(other) if other != value => {
                discrepancies.push(format!("{} '{}' content mismatch", capitalize(label), key))
            }
            Some(_) => {}
        }
    }
    for key in found.keys() {
        if !expected.contains_key(key) {
            discrepancies.push(format!("Unexpected {}: {}", label, key));
        }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One unit of work for the validation pass.
#[derive(Debug, Clone, Copy)]
enum ValidationTarget<'a> {
    Resource(&'a ResourceDecl),
    Condition(&'a ConditionDef),
    Output(&'a OutputDecl),
}

impl<'a> ValidationTarget<'a> {
    fn validate(&self, resolver: &ExpressionResolver<'_>) -> Vec<Diagnostic> {
        match self {
            ValidationTarget::Resource(resource) => resolver.validate_resource(resource),
            ValidationTarget::Condition(condition) => resolver.validate_condition(condition),
            ValidationTarget::Output(output) => resolver.validate_output(output),
        }
    }
}

/// Caller-owned template under construction.
///
/// Declarations take `&mut self` and fail fast; [`compile`](Self::compile)
/// takes `&self` and never changes the builder.
#[derive(Debug, Clone, Default)]
pub struct TemplateBuilder {
    config: CompilerConfig,
    schemas: SchemaRegistry,
    parameters: ParameterRegistry,
    resources: ResourceRegistry,
}

impl TemplateBuilder {
    pub fn new(schemas: SchemaRegistry) -> Self {
        Self {
            config: CompilerConfig::default(),
            schemas,
            parameters: ParameterRegistry::new(),
            resources: ResourceRegistry::new(),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn register_type(&mut self, resource_type: ResourceType) -> Result<(), DeclarationError> {
        self.schemas.register_type(resource_type)
    }

    pub fn declare_parameter(&mut self, parameter: ParameterDef) -> Result<(), DeclarationError> {
        self.parameters.declare_parameter(parameter)
    }

    pub fn declare_mapping(
        &mut self,
        name: impl Into<String>,
        table: MappingTable,
    ) -> Result<(), DeclarationError> {
        self.parameters.declare_mapping(name, table)
    }

    pub fn declare_resource(&mut self, resource: ResourceDecl) -> Result<(), DeclarationError> {
        self.resources.declare_resource(&self.schemas, resource)
    }

    pub fn declare_condition(
        &mut self,
        name: impl Into<String>,
        expression: Expression,
    ) -> Result<(), DeclarationError> {
        self.resources.declare_condition(name, expression)
    }

    pub fn declare_output(&mut self, output: OutputDecl) -> Result<(), DeclarationError> {
        self.resources.declare_output(output)
    }

    /// Validate the whole template and assemble the document.
    ///
    /// Every diagnostic is collected before returning; assembly only happens
    /// when there are none.
    pub fn compile(&self) -> Result<CompiledTemplate, CompileReport> {
        let resolver = ExpressionResolver::new(ResolverScope {
            schemas: &self.schemas,
            parameters: &self.parameters,
            resources: &self.resources,
            allow_pseudo_parameters: self.config.allow_pseudo_parameters,
        });

        let mut diagnostics = self.validate_expressions(&resolver);

        let graph = DependencyGraph::build(&self.resources);
        diagnostics.extend(cycle_diagnostics(&graph, Section::Resources, "Circular dependency"));
        let condition_graph = DependencyGraph::build_conditions(&self.resources);
        diagnostics.extend(cycle_diagnostics(
            &condition_graph,
            Section::Conditions,
            "Circular condition reference",
        ));

        if !diagnostics.is_empty() {
            let report = CompileReport::new(diagnostics);
            for diagnostic in report.diagnostics() {
                log_warn!("{}", diagnostic);
            }
            log_warn!("Template compilation failed with {} diagnostic(s)", report.len());
            return Err(report);
        }

        let resource_order = graph.topological_order().map_err(|e| {
            CompileReport::new(vec![Diagnostic::new(
                DiagnosticKind::CyclicDependency { cycle: Vec::new() },
                Location::new(Section::Resources, "", ""),
                e.to_string(),
            )])
        })?;

        let document = self.assemble(&resource_order);
        log_info!(
            "Compiled template: {} parameters, {} resources, {} outputs",
            document.parameters.len(),
            document.resources.len(),
            document.outputs.len()
        );

        Ok(CompiledTemplate {
            document,
            resource_order,
            output_format: self.config.output_format,
        })
    }

    fn validation_targets(&self) -> Vec<ValidationTarget<'_>> {
        self.resources
            .resources()
            .map(ValidationTarget::Resource)
            .chain(self.resources.conditions().map(ValidationTarget::Condition))
            .chain(self.resources.outputs().map(ValidationTarget::Output))
            .collect()
    }

    fn validate_expressions(&self, resolver: &ExpressionResolver<'_>) -> Vec<Diagnostic> {
        let targets = self.validation_targets();
        let workers = self.config.effective_worker_threads();

        if workers <= 1 || targets.len() <= 1 {
            return targets
                .iter()
                .flat_map(|target| target.validate(resolver))
                .collect();
        }

        log_debug!(
            "Validating {} declarations on {} worker threads",
            targets.len(),
            workers
        );

        let collector = Mutex::new(Vec::new());
        let chunk_size = targets.len().div_ceil(workers);
        std::thread::scope(|scope| {
            for chunk in targets.chunks(chunk_size) {
                let collector = &collector;
                scope.spawn(move || {
                    let found: Vec<Diagnostic> = chunk
                        .iter()
                        .flat_map(|target| target.validate(resolver))
                        .collect();
                    match collector.lock() {
                        Ok(mut diagnostics) => diagnostics.extend(found),
                        Err(poisoned) => poisoned.into_inner().extend(found),
                    }
                });
            }
        });

        collector
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn assemble(&self, resource_order: &[String]) -> CloudFormationTemplate {
        let parameters = self
            .parameters
            .parameters()
            .map(|p| (p.name.clone(), p.clone()))
            .collect();

        let mappings = self
            .parameters
            .mappings()
            .map(|(name, table)| (name.to_string(), table.clone()))
            .collect();

        let conditions = self
            .resources
            .conditions()
            .map(|c| (c.name.clone(), c.expression.to_value()))
            .collect();

        let resources = resource_order
            .iter()
            .filter_map(|id| self.resources.resource(id))
            .map(|decl| {
                let resource = Resource {
                    resource_type: decl.resource_type.clone(),
                    properties: decl
                        .properties
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_value()))
                        .collect(),
                    depends_on: DependsOn::from_ids(&decl.depends_on),
                    condition: decl.condition.clone(),
                    update_policy: decl.update_policy.as_ref().map(Expression::to_value),
                };
                (decl.logical_id.clone(), resource)
            })
            .collect();

        let outputs = self
            .resources
            .outputs()
            .map(|o| {
                let output = Output {
                    value: o.value.to_value(),
                    description: o.description.clone(),
                    export: o.export.as_ref().map(|name| Export {
                        name: name.to_value(),
                    }),
                    condition: o.condition.clone(),
                };
                (o.name.clone(), output)
            })
            .collect();

        CloudFormationTemplate {
            aws_template_format_version: self.config.format_version.clone(),
            description: self.config.description.clone(),
            parameters,
            mappings,
            conditions,
            resources,
            outputs,
        }
    }

    /// Rebuild a builder from a parsed document.
    ///
    /// `Ref` targets are classified by the document's own resource keys; inside
    /// conditions every `Ref` is a parameter reference. Declarations go through
    /// the same checks as hand-written ones.
    pub fn from_document(document: &CloudFormationTemplate, schemas: SchemaRegistry) -> Result<Self> {
        let config = CompilerConfig {
            format_version: document.aws_template_format_version.clone(),
            description: document.description.clone(),
            ..CompilerConfig::default()
        };
        let mut builder = TemplateBuilder::new(schemas).with_config(config);
        let is_resource = |name: &str| document.resources.contains_key(name);
        let never_resource = |_: &str| false;

        for (name, parameter) in &document.parameters {
            let mut parameter = parameter.clone();
            parameter.name = name.clone();
            builder
                .declare_parameter(parameter)
                .with_context(|| format!("Invalid parameter '{}'", name))?;
        }

        for (name, table) in &document.mappings {
            builder
                .declare_mapping(name.as_str(), table.clone())
                .with_context(|| format!("Invalid mapping '{}'", name))?;
        }

        for (name, value) in &document.conditions {
            let expression = Expression::from_value(value, &never_resource)
                .with_context(|| format!("Invalid condition '{}'", name))?;
            builder
                .declare_condition(name.as_str(), expression)
                .with_context(|| format!("Invalid condition '{}'", name))?;
        }

        for (logical_id, resource) in &document.resources {
            let mut decl = ResourceDecl::new(logical_id.as_str(), resource.resource_type.as_str());
            for (name, value) in &resource.properties {
                let expression = Expression::from_value(value, &is_resource).with_context(|| {
                    format!("Invalid property '{}' on resource '{}'", name, logical_id)
                })?;
                decl = decl.with_property(name.as_str(), expression);
            }
            if let Some(policy) = &resource.update_policy {
                decl.update_policy = Some(Expression::from_value(policy, &is_resource).with_context(|| {
                    format!("Invalid UpdatePolicy on resource '{}'", logical_id)
                })?);
            }
            decl.condition = resource.condition.clone();
            decl.depends_on = resource
                .depends_on
                .as_ref()
                .map(DependsOn::to_vec)
                .unwrap_or_default();
            builder
                .declare_resource(decl)
                .with_context(|| format!("Invalid resource '{}'", logical_id))?;
        }

        for (name, output) in &document.outputs {
            let value = Expression::from_value(&output.value, &is_resource)
                .with_context(|| format!("Invalid value for output '{}'", name))?;
            let mut decl = OutputDecl::new(name.as_str(), value);
            decl.description = output.description.clone();
            decl.condition = output.condition.clone();
            if let Some(export) = &output.export {
                decl.export = Some(
                    Expression::from_value(&export.name, &is_resource)
                        .with_context(|| format!("Invalid export name for output '{}'", name))?,
                );
            }
            builder
                .declare_output(decl)
                .with_context(|| format!("Invalid output '{}'", name))?;
        }

        log_debug!(
            "Rebuilt template from document: {} resources",
            builder.resources.resource_count()
        );
        Ok(builder)
    }
}

/// The immutable result of a successful compile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    document: CloudFormationTemplate,
    resource_order: Vec<String>,
    output_format: OutputFormat,
}

impl CompiledTemplate {
    pub fn document(&self) -> &CloudFormationTemplate {
        &self.document
    }

    pub fn into_document(self) -> CloudFormationTemplate {
        self.document
    }

    /// Logical ids in deployment order.
    pub fn resource_order(&self) -> &[String] {
        &self.resource_order
    }

    pub fn to_json(&self) -> Result<String> {
        self.document.to_json_string()
    }

    pub fn to_yaml(&self) -> Result<String> {
        self.document.to_yaml_string()
    }

    /// Serialize in the configured output format.
    pub fn render(&self) -> Result<String> {
        self.document.render(self.output_format)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        self.document.to_file(path)
    }
}
