//! cfnsmith - CloudFormation template compiler
//!
//! cfnsmith turns a set of typed, cross-referencing resource declarations into a
//! deterministic CloudFormation template document. Callers declare parameters,
//! mappings, conditions, resources and outputs through a [`TemplateBuilder`];
//! each declaration is checked against the registered resource schemas as it is
//! made, and a final compile pass validates every intrinsic reference, builds the
//! resource dependency graph and emits the canonical document.
//!
//! # Architecture Overview
//!
//! - **Schema Registry** ([`app::cfn_schema`]): resource types, their properties and attributes
//! - **Parameters & Mappings** ([`app::cfn_parameters`]): typed inputs with constraints and lookup tables
//! - **Resource Registry** ([`app::cfn_resources`]): resources, conditions and outputs
//! - **Intrinsic Functions** ([`app::cfn_intrinsic_functions`]): the closed `Expression` algebra
//! - **Resolver** ([`app::cfn_resolver`]): global reference validation with accumulated diagnostics
//! - **Dependency Graph** ([`app::cfn_dag`]): cycle detection and deployment ordering
//! - **Template Assembly** ([`app::cfn_template`]): compile pass, document model and serialization
//!
//! # Getting Started
//!
//! ```rust
//! use cfnsmith::app::cfn_intrinsic_functions::Expression;
//! use cfnsmith::app::cfn_resources::ResourceDecl;
//! use cfnsmith::app::cfn_schema::{PropertyDef, ResourceType, SchemaRegistry, ValueKind};
//! use cfnsmith::TemplateBuilder;
//!
//! let mut schemas = SchemaRegistry::new();
//! schemas
//!     .register_type(
//!         ResourceType::new("AWS::EC2::VPC")
//!             .with_property(PropertyDef::required("CidrBlock", ValueKind::String))
//!             .with_primary_identifier("VpcId"),
//!     )
//!     .unwrap();
//!
//! let mut builder = TemplateBuilder::new(schemas);
//! builder
//!     .declare_resource(
//!         ResourceDecl::new("MyVpc", "AWS::EC2::VPC")
//!             .with_property("CidrBlock", Expression::string("10.0.0.0/16")),
//!     )
//!     .unwrap();
//!
//! let compiled = builder.compile().unwrap();
//! assert!(compiled.to_json().unwrap().contains("\"MyVpc\""));
//! ```

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;
pub mod logging;

pub use app::cfn_config::{CompilerConfig, OutputFormat};
pub use app::cfn_errors::{CompileReport, DeclarationError, Diagnostic, DiagnosticKind};
pub use app::cfn_template::{CloudFormationTemplate, CompiledTemplate, TemplateBuilder};
