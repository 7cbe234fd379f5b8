//! Core compiler modules for cfnsmith.
//!
//! # Module Organization
//!
//! ## Registries (declaration time)
//! - [`cfn_schema`] - Resource type definitions, loaded from code or resource specification JSON
//! - [`cfn_parameters`] - Parameters with constraint checking and mapping tables
//! - [`cfn_resources`] - Resources, conditions and outputs validated against the schemas
//!
//! ## Compile pass
//! - [`cfn_intrinsic_functions`] - The intrinsic `Expression` algebra and its JSON form
//! - [`cfn_resolver`] - Reference validation producing accumulated diagnostics
//! - [`cfn_dag`] - Dependency graph, cycle detection and topological ordering
//! - [`cfn_template`] - Builder, compile pass, document model and serialization
//!
//! ## Support
//! - [`cfn_errors`] - Declaration errors and compile diagnostics
//! - [`cfn_config`] - Compiler options

pub mod cfn_config;
pub mod cfn_dag;
pub mod cfn_errors;
pub mod cfn_intrinsic_functions;
pub mod cfn_parameters;
pub mod cfn_resolver;
pub mod cfn_resources;
pub mod cfn_schema;
pub mod cfn_template;
