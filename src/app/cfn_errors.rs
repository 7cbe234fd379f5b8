//! Errors and diagnostics produced while building and compiling a template.
//!
//! Two kinds of failure exist, matching the two phases of a build:
//!
//! - [`DeclarationError`] is returned immediately by the call that declared
//!   something invalid (duplicate names, unknown resource types, schema
//!   violations, bad parameter constraints).
//! - [`Diagnostic`] values are collected by the compile pass for problems that
//!   are only visible once the whole template exists (unresolved references,
//!   dependency cycles). They are returned together in a [`CompileReport`] so a
//!   caller can fix every problem in one run.

use std::fmt;

use crate::app::cfn_parameters::ConstraintCheck;
use crate::app::cfn_schema::ValueKind;

/// Fail-fast error raised at the declaration call site.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationError {
    DuplicateTypeName(String),
    UnknownResourceType(String),
    DuplicateResourceId(String),
    MissingRequiredProperty {
        logical_id: String,
        resource_type: String,
        property: String,
    },
    UnknownProperty {
        logical_id: String,
        resource_type: String,
        property: String,
    },
    PropertyTypeMismatch {
        logical_id: String,
        property: String,
        expected: ValueKind,
        found: ValueKind,
    },
    DuplicateParameterName(String),
    InvalidParameterConstraint {
        parameter: String,
        check: ConstraintCheck,
        detail: String,
    },
    DuplicateMappingName(String),
    EmptyMapping(String),
    InconsistentMappingShape {
        mapping: String,
        top_key: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    DuplicateConditionName(String),
    DuplicateOutputName(String),
}

impl fmt::Display for DeclarationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationError::DuplicateTypeName(name) => {
                write!(f, "Resource type '{}' is already registered", name)
            }
            DeclarationError::UnknownResourceType(name) => {
                write!(f, "Unknown resource type '{}'", name)
            }
            DeclarationError::DuplicateResourceId(id) => {
                write!(f, "Logical id '{}' is already used by another resource", id)
            }
            DeclarationError::MissingRequiredProperty {
                logical_id,
                resource_type,
                property,
            } => write!(
                f,
                "Resource '{}' ({}) is missing required property '{}'",
                logical_id, resource_type, property
            ),
            DeclarationError::UnknownProperty {
                logical_id,
                resource_type,
                property,
            } => write!(
                f,
                "Resource '{}' sets property '{}' which is not defined for {}",
                logical_id, property, resource_type
            ),
            DeclarationError::PropertyTypeMismatch {
                logical_id,
                property,
                expected,
                found,
            } => write!(
                f,
                "Resource '{}' property '{}' expects {} but a {} literal was given",
                logical_id, property, expected, found
            ),
            DeclarationError::DuplicateParameterName(name) => {
                write!(f, "Parameter '{}' is already declared", name)
            }
            DeclarationError::InvalidParameterConstraint {
                parameter,
                check,
                detail,
            } => write!(
                f,
                "Parameter '{}' fails {} check: {}",
                parameter, check, detail
            ),
            DeclarationError::DuplicateMappingName(name) => {
                write!(f, "Mapping '{}' is already declared", name)
            }
            DeclarationError::EmptyMapping(name) => {
                write!(f, "Mapping '{}' has no entries", name)
            }
            DeclarationError::InconsistentMappingShape {
                mapping,
                top_key,
                expected,
                found,
            } => write!(
                f,
                "Mapping '{}' entry '{}' has keys [{}], expected [{}]",
                mapping,
                top_key,
                found.join(", "),
                expected.join(", ")
            ),
            DeclarationError::DuplicateConditionName(name) => {
                write!(f, "Condition '{}' is already declared", name)
            }
            DeclarationError::DuplicateOutputName(name) => {
                write!(f, "Output '{}' is already declared", name)
            }
        }
    }
}

impl std::error::Error for DeclarationError {}

/// The kind of entity an unresolved reference was expected to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentKind {
    Parameter,
    Resource,
    Attribute,
    Mapping,
    MappingKey,
    Condition,
}

impl fmt::Display for ReferentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferentKind::Parameter => "parameter",
            ReferentKind::Resource => "resource",
            ReferentKind::Attribute => "attribute",
            ReferentKind::Mapping => "mapping",
            ReferentKind::MappingKey => "mapping key",
            ReferentKind::Condition => "condition",
        };
        f.write_str(name)
    }
}

/// Category of a compile-time diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    UnresolvedReference(ReferentKind),
    SelectIndexOutOfRange,
    AmbiguousReference,
    CyclicDependency { cycle: Vec<String> },
    SerializationFailure,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::UnresolvedReference(kind) => {
                write!(f, "UnresolvedReference({})", kind)
            }
            DiagnosticKind::SelectIndexOutOfRange => f.write_str("SelectIndexOutOfRange"),
            DiagnosticKind::AmbiguousReference => f.write_str("AmbiguousReference"),
            DiagnosticKind::CyclicDependency { .. } => f.write_str("CyclicDependency"),
            DiagnosticKind::SerializationFailure => f.write_str("SerializationFailure"),
        }
    }
}

/// Template section a diagnostic belongs to.
///
/// The variant order is the order diagnostics are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Resources,
    Conditions,
    Outputs,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Resources => "Resources",
            Section::Conditions => "Conditions",
            Section::Outputs => "Outputs",
        };
        f.write_str(name)
    }
}

/// Where a diagnostic was found: section, owning name and expression path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub section: Section,
    pub name: String,
    /// Dotted path into the declaration, e.g. `Properties.VpcId.Fn::Join[1][0]`.
    pub path: String,
}

impl Location {
    pub fn new(section: Section, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            section,
            name: name.into(),
            path: path.into(),
        }
    }

    /// Location of a nested element below this one.
    ///
    /// Index segments (`[0]`) are appended directly, names are joined with a dot.
    pub fn child(&self, segment: &str) -> Self {
        let path = if self.path.is_empty() {
            segment.to_string()
        } else if segment.starts_with('[') {
            format!("{}{}", self.path, segment)
        } else {
            format!("{}.{}", self.path, segment)
        };
        Self {
            section: self.section,
            name: self.name.clone(),
            path,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}.{}", self.section, self.name)
        } else {
            write!(f, "{}.{}.{}", self.section, self.name, self.path)
        }
    }
}

/// A single problem found by the compile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            location,
            message: message.into(),
        }
    }

    pub fn unresolved(referent: ReferentKind, location: Location, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::UnresolvedReference(referent), location, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Sort diagnostics into their reporting order.
///
/// Resources come first (by logical id), then conditions, then outputs; within
/// one owner, by path and message.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then_with(|| a.message.cmp(&b.message))
    });
}

/// Every diagnostic found by one compile pass, in deterministic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    diagnostics: Vec<Diagnostic>,
}

impl CompileReport {
    pub fn new(mut diagnostics: Vec<Diagnostic>) -> Self {
        sort_diagnostics(&mut diagnostics);
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics matching a predicate on their kind.
    pub fn filter_kind<F>(&self, predicate: F) -> Vec<&Diagnostic>
    where
        F: Fn(&DiagnosticKind) -> bool,
    {
        self.diagnostics
            .iter()
            .filter(|d| predicate(&d.kind))
            .collect()
    }

    /// Cycles reported by the dependency graph, in report order.
    pub fn cycles(&self) -> Vec<&[String]> {
        self.diagnostics
            .iter()
            .filter_map(|d| match &d.kind {
                DiagnosticKind::CyclicDependency { cycle } => Some(cycle.as_slice()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Template compilation failed with {} diagnostic(s):",
            self.diagnostics.len()
        )?;
        for diagnostic in &self.diagnostics {
            writeln!(f, "  - {}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileReport {}
