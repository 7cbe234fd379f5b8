//! Compiler options, loadable from TOML.
//!
//! ```toml
//! format_version = "2010-09-09"
//! description = "Network stack"
//! worker_threads = 4
//! output_format = "yaml"
//! allow_pseudo_parameters = true
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FORMAT_VERSION: &str = "2010-09-09";

/// Serialization format of a compiled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    /// Format implied by a file extension. Anything that is not YAML is JSON.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("yaml") | Some("yml") => OutputFormat::Yaml,
            _ => OutputFormat::Json,
        }
    }
}

fn default_format_version() -> Option<String> {
    Some(DEFAULT_FORMAT_VERSION.to_string())
}

fn default_worker_threads() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Options for a template build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Written as `AWSTemplateFormatVersion`; `None` omits the key.
    #[serde(default = "default_format_version", skip_serializing_if = "Option::is_none")]
    pub format_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Threads used to validate expressions. 1 validates on the calling thread.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Whether `AWS::Region` and the other pseudo parameters resolve without
    /// being declared.
    #[serde(default = "default_true")]
    pub allow_pseudo_parameters: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            description: None,
            worker_threads: default_worker_threads(),
            output_format: OutputFormat::default(),
            allow_pseudo_parameters: true,
        }
    }
}

impl CompilerConfig {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CompilerConfig =
            toml::from_str(content).context("Failed to parse compiler configuration")?;
        Ok(config)
    }

    /// Load compiler options from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Save compiler options to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Worker count actually used, never zero.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.max(1)
    }
}
