//! Tool registry and PATH preflight.

use crate::config::{ReconConfig, ToolSpec};
use crate::errors::{Result, ToolMissingError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Which configured tools can actually be run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolAvailability {
    resolved: BTreeMap<String, PathBuf>,
    skipped: BTreeSet<String>,
}

impl ToolAvailability {
    /// Availability that assumes every tool is installed.
    #[must_use]
    pub fn assume_all() -> Self {
        Self::default()
    }

    /// Returns false only for optional tools that preflight could not find.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        !self.skipped.contains(name)
    }

    /// Resolved executable for a tool, when preflight ran.
    #[must_use]
    pub fn resolved(&self, name: &str) -> Option<&PathBuf> {
        self.resolved.get(name)
    }

    /// Optional tools that will be skipped.
    #[must_use]
    pub const fn skipped(&self) -> &BTreeSet<String> {
        &self.skipped
    }
}

/// The set of tools a run depends on.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every stage tool and the analyzer from configuration.
    #[must_use]
    pub fn from_config(config: &ReconConfig) -> Self {
        let mut registry = Self::new();
        for tool in config.tools.all().chain(config.analyzer.iter()) {
            registry.register(tool.clone());
        }
        registry
    }

    /// Registers a tool. Later registrations of the same name are ignored.
    pub fn register(&mut self, tool: ToolSpec) {
        if !self.tools.iter().any(|t| t.name == tool.name) {
            self.tools.push(tool);
        }
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolves every registered tool on `PATH`.
    ///
    /// A missing required tool fails the whole preflight with
    /// [`ToolMissingError`]; missing optional tools are reported as skipped.
    pub fn preflight(&self) -> Result<ToolAvailability> {
        let mut availability = ToolAvailability::default();
        let mut missing = Vec::new();

        for tool in &self.tools {
            match which::which(tool.program()) {
                Ok(path) => {
                    debug!(tool = %tool.name, path = %path.display(), "tool resolved");
                    availability.resolved.insert(tool.name.clone(), path);
                }
                Err(_) if tool.required => missing.push(tool.name.clone()),
                Err(_) => {
                    warn!(tool = %tool.name, "optional tool not installed, skipping");
                    availability.skipped.insert(tool.name.clone());
                }
            }
        }

        if missing.is_empty() {
            Ok(availability)
        } else {
            Err(ToolMissingError::new(missing).into())
        }
    }
}
