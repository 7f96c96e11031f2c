//! Findings extracted from scanner output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recognised finding categories, one per vulnerability scanner family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// Template-based scanner hits (nuclei).
    Template,
    /// Cross-site scripting hits (dalfox).
    Xss,
    /// Injection hits (sqlmap).
    Injection,
}

impl FindingCategory {
    /// All categories in report order.
    pub const ALL: [Self; 3] = [Self::Template, Self::Xss, Self::Injection];

    /// Human-readable heading.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Template => "Template scan findings",
            Self::Xss => "XSS findings",
            Self::Injection => "SQL injection findings",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Xss => write!(f, "xss"),
            Self::Injection => write!(f, "injection"),
        }
    }
}

/// One finding reported by one tool.
///
/// Findings are never merged across tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Tool that reported the finding.
    pub source_tool: String,
    /// Category the finding is counted under.
    pub category: FindingCategory,
    /// Severity, when the tool reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// URL, host or file the finding points at.
    pub target_locator: String,
    /// The raw evidence line.
    pub raw_excerpt: String,
}

impl Finding {
    /// Creates a new finding.
    #[must_use]
    pub fn new(
        source_tool: impl Into<String>,
        category: FindingCategory,
        target_locator: impl Into<String>,
        raw_excerpt: impl Into<String>,
    ) -> Self {
        Self {
            source_tool: source_tool.into(),
            category,
            severity: None,
            target_locator: target_locator.into(),
            raw_excerpt: raw_excerpt.into(),
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }
}
