//! Report rendering.
//!
//! Renderers are pure functions of their inputs: the generation time is
//! passed in, so identical artifacts always produce identical text.

mod developer;

pub use developer::render_developer_report;

use crate::aggregate::VulnerabilityCount;
use crate::config::ReportConfig;
use crate::core::{Finding, FindingCategory};
use crate::errors::Result;
use crate::session::{Area, ArtifactStore, Session};
use crate::utils::{count_lines, format_iso8601, Timestamp};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Write};
use std::path::PathBuf;

/// Report file inside [`Area::Reports`].
pub const REPORT_FILE: &str = "report.md";

/// Longest scanner excerpt copied into a report, in characters.
const MAX_EXCERPT_CHARS: usize = 500;

/// Consolidated stage artifacts the statistics are read from.
pub mod artifacts {
    /// Merged subdomain list (recon area).
    pub const SUBDOMAINS: &str = "all_subdomains.txt";
    /// Merged live host list (alive area).
    pub const ALIVE: &str = "all_alive.txt";
    /// Merged URL list (urls area).
    pub const URLS: &str = "all_urls.txt";
    /// Capped parametrized URL list (urls area).
    pub const PARAMS: &str = "params.txt";
    /// Analyzer output (vulnerabilities area).
    pub const ANALYSIS: &str = "analysis.txt";
}

/// Urgency derived from the vulnerability count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nothing found.
    Clean,
    /// One to three findings.
    Medium,
    /// More than three findings.
    High,
}

impl Priority {
    /// Classifies a vulnerability count.
    ///
    /// # Examples
    ///
    /// ```
    /// use reconflow::report::Priority;
    ///
    /// assert_eq!(Priority::from_count(0), Priority::Clean);
    /// assert_eq!(Priority::from_count(3), Priority::Medium);
    /// assert_eq!(Priority::from_count(4), Priority::High);
    /// ```
    #[must_use]
    pub const fn from_count(count: u64) -> Self {
        match count {
            0 => Self::Clean,
            1..=3 => Self::Medium,
            _ => Self::High,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "CLEAN"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Sizes of the consolidated stage artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Distinct subdomains.
    pub subdomains: usize,
    /// Live hosts.
    pub alive_hosts: usize,
    /// Distinct URLs.
    pub urls: usize,
    /// Parametrized URLs handed to injection scanners.
    pub parametrized_urls: usize,
}

impl SessionStats {
    /// Reads the statistics from a session. Missing artifacts count as zero.
    pub fn collect(store: &ArtifactStore) -> Result<Self> {
        let lines = |area, name| -> Result<usize> { Ok(count_lines(&store.path(area, name)?)?) };
        Ok(Self {
            subdomains: lines(Area::Recon, artifacts::SUBDOMAINS)?,
            alive_hosts: lines(Area::Alive, artifacts::ALIVE)?,
            urls: lines(Area::Urls, artifacts::URLS)?,
            parametrized_urls: lines(Area::Urls, artifacts::PARAMS)?,
        })
    }
}

/// Everything the operator report is rendered from.
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    /// The session being reported.
    pub session: &'a Session,
    /// Per-category counts.
    pub count: &'a VulnerabilityCount,
    /// Extracted findings in stable order.
    pub findings: &'a [Finding],
    /// Stage artifact sizes.
    pub stats: SessionStats,
    /// Output of the analysis collaborator, if it ran.
    pub analysis: Option<&'a str>,
    /// Embedded generation time.
    pub generated_at: Timestamp,
}

/// Renders the operator report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    max_excerpts: usize,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new(&ReportConfig::default())
    }
}

impl ReportGenerator {
    /// Creates a generator with the configured excerpt limit.
    #[must_use]
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            max_excerpts: config.max_excerpts_per_tool,
        }
    }

    /// Renders the report text. Never fails.
    #[must_use]
    pub fn render(&self, input: &ReportInput<'_>) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_report(&mut out, input);
        out
    }

    /// Renders the report into `reports/report.md`.
    pub fn write(&self, store: &ArtifactStore, input: &ReportInput<'_>) -> Result<PathBuf> {
        store.write(Area::Reports, REPORT_FILE, self.render(input))
    }

    fn write_report(&self, out: &mut String, input: &ReportInput<'_>) -> fmt::Result {
        let total = input.count.total();
        let priority = Priority::from_count(total);

        writeln!(out, "# Reconnaissance report: {}", input.session.target)?;
        writeln!(out)?;
        writeln!(out, "- Session: {}", input.session.id)?;
        writeln!(out, "- Generated: {}", format_iso8601(&input.generated_at))?;
        writeln!(out, "- Priority: {priority}")?;
        writeln!(out, "- Vulnerability count: {total}")?;
        writeln!(out)?;

        writeln!(out, "## Scan summary")?;
        writeln!(out)?;
        writeln!(out, "| Stage artifact | Count |")?;
        writeln!(out, "|---|---|")?;
        writeln!(out, "| Subdomains | {} |", input.stats.subdomains)?;
        writeln!(out, "| Alive hosts | {} |", input.stats.alive_hosts)?;
        writeln!(out, "| URLs | {} |", input.stats.urls)?;
        writeln!(out, "| Parametrized URLs | {} |", input.stats.parametrized_urls)?;
        writeln!(out)?;

        writeln!(out, "## Findings per category")?;
        writeln!(out)?;
        writeln!(out, "| Category | Count |")?;
        writeln!(out, "|---|---|")?;
        for category in FindingCategory::ALL {
            writeln!(out, "| {category} | {} |", input.count.get(category))?;
        }
        writeln!(out)?;

        if total == 0 {
            writeln!(out, "## No critical findings")?;
            writeln!(out)?;
            writeln!(
                out,
                "The vulnerability scanners reported nothing for this session."
            )?;
            writeln!(out)?;
        } else {
            self.write_findings(out, input.findings)?;
        }

        if let Some(notes) = input.analysis.map(str::trim).filter(|n| !n.is_empty()) {
            writeln!(out, "## Analysis notes")?;
            writeln!(out)?;
            writeln!(out, "{notes}")?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_findings(&self, out: &mut String, findings: &[Finding]) -> fmt::Result {
        let mut number = 0;
        for category in FindingCategory::ALL {
            let in_category: Vec<&Finding> =
                findings.iter().filter(|f| f.category == category).collect();
            if in_category.is_empty() {
                continue;
            }
            writeln!(out, "## {}", category.title())?;
            writeln!(out)?;
            for finding in in_category.iter().take(self.max_excerpts) {
                number += 1;
                writeln!(out, "### Finding {number}: {}", finding.target_locator)?;
                writeln!(out)?;
                writeln!(out, "- Tool: {}", finding.source_tool)?;
                if let Some(severity) = &finding.severity {
                    writeln!(out, "- Severity: {severity}")?;
                }
                writeln!(out)?;
                let excerpt = clip(&finding.raw_excerpt);
                let fence = fence_for(&excerpt);
                writeln!(out, "{fence}")?;
                writeln!(out, "{excerpt}")?;
                writeln!(out, "{fence}")?;
                writeln!(out)?;
            }
            let hidden = in_category.len().saturating_sub(self.max_excerpts);
            if hidden > 0 {
                writeln!(out, "_... and {hidden} more_")?;
                writeln!(out)?;
            }
        }
        Ok(())
    }
}

/// Cuts an excerpt to [`MAX_EXCERPT_CHARS`], marking the cut with `...`.
fn clip(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((end, _)) => Cow::Owned(format!("{}...", &text[..end])),
        None => Cow::Borrowed(text),
    }
}

fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}

/// A code fence no line of `text` can close.
fn fence_for(text: &str) -> String {
    "`".repeat((longest_backtick_run(text) + 1).max(3))
}

/// An inline code span holding `text` verbatim.
fn code_span(text: &str) -> String {
    let ticks = "`".repeat(longest_backtick_run(text) + 1);
    if text.starts_with('`') || text.ends_with('`') {
        format!("{ticks} {text} {ticks}")
    } else {
        format!("{ticks}{text}{ticks}")
    }
}
