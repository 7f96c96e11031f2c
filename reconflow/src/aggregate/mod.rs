//! Merging, filtering and counting of tool output.
//!
//! Counting rules, per category:
//!
//! | Category  | Source                                   | Rule                                  |
//! |-----------|------------------------------------------|---------------------------------------|
//! | template  | `vulnerabilities/nuclei_results.txt`     | distinct non-blank lines              |
//! | xss       | `vulnerabilities/dalfox_results.txt`     | distinct non-blank lines              |
//! | injection | `vulnerabilities/sqlmap/**`              | one per non-empty `.csv`/`.txt` file  |
//!
//! The vulnerability count is the sum over the three categories. Findings
//! are never deduplicated across tools.

use crate::core::{Finding, FindingCategory};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Result file of the template scanner.
pub const TEMPLATE_RESULTS: &str = "nuclei_results.txt";
/// Result file of the XSS scanner.
pub const XSS_RESULTS: &str = "dalfox_results.txt";
/// Output directory of the injection scanner.
pub const INJECTION_DIR: &str = "sqlmap";

const SEVERITIES: [&str; 5] = ["critical", "high", "medium", "low", "info"];

/// Per-category finding counts for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityCount {
    per_category: BTreeMap<FindingCategory, u64>,
}

impl VulnerabilityCount {
    /// Tallies findings by category.
    #[must_use]
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut count = Self::default();
        for finding in findings {
            *count.per_category.entry(finding.category).or_insert(0) += 1;
        }
        count
    }

    /// Count for one category.
    #[must_use]
    pub fn get(&self, category: FindingCategory) -> u64 {
        self.per_category.get(&category).copied().unwrap_or(0)
    }

    /// Sum over all categories.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.per_category.values().sum()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Merges line artifacts: concatenation, exact-line dedupe, sorted output.
///
/// Missing files contribute nothing.
pub fn combine<P: AsRef<Path>>(artifacts: &[P]) -> io::Result<Vec<String>> {
    let mut merged = BTreeSet::new();
    for path in artifacts {
        merged.extend(crate::utils::read_lines(path.as_ref())?);
    }
    Ok(merged.into_iter().collect())
}

/// Keeps entries carrying a query string.
///
/// # Examples
///
/// ```
/// use reconflow::aggregate::extract_parametrized;
///
/// let urls = vec![
///     "https://example.com/".to_string(),
///     "https://example.com/search?q=1".to_string(),
/// ];
/// assert_eq!(extract_parametrized(&urls), vec!["https://example.com/search?q=1"]);
/// ```
#[must_use]
pub fn extract_parametrized(urls: &[String]) -> Vec<String> {
    urls.iter().filter(|u| u.contains('?')).cloned().collect()
}

/// Maps a vulnerability-stage tool to its counted category.
#[must_use]
pub fn category_for_tool(tool: &str) -> Option<FindingCategory> {
    match tool {
        "nuclei" => Some(FindingCategory::Template),
        "dalfox" => Some(FindingCategory::Xss),
        "sqlmap" => Some(FindingCategory::Injection),
        _ => None,
    }
}

/// Extracts every finding from a session's vulnerability directory.
///
/// Order is stable: category order, then sorted raw line (or file path).
pub fn collect_findings(vuln_dir: &Path) -> io::Result<Vec<Finding>> {
    let mut findings = Vec::new();

    for line in distinct_lines(&vuln_dir.join(TEMPLATE_RESULTS))? {
        findings.push(parse_template_line(&line));
    }
    for line in distinct_lines(&vuln_dir.join(XSS_RESULTS))? {
        findings.push(parse_xss_line(&line));
    }

    let injection_root = vuln_dir.join(INJECTION_DIR);
    let mut evidence = Vec::new();
    collect_injection_files(&injection_root, &mut evidence)?;
    evidence.sort();
    for path in evidence {
        let relative = path
            .strip_prefix(&injection_root)
            .unwrap_or(&path)
            .display()
            .to_string();
        findings.push(Finding::new(
            "sqlmap",
            FindingCategory::Injection,
            relative.clone(),
            format!("potential SQL injection evidence in {relative}"),
        ));
    }

    Ok(findings)
}

/// Computes the vulnerability count of a session's vulnerability directory.
pub fn count(vuln_dir: &Path) -> io::Result<VulnerabilityCount> {
    Ok(VulnerabilityCount::from_findings(&collect_findings(vuln_dir)?))
}

fn distinct_lines(path: &Path) -> io::Result<BTreeSet<String>> {
    Ok(crate::utils::read_lines(path)?.into_iter().collect())
}

fn collect_injection_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            collect_injection_files(&path, out)?;
        } else if meta.len() > 0
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("txt"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[A-Za-z][A-Za-z0-9+.-]*://\S+").ok())
        .as_ref()
}

fn bracket_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[([^\]]+)\]").ok())
        .as_ref()
}

fn locator(line: &str) -> String {
    url_pattern()
        .and_then(|re| re.find(line))
        .map_or_else(
            || line.split_whitespace().last().unwrap_or(line).to_string(),
            |m| m.as_str().to_string(),
        )
}

/// `[template-id] [proto] [severity] https://host/path ...`
fn parse_template_line(line: &str) -> Finding {
    let severity = bracket_pattern().and_then(|re| {
        re.captures_iter(line)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .find(|tag| SEVERITIES.contains(&tag.as_str()))
    });
    let finding = Finding::new("nuclei", FindingCategory::Template, locator(line), line);
    match severity {
        Some(severity) => finding.with_severity(severity),
        None => finding,
    }
}

/// `[POC][G][GET] https://host/path?q=payload`
fn parse_xss_line(line: &str) -> Finding {
    Finding::new("dalfox", FindingCategory::Xss, locator(line), line)
}
