//! Remediation-oriented report for the target's developers.

use super::{clip, code_span, Priority};
use crate::core::{Finding, FindingCategory};
use crate::utils::{format_iso8601, Timestamp};
use std::fmt::{self, Write};

const MAX_EXCERPTS: usize = 5;

const RECOMMENDED_ACTIONS: [&str; 5] = [
    "Immediate review: manually verify every finding listed above.",
    "Impact assessment: evaluate the business impact of each confirmed issue.",
    "Remediation planning: schedule fixes in order of severity.",
    "Security testing: run automated scanning as part of CI.",
    "Code review: tighten secure coding and peer review practices.",
];

const DISCLOSURE_TERMS: [&str; 4] = [
    "Treat this information as confidential.",
    "Address vulnerabilities in order of severity.",
    "Implement fixes within a reasonable timeframe.",
    "Notify the reporter once remediation is complete.",
];

/// Renders the report sent to developers after approval.
///
/// Only the findings handed over by the pipeline are rendered; the approval
/// unit never reads scanner output itself.
#[must_use]
pub fn render_developer_report(
    target: &str,
    vuln_count: u64,
    findings: &[Finding],
    generated_at: Timestamp,
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, target, vuln_count, findings, generated_at);
    out
}

fn write_report(
    out: &mut String,
    target: &str,
    vuln_count: u64,
    findings: &[Finding],
    generated_at: Timestamp,
) -> fmt::Result {
    writeln!(out, "# Security vulnerability report: {target}")?;
    writeln!(out)?;
    writeln!(out, "## Executive summary")?;
    writeln!(out)?;
    writeln!(
        out,
        "An automated security assessment of {target} identified {vuln_count} potential \
         vulnerabilities that require your attention."
    )?;
    writeln!(out)?;
    writeln!(out, "- Assessment date: {}", format_iso8601(&generated_at))?;
    writeln!(out, "- Priority: {}", Priority::from_count(vuln_count))?;
    writeln!(out, "- Scope: automated vulnerability discovery and analysis")?;
    writeln!(out)?;

    writeln!(out, "## Vulnerability findings")?;
    writeln!(out)?;
    for category in FindingCategory::ALL {
        let in_category: Vec<&Finding> =
            findings.iter().filter(|f| f.category == category).collect();
        if in_category.is_empty() {
            continue;
        }
        writeln!(out, "### {}", category.title())?;
        writeln!(out)?;
        for finding in in_category.iter().take(MAX_EXCERPTS) {
            let excerpt = code_span(&clip(&finding.raw_excerpt));
            match &finding.severity {
                Some(severity) => writeln!(out, "- [{severity}] {excerpt}")?,
                None => writeln!(out, "- {excerpt}")?,
            }
        }
        if in_category.len() > MAX_EXCERPTS {
            writeln!(
                out,
                "- _... and {} additional findings of this type_",
                in_category.len() - MAX_EXCERPTS
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Recommended actions")?;
    writeln!(out)?;
    for (i, action) in RECOMMENDED_ACTIONS.iter().enumerate() {
        writeln!(out, "{}. {action}", i + 1)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "This assessment was produced with automated tools. Manual verification may be \
         required to confirm exploitability."
    )?;
    writeln!(out)?;

    writeln!(out, "## Responsible disclosure")?;
    writeln!(out)?;
    writeln!(out, "This report is provided under responsible disclosure guidelines. Please:")?;
    writeln!(out)?;
    for term in DISCLOSURE_TERMS {
        writeln!(out, "- {term}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn test_sections_present() {
        let findings = vec![
            Finding::new("nuclei", FindingCategory::Template, "https://a/", "[x] [http] [high] https://a/")
                .with_severity("high"),
            Finding::new("sqlmap", FindingCategory::Injection, "a/log.csv", "potential SQL injection evidence in a/log.csv"),
        ];
        let report = render_developer_report("example.com", 2, &findings, at());

        for heading in [
            "# Security vulnerability report: example.com",
            "## Executive summary",
            "### Template scan findings",
            "### SQL injection findings",
            "## Recommended actions",
            "## Responsible disclosure",
        ] {
            assert!(report.contains(heading), "missing {heading}");
        }
        assert!(!report.contains("### XSS findings"));
        assert!(report.contains("- [high] `[x] [http] [high] https://a/`"));
        assert!(report.contains("identified 2 potential"));
    }

    #[test]
    fn test_additional_findings_line() {
        let findings: Vec<Finding> = (0..8)
            .map(|i| Finding::new("dalfox", FindingCategory::Xss, format!("u{i}"), format!("poc {i}")))
            .collect();
        let report = render_developer_report("example.com", 8, &findings, at());
        assert_eq!(report.matches("`poc ").count(), 5);
        assert!(report.contains("_... and 3 additional findings of this type_"));
        assert!(report.contains("- Priority: HIGH"));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            render_developer_report("t", 0, &[], at()),
            render_developer_report("t", 0, &[], at())
        );
    }
}
