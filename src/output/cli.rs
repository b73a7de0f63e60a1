use crate::model::{Report, Severity};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "CVSS")]
    cvss: String,
    #[tabled(rename = "Title")]
    title: String,
}

pub fn print_cli_table(report: &Report) -> Result<()> {
    print!("{}", render_table(report, true)?);
    Ok(())
}

/// Renders the table report. `colored` adds ANSI colours to severities and
/// should be off for anything that is not a terminal.
pub(crate) fn render_table(report: &Report, colored: bool) -> Result<String> {
    let mut out = String::new();

    writeln!(out)?;
    writeln!(
        out,
        "Scan of {} completed at: {}",
        report.root,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(
        out,
        "Checked {} coordinates in {} batches",
        report.coordinate_count, report.batch_count
    )?;
    writeln!(out)?;

    let mut rows: Vec<(Severity, VulnRow)> = report
        .vulnerable()
        .flat_map(|finding| {
            finding.vulnerabilities.iter().map(move |v| {
                let severity = v.severity();
                let row = VulnRow {
                    severity: format_severity(&severity, colored),
                    component: truncate(&finding.coordinates, 60),
                    id: v.label().to_string(),
                    cvss: v
                        .cvss_score
                        .map(|s| format!("{:.1}", s))
                        .unwrap_or_else(|| "-".to_string()),
                    title: truncate(v.title.as_deref().unwrap_or("Unknown vulnerability"), 50),
                };
                (severity, row)
            })
        })
        .collect();

    if rows.is_empty() {
        writeln!(out, "No known vulnerabilities found.")?;
    } else {
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        writeln!(out, "Found {} vulnerabilities:", rows.len())?;
        writeln!(out)?;
        let table = Table::new(rows.into_iter().map(|(_, row)| row))
            .with(Style::rounded())
            .to_string();
        writeln!(out, "{}", table)?;
    }

    let errors: Vec<_> = report.errors().collect();
    if !errors.is_empty() {
        writeln!(out)?;
        writeln!(out, "{} batch(es) could not be checked:", errors.len())?;
        for error in errors {
            writeln!(out, "  - {}", error.error)?;
        }
    }

    writeln!(out)?;
    write_summary(&mut out, report)?;
    Ok(out)
}

fn write_summary(out: &mut String, report: &Report) -> std::fmt::Result {
    let count = |level: Severity| {
        report
            .findings()
            .flat_map(|f| f.vulnerabilities.iter())
            .filter(|v| v.severity() == level)
            .count()
    };

    writeln!(out, "Summary:")?;
    writeln!(out, "  Components checked: {}", report.findings().count())?;
    writeln!(out, "  Vulnerable components: {}", report.vulnerable().count())?;
    writeln!(
        out,
        "  Vulnerabilities: {} critical, {} high, {} medium, {} low, {} unknown",
        count(Severity::Critical),
        count(Severity::High),
        count(Severity::Medium),
        count(Severity::Low),
        count(Severity::Unknown)
    )
}

fn format_severity(severity: &Severity, colored: bool) -> String {
    if !colored {
        return severity.to_string();
    }
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
