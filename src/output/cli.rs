use crate::model::{AuditReport, Coordinate, PolicyResult, PolicyVerdict, Severity};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Advisory")]
    advisory: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Title")]
    title: String,
}

#[derive(Tabled)]
struct UpdateRow {
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Update")]
    update: String,
    #[tabled(rename = "Type")]
    update_type: String,
}

#[derive(Tabled)]
struct InvalidRow {
    #[tabled(rename = "Package")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

pub fn print_cli_table(report: &AuditReport) -> Result<()> {
    print!("{}", render_table(report)?);
    Ok(())
}

pub(crate) fn render_table(report: &AuditReport) -> Result<String> {
    let mut out = String::new();

    writeln!(out)?;
    writeln!(
        out,
        "Audit completed at: {}",
        report.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(out)?;

    if report.vulnerable.is_empty() {
        writeln!(out, "No vulnerable packages found.")?;
    } else {
        writeln!(out, "Found {} vulnerable packages:", report.vulnerable.len())?;
        writeln!(out)?;

        let mut rows: Vec<(Severity, VulnRow)> = report
            .vulnerable
            .values()
            .flat_map(|rec| {
                rec.vulnerable.active_vulnerabilities().map(|v| {
                    (
                        v.severity(),
                        VulnRow {
                            severity: format_severity(&v.severity()),
                            package: truncate(&rec.vulnerable.coordinates, 50),
                            advisory: v.cve.clone().unwrap_or_else(|| v.id.clone()),
                            score: format!("{:.1}", v.cvss_score),
                            title: truncate(&v.title, 50),
                        },
                    )
                })
            })
            .collect();
        rows.sort_by(|a, b| b.0.cmp(&a.0));

        let table = Table::new(rows.into_iter().map(|(_, row)| row))
            .with(Style::rounded())
            .to_string();
        writeln!(out, "{}", table)?;
    }

    let updates: Vec<UpdateRow> = report
        .vulnerable
        .values()
        .filter_map(|rec| {
            let update = rec.update.as_ref()?;
            let current = Coordinate::from_raw(rec.vulnerable.coordinates.as_str());
            let latest = Coordinate::from_raw(update.coordinates.as_str());
            Some(UpdateRow {
                package: truncate(current.name(), 50),
                current: current.version().to_string(),
                update: latest.version().to_string(),
                update_type: classify_update(current.version(), latest.version()),
            })
        })
        .collect();

    if !updates.is_empty() {
        writeln!(out)?;
        writeln!(out, "Non-vulnerable updates available for {} packages:", updates.len())?;
        writeln!(out)?;
        let table = Table::new(updates).with(Style::rounded()).to_string();
        writeln!(out, "{}", table)?;
    }

    if !report.invalid.is_empty() {
        writeln!(out)?;
        writeln!(out, "Skipped {} packages without a usable version:", report.invalid.len())?;
        writeln!(out)?;
        let rows: Vec<InvalidRow> = report
            .invalid
            .iter()
            .map(|i| InvalidRow {
                name: truncate(&i.project.name, 50),
                version: format_version(&i.project.version),
                reason: i.reason.clone(),
            })
            .collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        writeln!(out, "{}", table)?;
    }

    writeln!(out)?;
    write_summary(&mut out, report)?;
    Ok(out)
}

fn write_summary(out: &mut String, report: &AuditReport) -> std::fmt::Result {
    writeln!(out, "Summary:")?;
    writeln!(
        out,
        "  Audited packages: {} of {}",
        report.audited.len(),
        report.total_input
    )?;
    writeln!(out, "  Vulnerable packages: {}", report.vulnerable_count())?;

    let excluded = report.excluded_count();
    if excluded > 0 {
        writeln!(out, "  Excluded vulnerabilities: {}", excluded)?;
    }
    if !report.invalid.is_empty() {
        writeln!(out, "  Invalid versions: {}", report.invalid.len())?;
    }
    Ok(())
}

pub fn print_policy_result(result: &PolicyResult, server_url: &str) {
    let verdict = match result.verdict() {
        PolicyVerdict::Pass => "\x1b[32mPASS\x1b[0m",
        PolicyVerdict::Warning => "\x1b[33mWARNING\x1b[0m",
        PolicyVerdict::Violation => "\x1b[31mFAILURE\x1b[0m",
    };

    println!();
    println!("Policy evaluation: {}", verdict);
    if !result.report_html_url.is_empty() {
        println!(
            "Report: {}/{}",
            server_url.trim_end_matches('/'),
            result.report_html_url.trim_start_matches('/')
        );
    }
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::None => "NONE".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn format_version(version: &str) -> String {
    if version.is_empty() {
        "-".to_string()
    } else {
        version.to_string()
    }
}

/// Classify version update as major, minor, or patch
fn classify_update(current: &str, latest: &str) -> String {
    match (
        semver::Version::parse(current.trim_start_matches('v')),
        semver::Version::parse(latest.trim_start_matches('v')),
    ) {
        (Ok(c), Ok(l)) if l.major > c.major => "MAJOR".to_string(),
        (Ok(c), Ok(l)) if l.minor > c.minor => "minor".to_string(),
        _ => "patch".to_string(),
    }
}
