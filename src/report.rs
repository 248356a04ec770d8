//! Output formatting for run summaries and analyzer self-checks.
//!
//! Two formats:
//! - Pretty: colored terminal output
//! - JSON: structured output for scripts

use colored::*;
use serde::Serialize;

use crate::analyzers::selfcheck::FixtureReport;
use crate::orchestrator::RunSummary;

/// JSON envelope for a finished run.
#[derive(Serialize)]
pub struct JsonRunReport<'a> {
    pub version: &'static str,
    pub config: String,
    pub output: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub summary: &'a RunSummary,
}

/// JSON envelope for `analyzers --check`.
#[derive(Serialize)]
pub struct JsonCheckReport<'a> {
    pub version: &'static str,
    pub passed: bool,
    pub analyzers: &'a [FixtureReport],
}

/// Write a run summary as JSON to stdout.
pub fn write_run_json(
    config_path: &str,
    output: &str,
    warnings: &[String],
    summary: &RunSummary,
) -> anyhow::Result<()> {
    let report = JsonRunReport {
        version: env!("CARGO_PKG_VERSION"),
        config: config_path.to_string(),
        output: output.to_string(),
        warnings: warnings.to_vec(),
        summary,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Write a run summary for a terminal.
pub fn write_run_pretty(config_path: &str, output: &str, warnings: &[String], summary: &RunSummary) {
    write_header();

    print!("  {}", "Repository: ".dimmed());
    println!("{}", summary.repository);
    print!("  {}", "Config:     ".dimmed());
    println!("{}", config_path);
    print!("  {}", "Output:     ".dimmed());
    println!("{}", output);
    print!("  {}", "Mode:       ".dimmed());
    println!("{}", summary.mode);
    println!();

    if !warnings.is_empty() {
        println!("  {} ({}):", "Warnings".yellow().bold(), warnings.len());
        for warning in warnings {
            println!("    {}", warning);
        }
        println!();
    }

    println!("  {}", "File versions:".bold());
    write_count("processed", summary.processed, Tone::Good);
    write_count("skipped", summary.skipped, Tone::Plain);
    write_count("failed", summary.failed, Tone::Bad);
    write_count("excluded", summary.excluded, Tone::Plain);
    write_count("unclassified", summary.unclassified, Tone::Warn);
    println!();

    println!("  {}", "Rows:".bold());
    write_count("commits read", summary.commits, Tone::Plain);
    write_count("results", summary.results_written, Tone::Good);
    write_count("duplicates", summary.duplicates, Tone::Warn);
    if summary.snapshots_written > 0 {
        write_count("snapshots", summary.snapshots_written, Tone::Plain);
    }
    println!();

    if summary.cancelled {
        println!(
            "  {}  {}",
            "INTERRUPTED".yellow().bold(),
            "rerun with --resume to continue".dimmed()
        );
    } else {
        println!("  {}", "DONE".green().bold());
    }
    println!();
}

/// Write fixture results as JSON to stdout.
pub fn write_check_json(reports: &[FixtureReport]) -> anyhow::Result<()> {
    let report = JsonCheckReport {
        version: env!("CARGO_PKG_VERSION"),
        passed: reports.iter().all(FixtureReport::is_ok),
        analyzers: reports,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Write fixture results for a terminal. With `details` off only the
/// registry listing is shown.
pub fn write_check_pretty(reports: &[FixtureReport], details: bool) {
    write_header();
    println!("  {} ({}):", "Analyzers".bold(), reports.len());
    println!();

    for report in reports {
        if !details {
            print!("    {:<28}", report.key.as_str().cyan());
            print!("{:<11}", report.namespace.as_str().dimmed());
            println!("{}", report.description);
            continue;
        }

        if report.is_ok() {
            print!("    {} ", "PASS".green());
        } else {
            print!("    {} ", "FAIL".red());
        }
        print!("{:<28}", report.key.as_str().cyan());
        print!("{:<11}", report.namespace.as_str().dimmed());
        println!("{} fixture(s) passed", report.passed);

        if let Some(ref error) = report.build_error {
            println!("         {}", error.red());
        }
        for failure in &report.failures {
            println!(
                "         {}: expected {} got {}",
                failure.case.as_str().yellow(),
                failure.expected_count,
                failure.actual_count
            );
            if failure.expected_detail != failure.actual_detail {
                println!(
                    "         {}",
                    format!(
                        "detail expected {} got {}",
                        detail_text(&failure.expected_detail),
                        detail_text(&failure.actual_detail)
                    )
                    .dimmed()
                );
            }
        }
    }

    if details {
        println!();
        let failed = reports.iter().filter(|r| !r.is_ok()).count();
        if failed == 0 {
            println!("  {}", "PASSED".green());
        } else {
            println!("  {} ({} analyzer(s))", "FAILED".red(), failed);
        }
    }
    println!();
}

fn write_header() {
    println!();
    print!("  ");
    print!("{}", "git2base".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();
}

enum Tone {
    Plain,
    Good,
    Warn,
    Bad,
}

fn write_count(label: &str, n: usize, tone: Tone) {
    let value = n.to_string();
    let value = match tone {
        _ if n == 0 => value.dimmed(),
        Tone::Plain => value.normal(),
        Tone::Good => value.green(),
        Tone::Warn => value.yellow(),
        Tone::Bad => value.red(),
    };
    println!("    {:<14} {:>8}", label, value);
}

fn detail_text(detail: &Option<serde_json::Value>) -> String {
    match detail {
        Some(value) => value.to_string(),
        None => "none".to_string(),
    }
}
