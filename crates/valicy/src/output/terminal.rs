//! Terminal output formatting with colors.

use colored::Colorize;

use crate::job::JobState;
use crate::report::JobReport;

/// Format a report for human-readable terminal output.
///
/// Per-instance details are included when `VALICY_VERBOSE` is set.
pub fn format_report(report: &JobReport) -> String {
    format_report_with(report, is_verbose())
}

fn format_report_with(report: &JobReport, verbose: bool) -> String {
    let mut out = String::new();
    let sep = "\u{2500}".repeat(62);
    let stats = &report.stats;

    out.push_str(&format!(
        "\n  {} / {} / {}\n",
        report.system,
        report.scenario,
        report.job.bold()
    ));
    out.push_str(&sep);
    out.push('\n');

    let state = match stats.state {
        JobState::Open => "open".normal().to_string(),
        JobState::Collecting => "collecting".cyan().to_string(),
        JobState::Closed => "closed".dimmed().to_string(),
    };
    out.push_str(&format!("    State:        {}", state));
    if let Some(reason) = stats.close_reason {
        out.push_str(&format!(" ({})", reason));
    }
    out.push('\n');

    out.push_str(&format!(
        "    Runs:         {} issued, {} completed, {} dispatched, {} pending\n",
        stats.issued, stats.completed, stats.dispatched, stats.pending
    ));
    if stats.abandoned + stats.resampled > 0 {
        out.push_str(&format!(
            "    Reclaimed:    {} abandoned, {} resampled, {} late\n",
            stats.abandoned, stats.resampled, stats.late_completions
        ));
    }
    out.push_str(&format!(
        "    Budget:       {} / {} generated\n",
        stats.generated, stats.max_runs
    ));
    out.push_str(&format!(
        "    Coverage:     {} regions, {} grid points left\n",
        report.regions, report.grid_remaining
    ));

    out.push_str("\n  Certainty\n\n");
    for e in &report.certainty {
        let status = if e.certainty_reached {
            "REACHED".green().bold().to_string()
        } else if e.regions_below_floor > 0 {
            "SPARSE".yellow().to_string()
        } else {
            "OPEN".red().to_string()
        };
        out.push_str(&format!(
            "    {:<16} {:>6.1}% satisfied (lower {:.1}%, target {:.1}%)  P = {:.3}  {}\n",
            e.output,
            e.probability_satisfied * 100.0,
            e.lower_bound * 100.0,
            e.certainty_target * 100.0,
            e.certainty,
            status
        ));
        if e.regions_below_floor > 0 {
            out.push_str(&format!(
                "      {} {} regions below the sample floor (min {})\n",
                "\u{26A0}".yellow(),
                e.regions_below_floor,
                e.min_region_samples
            ));
        }
        if let Some(rate) = e.boundary_satisfied_rate {
            out.push_str(&format!(
                "      boundary: {} samples, {:.1}% satisfied\n",
                e.boundary_samples,
                rate * 100.0
            ));
        }
    }

    out.push_str(&format!(
        "\n  Instances: {} active, {} retired ({} predictions)\n",
        report.instances.len(),
        report.retired.instances,
        report.retired.predictions
    ));
    if verbose {
        for i in &report.instances {
            out.push_str(&format!(
                "    #{:<4} {:?}  {} / {} satisfied{}\n",
                i.id,
                i.state,
                i.satisfied,
                i.predictions,
                if i.has_boundary { "  (boundary)" } else { "" }
            ));
        }
        for r in &report.retirements {
            out.push_str(&format!(
                "    #{:<4} retired at {} predictions (gain {:.4})\n",
                r.id, r.predictions, r.width_gain
            ));
        }
    }
    out
}

/// Check if verbose output is enabled via `VALICY_VERBOSE`.
///
/// True for "1", "true" or "yes" (case-insensitive).
pub fn is_verbose() -> bool {
    std::env::var("VALICY_VERBOSE")
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
