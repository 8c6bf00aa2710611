//! JSON serialization for job reports.

use crate::report::JobReport;

/// Serialize a report to a compact JSON string.
///
/// # Errors
///
/// Propagates the `serde_json` error. Every report field maps to plain JSON,
/// so this is not expected in practice.
pub fn to_json(report: &JobReport) -> Result<String, serde_json::Error> {
    serde_json::to_string(report)
}

/// Serialize a report to a pretty-printed JSON string.
///
/// # Errors
///
/// Propagates the `serde_json` error. Every report field maps to plain JSON,
/// so this is not expected in practice.
pub fn to_json_pretty(report: &JobReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
