//! Rendering of job reports.

pub mod json;
pub mod terminal;

pub use json::{to_json, to_json_pretty};
pub use terminal::format_report;
