//! Text and JSON rendering of command results.

use color_eyre::eyre::Result;
use sealbox_core::StageReport;
use serde::Serialize;

/// Chooses between human-readable lines and a single JSON document
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// A heading line, text mode only
    pub fn heading(&self, text: &str) {
        if !self.json {
            println!("{}", text);
        }
    }

    /// A detail line, text mode only
    pub fn line(&self, label: &str, value: impl std::fmt::Display) {
        if !self.json {
            println!("  {:<14} {}", label, value);
        }
    }

    /// One line per stage, text mode only
    pub fn stages(&self, reports: &[StageReport]) {
        if !self.json {
            for report in reports {
                println!("  {}", stage_line(report));
            }
        }
    }

    /// The JSON document for this command, JSON mode only
    pub fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }
}

/// `[PASS] sign digest` or `[FAIL] decrypt file: <reason>`
pub fn stage_line(report: &StageReport) -> String {
    let status = if report.passed { "PASS" } else { "FAIL" };
    match &report.reason {
        Some(reason) => format!("[{}] {}: {}", status, report.stage.action(), reason),
        None => format!("[{}] {}", status, report.stage.action()),
    }
}
