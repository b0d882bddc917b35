//! Result types for post-load verification.

use serde::Serialize;

use crate::error::{EtlError, Result};

/// The independent checks run against a loaded target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Counts,
    Checksums,
    Referential,
    MetricAccuracy,
    Aggregates,
    Views,
}

impl CheckKind {
    /// Every check, in execution order.
    pub const ALL: [CheckKind; 6] = [
        CheckKind::Counts,
        CheckKind::Checksums,
        CheckKind::Referential,
        CheckKind::MetricAccuracy,
        CheckKind::Aggregates,
        CheckKind::Views,
    ];

    /// Label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::Counts => "Record counts",
            CheckKind::Checksums => "Checksum format",
            CheckKind::Referential => "Referential integrity",
            CheckKind::MetricAccuracy => "RVI accuracy",
            CheckKind::Aggregates => "Yearly aggregates",
            CheckKind::Views => "Views",
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: CheckKind,
    pub passed: bool,
    pub message: String,
    /// Offending rows or relations, when the check failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl CheckResult {
    pub fn pass(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            check,
            passed: true,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn fail(check: CheckKind, message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            check,
            passed: false,
            message: message.into(),
            details,
        }
    }
}

/// Results of a full verification pass.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    pub duration_ms: u64,
}

impl VerifyReport {
    pub fn new(checks: Vec<CheckResult>, duration_ms: u64) -> Self {
        Self {
            passed: checks.iter().all(|c| c.passed),
            checks,
            duration_ms,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Look up the result of one check.
    pub fn check(&self, kind: CheckKind) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check == kind)
    }

    /// Convert a failing report into a `Verification` error.
    pub fn into_result(self) -> Result<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(EtlError::Verification {
                failed: self.failed_count(),
                total: self.checks.len(),
            })
        }
    }

    /// Human-readable pass/fail summary.
    pub fn summary(&self) -> String {
        let mut out = String::from("Verification summary\n");
        for c in &self.checks {
            let mark = if c.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("  [{}] {}: {}\n", mark, c.check.label(), c.message));
            for detail in c.details.iter().take(10) {
                out.push_str(&format!("         - {}\n", detail));
            }
            if c.details.len() > 10 {
                out.push_str(&format!("         ... and {} more\n", c.details.len() - 10));
            }
        }
        out.push_str(&format!(
            "{} of {} checks passed",
            self.checks.len() - self.failed_count(),
            self.checks.len()
        ));
        out
    }
}
