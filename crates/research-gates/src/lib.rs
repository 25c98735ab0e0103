//! # Research Gates
//!
//! Pre-execution verification and post-execution statistical validation.
//!
//! ## Verification (static, deterministic)
//! Document-level checks: look-ahead, survivorship, sizing, data
//! availability, parameter sanity, hardcoded values, plus the logic
//! fingerprint cross-check against the generated artifact. Any enabled
//! check failing blocks the record.
//!
//! ## Statistical validation
//! Bootstrap confidence intervals over window Sharpes, a zero-skill null,
//! multiple-testing correction across the definition lineage family, and
//! the configured gate set. Gate failures are data (INVALIDATED), not
//! errors.

pub mod registry;
pub mod stats;
pub mod verify;

use serde::{Deserialize, Serialize};

pub use registry::{DataRegistry, RegistryEntry};
pub use stats::{bh_adjust, bonferroni_adjust, StatisticalValidator, ValidationInputs};
pub use verify::VerificationEngine;

/// Outcome of one verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// Check disabled by configuration.
    Skip,
}

/// One verification check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            message: message.into(),
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Fail,
            message: message.into(),
        }
    }

    pub fn skip(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Skip,
            message: reason.into(),
        }
    }
}

/// Complete verification report for a strategy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub checks: Vec<CheckResult>,
    pub passed: bool,
}

impl VerificationReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let passed = checks.iter().all(|c| c.status != CheckStatus::Fail);
        Self { checks, passed }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }

    /// One-line reason suitable for a BLOCKED transition.
    pub fn block_reason(&self) -> String {
        let names: Vec<&str> = self.failures().map(|c| c.name.as_str()).collect();
        format!("verification failed: {}", names.join(", "))
    }
}

/// Gate-layer failures (I/O and configuration, not gate outcomes).
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("validation error: {0}")]
    Validation(String),
}
