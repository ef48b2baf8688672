//! Sequential per-package batch driver.
//!
//! Packages are processed in the order given (directory listing order when
//! discovered with [`packages::package_dirs`]). A failing package is logged
//! and recorded, and the batch moves on; only run-fatal errors stop it.

use crate::error::{PipelineError, Result};
use crate::packages;
use log::{error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PackageFailure {
    pub package: String,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<PackageFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    pub fn summary(&self, stage: &str) -> StageSummary {
        StageSummary {
            stage: stage.to_string(),
            succeeded: self.succeeded.clone(),
            failed: self
                .failed
                .iter()
                .map(|f| FailureSummary {
                    package: f.package.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Machine-readable outcome of one stage, printed by the command line tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailureSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub package: String,
    pub error: String,
}

/// Runs `stage` on every package. Per-package errors are collected in the
/// report; an error that invalidates the whole run is returned instead.
pub fn run_packages<T, F>(packages: &[PathBuf], stage_name: &str, mut stage: F) -> Result<BatchReport>
where
    F: FnMut(&Path) -> Result<T>,
{
    let mut report = BatchReport::default();
    for package in packages {
        let name = packages::package_name(package);
        match stage(package) {
            Ok(_) => report.succeeded.push(name),
            Err(e) if e.is_fatal_to_run() => {
                error!("{stage_name} aborted at package '{name}': {e}");
                return Err(e);
            }
            Err(e) => {
                error!("Could not {stage_name} package '{name}': {e}");
                report.failed.push(PackageFailure {
                    package: name,
                    error: e,
                });
            }
        }
    }
    info!(
        "{stage_name}: {} packages succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    Ok(report)
}
