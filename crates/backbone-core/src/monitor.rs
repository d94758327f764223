//! # Progress & Error Reporting
//!
//! Contract with the monitoring/health collaborator. Lifecycle transitions report
//! their progress through a [`ProgressMonitor`]; both calls are fire-and-forget.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, warn};

/// One progress update for a named task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub task: String,
    /// Always within `0..=100`.
    pub percentage: u8,
    pub message: String,
    pub timestamp: SystemTime,
}

impl ProgressReport {
    pub fn new(task: impl Into<String>, percentage: u32, message: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            percentage: percentage.min(100) as u8,
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// Sink for progress and error reports.
pub trait ProgressMonitor: Send + Sync {
    fn report_progress(&self, report: ProgressReport);

    fn report_error(&self, error: &str);
}

/// Default monitor: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl ProgressMonitor for TracingMonitor {
    fn report_progress(&self, report: ProgressReport) {
        debug!(
            task = %report.task,
            percentage = report.percentage,
            message = %report.message,
            "Progress"
        );
    }

    fn report_error(&self, error: &str) {
        warn!(error, "Reported error");
    }
}
