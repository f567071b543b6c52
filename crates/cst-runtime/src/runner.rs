//! # Runner
//!
//! Runs one pass against a [`ProofSyncApi`] and records its tallies.

use std::fs;
use std::future::Future;
use std::path::Path;

use anyhow::Context;

use cst_proof_sync::{
    AssetItem, ErrorKind, ProofSyncApi, ProofSyncError, ScanReport, TreeVerification,
    VerificationOutcome,
};
use cst_telemetry::{
    record_proof_failure, HistogramTimer, MetricsHandle, ITEMS_SCANNED, PAGES_FETCHED,
    PROOFS_VERIFIED, UPSTREAM_ERRORS,
};
use tracing::{debug, info, warn};

use crate::config::Mode;

/// Result of one run.
#[derive(Debug, Clone)]
pub enum RunSummary {
    /// A tree verification pass.
    Tree(TreeVerification),
    /// A partitioned group or owner scan.
    Scan(ScanReport<AssetItem>),
}

impl RunSummary {
    /// Items that need a retry or a closer look.
    pub fn problem_count(&self) -> usize {
        match self {
            Self::Tree(result) => result.report.failures.len() + result.report.mismatched(),
            Self::Scan(report) => report.failures.len(),
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The pass ran to completion.
    Finished(RunSummary),
    /// Shutdown fired first; the in-flight batch was dropped.
    Interrupted,
}

/// Drives one pass of a proof sync service.
pub struct Runner<A: ProofSyncApi> {
    api: A,
}

impl<A: ProofSyncApi> Runner<A> {
    /// Runner over `api`.
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Service driven by this runner.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run `mode` to completion and record metrics.
    pub async fn run(&self, mode: &Mode) -> Result<RunSummary, ProofSyncError> {
        let _timer = HistogramTimer::pass(mode.label());
        info!(mode = %mode, "[cst] Starting run");

        let summary = match mode {
            Mode::VerifyTree { tree } => RunSummary::Tree(self.api.verify_tree(tree).await?),
            Mode::ScanGroup { key, value } => {
                RunSummary::Scan(self.api.scan_group(key, value).await?)
            }
            Mode::ScanOwner { owner } => RunSummary::Scan(self.api.scan_owner(owner).await?),
        };
        record(&summary);
        Ok(summary)
    }

    /// Run `mode` until it finishes or `shutdown` resolves.
    pub async fn run_until<S>(
        &self,
        mode: &Mode,
        shutdown: S,
    ) -> Result<RunOutcome, ProofSyncError>
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown => {
                warn!(mode = %mode, "[cst] Shutdown signal received; abandoning run");
                Ok(RunOutcome::Interrupted)
            }
            result = self.run(mode) => result.map(RunOutcome::Finished),
        }
    }
}

/// Add a summary's tallies to the global counters.
pub fn record(summary: &RunSummary) {
    match summary {
        RunSummary::Tree(result) => {
            let report = &result.report;
            PROOFS_VERIFIED.inc_by(report.verified() as u64);
            for (_, outcome) in report.outcomes.values() {
                match outcome {
                    VerificationOutcome::RootMismatch { .. } => {
                        record_proof_failure(ErrorKind::RootMismatch.as_str())
                    }
                    VerificationOutcome::LeafMismatch { .. } => {
                        record_proof_failure("leaf_mismatch")
                    }
                    VerificationOutcome::Unverifiable(shape) => {
                        record_proof_failure(shape.label())
                    }
                    VerificationOutcome::Verified { .. } => {}
                }
            }
            for failure in &report.failures {
                record_proof_failure(failure.kind.as_str());
                if failure.kind == ErrorKind::UpstreamUnavailable {
                    UPSTREAM_ERRORS.inc();
                }
            }
            info!(
                tree = %result.snapshot.tree,
                size = result.snapshot.size,
                verified = report.verified(),
                stale = report.stale(),
                mismatched = report.mismatched(),
                unverifiable = report.unverifiable(),
                failed = report.failures.len(),
                "[cst] Tree verification summary"
            );
            if !report.failures.is_empty() {
                warn!(keys = ?report.failed_keys(), "[cst] Leaves to retry");
            }
        }
        RunSummary::Scan(report) => {
            PAGES_FETCHED.inc_by(report.total_pages() as u64);
            ITEMS_SCANNED.inc_by(report.total_items());
            for failure in &report.failures {
                if failure.kind == ErrorKind::UpstreamUnavailable {
                    UPSTREAM_ERRORS.inc();
                }
            }
            info!(
                items = report.total_items(),
                pages = report.total_pages(),
                partitions = report.partitions.len(),
                failed = report.failures.len(),
                "[cst] Scan summary"
            );
            if !report.is_complete() {
                warn!(
                    partitions = ?report.failed_partitions(),
                    "[cst] Partitions to retry"
                );
            }
        }
    }
}

/// Export the registered metrics in Prometheus text format.
///
/// With `file` set the text replaces that file, written through a sibling
/// temporary so a textfile collector never reads a partial exposition.
/// Without it the text is logged at info.
pub fn export_metrics(metrics: &MetricsHandle, file: Option<&Path>) -> anyhow::Result<String> {
    let text = metrics.encode().context("Failed to encode metrics")?;
    match file {
        Some(path) => {
            let staging = path.with_extension("prom.tmp");
            fs::write(&staging, &text)
                .with_context(|| format!("Failed to write {}", staging.display()))?;
            fs::rename(&staging, path)
                .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
            debug!(path = %path.display(), bytes = text.len(), "[cst] Metrics written");
        }
        None => info!(metrics = %text, "[cst] Final metrics"),
    }
    Ok(text)
}
