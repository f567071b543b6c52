//! # CST Runtime
//!
//! Runs one compressed state tree verification pass or one partitioned
//! group or owner scan, configured entirely from the environment.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use cst_runtime::{build_service, export_metrics, RunOutcome, Runner, RuntimeConfig};
use cst_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env().context("Invalid configuration")?;
    info!(
        mode = %config.mode,
        index_url = %config.rpc.index_url,
        ledger_url = %config.rpc.ledger_url,
        concurrency = config.sync.concurrency_limit,
        partitions = config.sync.partition_count,
        "[cst] Configuration loaded"
    );

    let runner = Runner::new(build_service(&config).context("Failed to build service")?);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "[cst] Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    let outcome = runner.run_until(&config.mode, shutdown).await;
    if let Err(e) = export_metrics(telemetry.metrics(), config.metrics_file.as_deref()) {
        warn!(error = %e, "[cst] Metrics export failed");
    }

    match outcome? {
        RunOutcome::Finished(summary) => {
            let problems = summary.problem_count();
            if problems > 0 {
                bail!("{problems} item(s) failed or mismatched; see log for keys to retry");
            }
            info!("[cst] Run complete");
        }
        RunOutcome::Interrupted => info!("[cst] Run interrupted"),
    }

    Ok(())
}
