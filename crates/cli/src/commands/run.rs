//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let fusion = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        propagation_sensor = %fusion.core.propagation_sensor,
        sensors = fusion.sensors.len(),
        max_entries = fusion.buffer.max_entries,
        max_span_s = ?fusion.buffer.max_span_s,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&fusion);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        fusion,
        input: args.input.clone(),
        output: args.output.clone(),
        decimate: usize::try_from(args.decimate).unwrap_or(usize::MAX),
        max_records: (args.max_records != 0).then_some(args.max_records),
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        dump_buffer: args.dump_buffer,
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting replay...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Replay failed")?;
            info!(
                records = stats.records_processed,
                skipped = stats.records_skipped,
                replays = stats.core.replays,
                duration_secs = stats.duration.as_secs_f64(),
                throughput = format!("{:.0}", stats.throughput()),
                "Replay completed"
            );
            stats.print_summary();
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping replay...");
        }
    }

    info!("Fusion replay finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM; never resolves if no handler can be installed
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::FusionConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Core:");
    println!("  Propagation sensor: {}", config.core.propagation_sensor);
    println!("  Gravity: {} m/s²", config.core.gravity);
    println!("  MatExp order: {}", config.core.matexp_order);
    println!(
        "  Buffer: {} entries, span {}",
        config.buffer.max_entries,
        config
            .buffer
            .max_span_s
            .map_or_else(|| "unbounded".to_string(), |s| format!("{s} s"))
    );

    println!("\nSensors ({}):", config.sensors.len());
    for sensor in &config.sensors {
        println!("  - {} ({:?})", sensor.name, sensor.kind);
    }
    println!();
}
