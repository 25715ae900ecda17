//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::FusionConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    core: CoreInfo,
    buffer: BufferInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sensors: Vec<SensorInfo>,
}

#[derive(Serialize)]
struct CoreInfo {
    propagation_sensor: String,
    gravity: f64,
    matexp_order: i32,
    reject_invalid_updates: bool,
    static_samples: usize,
}

#[derive(Serialize)]
struct BufferInfo {
    max_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_span_s: Option<f64>,
}

#[derive(Serialize)]
struct SensorInfo {
    name: String,
    kind: String,
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    noise_std: Option<[f64; 3]>,
    mounted: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn build_config_info(config: &FusionConfig, args: &InfoArgs) -> ConfigInfo {
    let sensors = if args.sensors {
        config
            .sensors
            .iter()
            .map(|s| SensorInfo {
                name: s.name.to_string(),
                kind: format!("{:?}", s.kind),
                role: format!("{:?}", s.kind.role()),
                noise_std: s.noise_std,
                mounted: s.mounting.is_some(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        core: CoreInfo {
            propagation_sensor: config.core.propagation_sensor.to_string(),
            gravity: config.core.gravity,
            matexp_order: config.core.matexp_order,
            reject_invalid_updates: config.core.reject_invalid_updates,
            static_samples: config.init.static_samples,
        },
        buffer: BufferInfo {
            max_entries: config.buffer.max_entries,
            max_span_s: config.buffer.max_span_s,
        },
        sensors,
    }
}

fn print_config_info(config: &FusionConfig, args: &InfoArgs) {
    println!("=== Fusion Configuration ===\n");

    println!("Core");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ Propagation sensor: {}", config.core.propagation_sensor);
    println!("   ├─ Gravity: {} m/s²", config.core.gravity);
    println!("   ├─ MatExp order: {}", config.core.matexp_order);
    println!("   ├─ Reject invalid updates: {}", config.core.reject_invalid_updates);
    println!("   └─ Static init samples: {}", config.init.static_samples);

    println!("\nBuffer");
    println!("   ├─ Max entries: {}", config.buffer.max_entries);
    match config.buffer.max_span_s {
        Some(span) => println!("   └─ Max span: {span} s"),
        None => println!("   └─ Max span: unbounded"),
    }

    println!("\nSensors ({})", config.sensors.len());
    for (i, sensor) in config.sensors.iter().enumerate() {
        let prefix = if i == config.sensors.len() - 1 { "└─" } else { "├─" };
        if args.sensors {
            let noise = sensor
                .noise_std
                .map_or_else(|| "-".to_string(), |n| format!("{n:?}"));
            println!(
                "   {} {} ({:?}, {:?}, noise {}, mounted: {})",
                prefix,
                sensor.name,
                sensor.kind,
                sensor.kind.role(),
                noise,
                sensor.mounting.is_some()
            );
        } else {
            println!("   {} {} ({:?})", prefix, sensor.name, sensor.kind);
        }
    }

    println!();
}
