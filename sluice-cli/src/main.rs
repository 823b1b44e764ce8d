//! CLI for the sluice live data pipeline.
//!
//! Provides commands for simulating live feeds, benchmarking ingestion, and
//! comparing downsampling methods.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use sluice::rate::ManualClock;
use sluice::{ControllerConfig, DownsampleMethod, LiveSeriesController, RetentionPolicy, Sample};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// sluice — Bounded live time-series pipeline CLI.
#[derive(Parser)]
#[command(name = "sluice", version, about)]
struct Cli {
    /// Controller configuration file (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Feed synthetic series through a controller in virtual time and report statistics.
    Simulate {
        /// Number of series to feed.
        #[arg(long, default_value = "4")]
        series: u32,

        /// Samples per second per series.
        #[arg(long, default_value = "100")]
        rate: u32,

        /// Simulated run time in seconds.
        #[arg(long, default_value = "60")]
        seconds: u32,

        /// Frames per second for repaint ticks.
        #[arg(long, default_value = "60")]
        fps: u32,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: StatsFormat,
    },

    /// Run an ingest-path microbenchmark.
    Bench {
        /// Number of samples to write.
        #[arg(long, default_value = "10000000")]
        points: u64,

        /// Number of series to write to.
        #[arg(long, default_value = "30")]
        series: u32,
    },

    /// Downsample a synthetic waveform and print the result.
    Downsample {
        /// Number of input samples.
        #[arg(long, default_value = "10000")]
        points: u32,

        /// Number of output samples.
        #[arg(long, default_value = "500")]
        target: usize,

        /// Downsampling method.
        #[arg(long, default_value = "lttb")]
        method: Method,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },
}

/// Output format for statistics.
#[derive(Clone, ValueEnum)]
enum StatsFormat {
    /// Human-readable summary.
    Text,
    /// JSON statistics snapshot.
    Json,
}

/// Output format for sample data.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of objects.
    Json,
}

/// Downsampling method selectable from the command line.
#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// First sample of each bucket.
    First,
    /// Last sample of each bucket.
    Last,
    /// Centroid of each bucket.
    Average,
    /// Extremes of each bucket.
    MinMax,
    /// Largest-Triangle-Three-Buckets.
    Lttb,
}

impl From<Method> for DownsampleMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::First => Self::First,
            Method::Last => Self::Last,
            Method::Average => Self::Average,
            Method::MinMax => Self::MinMax,
            Method::Lttb => Self::Lttb,
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Simulate {
            series,
            rate,
            seconds,
            fps,
            format,
        } => cmd_simulate(config, series, rate, seconds, fps, &format),
        Commands::Bench { points, series } => cmd_bench(config, points, series),
        Commands::Downsample {
            points,
            target,
            method,
            format,
        } => cmd_downsample(points, target, method.into(), &format),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Loads the controller configuration, or the defaults when no path is given.
fn load_config(path: Option<&Path>) -> Result<ControllerConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ControllerConfig::default());
    };
    let config = ControllerConfig::load(path)?;
    info!(path = %path.display(), capacity = config.capacity, "loaded controller config");
    Ok(config)
}

/// Synthetic value for series `index` at `x` milliseconds.
fn synthetic_value(index: u32, x: f64) -> f64 {
    let period = 2_000.0 * f64::from(index + 1);
    (x / period * std::f64::consts::TAU).sin() * 10.0 + f64::from(index)
}

/// Implements `sluice simulate`.
fn cmd_simulate(
    config: ControllerConfig,
    series_count: u32,
    rate: u32,
    seconds: u32,
    fps: u32,
    format: &StatsFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if rate == 0 || fps == 0 {
        return Err("rate and fps must be greater than zero".into());
    }

    let clock = ManualClock::new();
    let mut controller = LiveSeriesController::with_clock(config, Arc::new(clock.clone()))?;

    let repaints = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&repaints);
    controller.on_repaint(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let names: Vec<_> = (0..series_count).map(|i| format!("sim_{i}")).collect();
    let step_ms = 1_000.0 / f64::from(rate);
    let frame = Duration::from_secs(1) / fps;
    let end_ms = f64::from(seconds) * 1_000.0;

    // x is virtual milliseconds; the clock advances one frame at a time
    let mut sample_index = 0u64;
    let mut frame_end = 0.0;
    let mut frames = 0u64;
    loop {
        frame_end += frame.as_secs_f64() * 1_000.0;
        loop {
            #[allow(clippy::cast_precision_loss)] // Sample indices stay far below 2^52
            let x = sample_index as f64 * step_ms;
            if x >= frame_end.min(end_ms) {
                break;
            }
            for (i, name) in (0u32..).zip(&names) {
                controller.add_point(name, (x, synthetic_value(i, x)));
            }
            sample_index += 1;
        }
        clock.advance(frame);
        controller.tick();
        frames += 1;
        if frame_end >= end_ms {
            break;
        }
    }
    debug!(frames, samples = sample_index, "simulation finished");

    let stats = controller.get_statistics();
    match format {
        StatsFormat::Text => {
            println!("sluice simulation");
            println!("  Series: {series_count}");
            println!("  Rate: {rate} Hz");
            println!("  Duration: {seconds}s");
            println!("  Frames: {frames}");
            println!("  Repaints: {}", repaints.load(Ordering::Relaxed));
            println!();
            println!("{stats}");
        }
        StatsFormat::Json => {
            let output = serde_json::json!({
                "frames": frames,
                "repaints": repaints.load(Ordering::Relaxed),
                "statistics": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `sluice bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(
    config: ControllerConfig,
    points: u64,
    series_count: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if series_count == 0 {
        return Err("series must be greater than zero".into());
    }

    println!("sluice ingest benchmark");
    println!("  Points: {points}");
    println!("  Series: {series_count}");
    println!("  Capacity: {}", config.capacity);
    println!("  Retention: {}", describe_retention(&config.retention));
    println!();

    let mut controller = LiveSeriesController::new(config)?;
    let names: Vec<_> = (0..series_count).map(|i| format!("metric_{i}")).collect();
    let points_per_series = points / u64::from(series_count);

    println!("Writing {points} samples across {series_count} series...");

    let start = Instant::now();

    for step in 0..points_per_series {
        let x = step as f64;
        for (i, name) in names.iter().enumerate() {
            controller.add_point(name, (x, i as f64));
        }
        if step % 64 == 0 {
            controller.tick();
        }
    }

    let elapsed = start.elapsed();
    let total_writes = points_per_series * u64::from(series_count);
    let ns_per_write = elapsed.as_nanos() as f64 / total_writes.max(1) as f64;
    let writes_per_sec = total_writes as f64 / elapsed.as_secs_f64();
    let stats = controller.get_statistics();

    println!();
    println!("Results:");
    println!("  Total writes: {total_writes}");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_write:.1} ns/write");
    println!("  Throughput: {writes_per_sec:.0} writes/sec");
    println!("  Retained: {} points", stats.totals.point_count);
    println!("  Memory: {}", format_bytes(stats.totals.memory_estimate_bytes));
    println!();

    Ok(())
}

/// Implements `sluice downsample`.
fn cmd_downsample(
    points: u32,
    target: usize,
    method: DownsampleMethod,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let input: Vec<_> = (0..points)
        .map(|i| {
            let x = f64::from(i);
            let spike = if i % 997 == 0 { 5.0 } else { 0.0 };
            Sample::new(x, (x / 50.0).sin() + spike)
        })
        .collect();
    let output = sluice::downsample(&input, target, method);
    debug!(input = input.len(), output = output.len(), method = method.as_str(), "downsampled");

    match format {
        OutputFormat::Csv => {
            println!("x,y");
            for sample in &output {
                println!("{},{}", sample.x, sample.y);
            }
        }
        OutputFormat::Json => {
            let data: Vec<_> = output
                .iter()
                .map(|s| serde_json::json!({"x": s.x, "y": s.y}))
                .collect();
            let output = serde_json::json!({
                "method": method.as_str(),
                "input_count": input.len(),
                "count": data.len(),
                "data": data,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// One-line description of a retention policy.
fn describe_retention(policy: &RetentionPolicy) -> String {
    match policy {
        RetentionPolicy::RollingCount { max_points } => {
            format!("rolling count ({max_points} points)")
        }
        RetentionPolicy::RollingDuration { duration } => format!("rolling duration ({duration})"),
        RetentionPolicy::Unlimited => "unlimited".to_string(),
        RetentionPolicy::Combined {
            max_points,
            max_duration,
        } => format!("combined ({max_points} points, {max_duration})"),
        RetentionPolicy::TieredArchive {
            recent_duration,
            archive_resolution,
            downsample_method,
            ..
        } => format!(
            "tiered archive (recent {recent_duration}, resolution {archive_resolution}, {})",
            downsample_method.as_str()
        ),
    }
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: usize) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::parse_from(["sluice", "simulate", "--series", "2", "--format", "json"]);
        assert!(matches!(
            cli.command,
            Commands::Simulate {
                series: 2,
                format: StatsFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_method_maps_to_library() {
        assert_eq!(DownsampleMethod::from(Method::MinMax), DownsampleMethod::MinMax);
        assert_eq!(DownsampleMethod::from(Method::Lttb), DownsampleMethod::Lttb);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1_048_576), "3.0 MB");
    }
}
