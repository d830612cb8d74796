use std::path::PathBuf;

use clap::Parser;
use otlp_aggregation_collector::{
    convert::to_export_request,
    metric::now_unix_nano,
    replay::{read_measurements_file, replay},
    CollectorConfig, Error, MetricRegistry, TemporalityPreference,
};
use otlp_aggregation_core::{AggregationPolicy, ExponentialHistogramConfig, InstrumentKind};
use tracing_subscriber::EnvFilter;

/// Replays recorded measurements through the metric aggregators and prints
/// the resulting OTLP export requests.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Newline-delimited JSON measurements to replay.
    #[arg(short, long, env = "OTLP_AGGREGATION_INPUT")]
    input: PathBuf,

    /// Temporality to report: cumulative, delta or stateless.
    #[arg(
        short,
        long,
        env = "OTLP_AGGREGATION_TEMPORALITY",
        default_value = "cumulative"
    )]
    temporality: TemporalityPreference,

    /// Aggregate histograms into exponential buckets.
    #[arg(long)]
    exponential: bool,

    /// Maximum buckets per sign for exponential histograms.
    #[arg(long, env = "OTLP_AGGREGATION_MAX_SIZE", requires = "exponential")]
    max_size: Option<i32>,

    /// Starting scale for exponential histograms.
    #[arg(
        long,
        env = "OTLP_AGGREGATION_MAX_SCALE",
        requires = "exponential",
        allow_negative_numbers = true
    )]
    max_scale: Option<i8>,

    /// Number of collections to spread the input across.
    #[arg(short, long, default_value_t = 1)]
    collections: usize,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::try_parse()?;
    let measurements = read_measurements_file(&args.input)?;
    tracing::info!(
        input = %args.input.display(),
        measurements = measurements.len(),
        "loaded measurements"
    );

    let mut config = CollectorConfig {
        temporality: args.temporality,
        ..Default::default()
    };
    if args.exponential {
        let defaults = ExponentialHistogramConfig::default();
        let exponential = ExponentialHistogramConfig {
            max_size: args.max_size.unwrap_or(defaults.max_size),
            max_scale: args.max_scale.unwrap_or(defaults.max_scale),
            ..defaults
        };
        for measurement in &measurements {
            if measurement.kind == InstrumentKind::Histogram {
                config.views.insert(
                    measurement.instrument.clone(),
                    AggregationPolicy::ExponentialBucketHistogram(exponential),
                );
            }
        }
    }

    let registry = MetricRegistry::new(config, now_unix_nano());
    let summary = replay(&registry, &measurements, args.collections, |metrics| {
        let request = to_export_request(registry.config(), &metrics);
        println!("{request:#?}");
        Ok(())
    })?;
    if summary.dropped > 0 {
        tracing::warn!(dropped = summary.dropped, "some measurements were dropped");
    }
    Ok(())
}
