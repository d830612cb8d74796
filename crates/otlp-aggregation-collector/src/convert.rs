//! Conversion of collected points into OTLP messages.

use opentelemetry_proto::tonic::{
    collector::metrics::v1::ExportMetricsServiceRequest,
    common::v1::{any_value, AnyValue, InstrumentationScope},
    metrics::v1::{
        exponential_histogram_data_point, metric::Data, number_data_point, ExponentialHistogram,
        ExponentialHistogramDataPoint, Gauge, Histogram, HistogramDataPoint, Metric,
        NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
    },
    resource::v1::Resource,
};
use otlp_aggregation_core::{
    AttributeSet, AttributeValue, ExponentialBuckets, KeyValue, NumberPoint, Point,
};

use crate::{config::CollectorConfig, metric::CollectedMetric};

/// Converts a single attribute into its OTLP form.
pub fn to_otlp_key_value(kv: &KeyValue) -> opentelemetry_proto::tonic::common::v1::KeyValue {
    let value = match &kv.value {
        AttributeValue::String(v) => any_value::Value::StringValue(v.clone()),
        AttributeValue::Bool(v) => any_value::Value::BoolValue(*v),
        AttributeValue::Int(v) => any_value::Value::IntValue(*v),
        AttributeValue::Double(v) => any_value::Value::DoubleValue(*v),
    };
    opentelemetry_proto::tonic::common::v1::KeyValue {
        key: kv.key.clone(),
        value: Some(AnyValue { value: Some(value) }),
    }
}

fn to_otlp_attributes(
    attributes: &AttributeSet,
) -> Vec<opentelemetry_proto::tonic::common::v1::KeyValue> {
    attributes.iter().map(to_otlp_key_value).collect()
}

fn to_number_data_point(point: &NumberPoint) -> NumberDataPoint {
    NumberDataPoint {
        attributes: to_otlp_attributes(&point.attributes),
        // Gauges carry no start time.
        start_time_unix_nano: point.start_time_unix_nano.unwrap_or_default(),
        time_unix_nano: point.time_unix_nano,
        exemplars: Vec::new(),
        flags: 0,
        value: Some(number_data_point::Value::AsDouble(point.value)),
    }
}

fn to_buckets(buckets: &ExponentialBuckets) -> exponential_histogram_data_point::Buckets {
    exponential_histogram_data_point::Buckets {
        offset: buckets.offset,
        bucket_counts: buckets.bucket_counts.clone(),
    }
}

/// Empty metric data of the shape `point` belongs in.
fn new_collection_data(point: &Point) -> Data {
    match point {
        Point::Sum {
            temporality,
            is_monotonic,
            ..
        } => Data::Sum(Sum {
            data_points: Vec::new(),
            aggregation_temporality: temporality.as_otlp(),
            is_monotonic: *is_monotonic,
        }),
        Point::Gauge(_) => Data::Gauge(Gauge {
            data_points: Vec::new(),
        }),
        Point::Histogram { temporality, .. } => Data::Histogram(Histogram {
            data_points: Vec::new(),
            aggregation_temporality: temporality.as_otlp(),
        }),
        Point::ExponentialHistogram { temporality, .. } => {
            Data::ExponentialHistogram(ExponentialHistogram {
                data_points: Vec::new(),
                aggregation_temporality: temporality.as_otlp(),
            })
        }
    }
}

/// Appends `point` to `data`, returning false if it does not fit the data's shape.
fn push_point(data: &mut Data, point: &Point) -> bool {
    match (data, point) {
        (Data::Sum(sum), Point::Sum { point, .. }) => {
            sum.data_points.push(to_number_data_point(point))
        }
        (Data::Gauge(gauge), Point::Gauge(point)) => {
            gauge.data_points.push(to_number_data_point(point))
        }
        (Data::Histogram(histogram), Point::Histogram { point, .. }) => {
            histogram.data_points.push(HistogramDataPoint {
                attributes: to_otlp_attributes(&point.attributes),
                start_time_unix_nano: point.start_time_unix_nano,
                time_unix_nano: point.time_unix_nano,
                count: point.count,
                sum: Some(point.sum),
                bucket_counts: point.bucket_counts.clone(),
                explicit_bounds: point.explicit_bounds.clone(),
                exemplars: Vec::new(),
                flags: 0,
                min: point.min,
                max: point.max,
            })
        }
        (Data::ExponentialHistogram(histogram), Point::ExponentialHistogram { point, .. }) => {
            histogram.data_points.push(ExponentialHistogramDataPoint {
                attributes: to_otlp_attributes(&point.attributes),
                start_time_unix_nano: point.start_time_unix_nano,
                time_unix_nano: point.time_unix_nano,
                count: point.count,
                sum: Some(point.sum),
                scale: point.scale.into(),
                zero_count: point.zero_count,
                positive: Some(to_buckets(&point.positive)),
                negative: Some(to_buckets(&point.negative)),
                flags: point.flags,
                exemplars: Vec::new(),
                min: point.min,
                max: point.max,
                zero_threshold: 0.0,
            })
        }
        _ => return false,
    }
    true
}

/// Converts a collected metric into an OTLP metric.
///
/// Returns `None` when there are no points to report.
pub fn to_otlp_metric(metric: &CollectedMetric) -> Option<Metric> {
    let first = metric.points.first()?;
    let mut data = new_collection_data(first);
    for point in &metric.points {
        if !push_point(&mut data, point) {
            tracing::warn!(
                instrument = %metric.descriptor.name,
                "skipping point that does not match the metric's aggregation"
            );
        }
    }
    Some(Metric {
        name: metric.descriptor.name.clone(),
        description: metric.descriptor.description.clone(),
        unit: metric.descriptor.unit.clone(),
        metadata: Vec::new(),
        data: Some(data),
    })
}

/// Groups collected metrics under the configured resource and scope.
pub fn to_export_request(
    config: &CollectorConfig,
    metrics: &[CollectedMetric],
) -> ExportMetricsServiceRequest {
    let metrics: Vec<Metric> = metrics.iter().filter_map(to_otlp_metric).collect();
    if metrics.is_empty() {
        return ExportMetricsServiceRequest {
            resource_metrics: Vec::new(),
        };
    }
    let resource = Resource {
        attributes: config.resource_attributes.iter().map(to_otlp_key_value).collect(),
        ..Default::default()
    };
    let scope = InstrumentationScope {
        name: config.scope_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        ..Default::default()
    };
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(resource),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(scope),
                metrics,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        }],
    }
}
