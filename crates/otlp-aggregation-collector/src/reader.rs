//! Periodic collection of a metric registry.

use std::{future::Future, sync::Arc};

use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use tokio::{sync::mpsc, time::MissedTickBehavior};

use crate::{
    convert::to_export_request,
    metric::{now_unix_nano, MetricRegistry},
    Error,
};

/// Collects a registry every report interval and hands the result to an exporter channel.
pub struct PeriodicReader {
    registry: Arc<MetricRegistry>,
    sink: mpsc::Sender<ExportMetricsServiceRequest>,
}

impl PeriodicReader {
    pub fn new(
        registry: Arc<MetricRegistry>,
        sink: mpsc::Sender<ExportMetricsServiceRequest>,
    ) -> PeriodicReader {
        PeriodicReader { registry, sink }
    }

    /// Runs until `shutdown` completes, then flushes one last collection.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        let report_interval = self.registry.config().report_interval;
        tracing::info!(?report_interval, "starting periodic reader");
        let mut interval = tokio::time::interval(report_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.collect_and_send().await?;
                },
                _ = &mut shutdown => {
                    tracing::info!("flushing metrics before shutdown");
                    self.collect_and_send().await?;
                    return Ok(());
                }
            }
        }
    }

    /// Collects once and sends the result, unless there was nothing to report.
    ///
    /// Returns whether a request was sent.
    pub async fn collect_and_send(&self) -> Result<bool, Error> {
        let metrics = self.registry.collect(now_unix_nano());
        if metrics.is_empty() {
            tracing::debug!("nothing to report");
            return Ok(false);
        }
        let request = to_export_request(self.registry.config(), &metrics);
        self.sink
            .send(request)
            .await
            .map_err(|_| Error::SinkClosed)?;
        Ok(true)
    }
}
