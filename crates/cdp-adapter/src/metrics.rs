//! Process-wide CDP counters.
//!
//! Everything lives in one private Prometheus registry; [`snapshot`] reads
//! totals back out of it so callers can log a per-run summary without running
//! a scrape endpoint.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, Encoder, HistogramVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use tracing::error;

const COMMANDS: &str = "grc_cdp_commands_total";
const LATENCY: &str = "grc_cdp_command_duration_seconds";
const EVENTS: &str = "grc_cdp_events_total";
const RESPONSES: &str = "grc_cdp_responses_total";

struct CdpMetrics {
    registry: Registry,
    commands: IntCounterVec,
    latency: HistogramVec,
    events: IntCounter,
    responses: IntCounter,
}

impl CdpMetrics {
    fn build() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let commands = IntCounterVec::new(
            opts!(COMMANDS, "CDP commands sent, by method and outcome"),
            &["method", "outcome"],
        )?;
        let latency = HistogramVec::new(
            histogram_opts!(
                LATENCY,
                "Latency of answered CDP commands",
                vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
            ),
            &["method"],
        )?;
        let events = IntCounter::new(EVENTS, "CDP events received")?;
        let responses = IntCounter::new(RESPONSES, "Network responses seen on tracked pages")?;
        registry.register(Box::new(commands.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(responses.clone()))?;
        Ok(Self {
            registry,
            commands,
            latency,
            events,
            responses,
        })
    }
}

lazy_static! {
    static ref METRICS: Option<CdpMetrics> = CdpMetrics::build()
        .map_err(|err| error!(target: "cdp-metrics", ?err, "cdp metrics disabled"))
        .ok();
}

/// Totals since process start.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub failures: u64,
    pub events: u64,
    pub responses: u64,
    pub latency_seconds: f64,
}

impl AdapterMetricsSnapshot {
    /// Counts accumulated between `earlier` and `self`.
    pub fn since(&self, earlier: &AdapterMetricsSnapshot) -> AdapterMetricsSnapshot {
        AdapterMetricsSnapshot {
            commands: self.commands.saturating_sub(earlier.commands),
            failures: self.failures.saturating_sub(earlier.failures),
            events: self.events.saturating_sub(earlier.events),
            responses: self.responses.saturating_sub(earlier.responses),
            latency_seconds: (self.latency_seconds - earlier.latency_seconds).max(0.0),
        }
    }
}

pub fn observe_command(method: &str, elapsed: Duration, ok: bool) {
    let Some(metrics) = METRICS.as_ref() else {
        return;
    };
    let outcome = if ok { "ok" } else { "error" };
    metrics.commands.with_label_values(&[method, outcome]).inc();
    if ok {
        metrics
            .latency
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }
}

pub fn observe_event() {
    if let Some(metrics) = METRICS.as_ref() {
        metrics.events.inc();
    }
}

pub fn observe_response() {
    if let Some(metrics) = METRICS.as_ref() {
        metrics.responses.inc();
    }
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    let Some(metrics) = METRICS.as_ref() else {
        return AdapterMetricsSnapshot::default();
    };
    let mut snap = AdapterMetricsSnapshot {
        events: metrics.events.get(),
        responses: metrics.responses.get(),
        ..AdapterMetricsSnapshot::default()
    };
    for family in metrics.registry.gather() {
        match family.get_name() {
            COMMANDS => {
                for metric in family.get_metric() {
                    let count = metric.get_counter().get_value() as u64;
                    snap.commands += count;
                    let failed = metric
                        .get_label()
                        .iter()
                        .any(|pair| pair.get_name() == "outcome" && pair.get_value() == "error");
                    if failed {
                        snap.failures += count;
                    }
                }
            }
            LATENCY => {
                snap.latency_seconds = family
                    .get_metric()
                    .iter()
                    .map(|metric| metric.get_histogram().get_sample_sum())
                    .sum();
            }
            _ => {}
        }
    }
    snap
}

/// Prometheus text exposition of every collector.
pub fn encode_text() -> String {
    let Some(metrics) = METRICS.as_ref() else {
        return String::new();
    };
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer) {
        error!(target: "cdp-metrics", ?err, "failed to encode cdp metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
