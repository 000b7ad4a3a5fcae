/*!
Observability for the save system.

Structured logging goes through `tracing`; [`init_observability`] installs a
JSON subscriber filtered by `RUST_LOG` (default `worldsave=info`). With the
`metrics` feature, [`SaveMetrics`] keeps Prometheus counters and histograms
for saves and loads.
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SaveError};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "worldsave=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<SaveMetrics>> = OnceLock::new();

/// Prometheus metrics for save and load operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SaveMetrics {
    pub saves_total: Counter,
    pub loads_total: Counter,
    pub failures_total: Counter,
    pub save_latency_seconds: Histogram,
    pub load_latency_seconds: Histogram,
    pub snapshot_size_bytes: Histogram,
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SaveError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| SaveError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn register_histogram(
    registry: &Registry,
    name: &str,
    help: &str,
    buckets: Option<Vec<f64>>,
) -> Result<Histogram> {
    let mut opts = HistogramOpts::new(name, help);
    if let Some(buckets) = buckets {
        opts = opts.buckets(buckets);
    }
    let histogram = Histogram::with_opts(opts)
        .map_err(|e| SaveError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| SaveError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl SaveMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total =
            register_counter(&registry, "worldsave_saves_total", "Total successful saves")?;
        let loads_total =
            register_counter(&registry, "worldsave_loads_total", "Total successful loads")?;
        let failures_total = register_counter(
            &registry,
            "worldsave_failures_total",
            "Total failed save or load operations",
        )?;
        let save_latency_seconds = register_histogram(
            &registry,
            "worldsave_save_latency_seconds",
            "Duration of save operations in seconds",
            None,
        )?;
        let load_latency_seconds = register_histogram(
            &registry,
            "worldsave_load_latency_seconds",
            "Duration of load operations in seconds",
            None,
        )?;
        let snapshot_size_bytes = register_histogram(
            &registry,
            "worldsave_snapshot_size_bytes",
            "Size of encoded snapshots in bytes",
            Some(prometheus::exponential_buckets(1024.0, 4.0, 8).map_err(|e| {
                SaveError::storage(format!("Invalid snapshot size buckets: {e}"))
            })?),
        )?;

        Ok(Self {
            saves_total,
            loads_total,
            failures_total,
            save_latency_seconds,
            load_latency_seconds,
            snapshot_size_bytes,
            registry,
        })
    }

    /// Process-wide instance, `None` if registration failed
    pub fn global() -> Option<&'static SaveMetrics> {
        METRICS.get_or_init(|| Self::new().ok()).as_ref()
    }

    pub fn record_snapshot_size(&self, size_bytes: usize) {
        self.snapshot_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SaveError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SaveError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Save,
    Load,
}

/// Measures one save or load against the global [`SaveMetrics`]
#[cfg(feature = "metrics")]
pub struct OperationTimer {
    start: Instant,
    operation: Operation,
}

#[cfg(feature = "metrics")]
impl OperationTimer {
    pub fn start_save() -> Self {
        Self {
            start: Instant::now(),
            operation: Operation::Save,
        }
    }

    pub fn start_load() -> Self {
        Self {
            start: Instant::now(),
            operation: Operation::Load,
        }
    }

    /// Record success, with the encoded snapshot size
    pub fn finish(self, size_bytes: usize) {
        let Some(metrics) = SaveMetrics::global() else {
            return;
        };
        let elapsed = self.start.elapsed().as_secs_f64();
        match self.operation {
            Operation::Save => {
                metrics.saves_total.inc();
                metrics.save_latency_seconds.observe(elapsed);
            }
            Operation::Load => {
                metrics.loads_total.inc();
                metrics.load_latency_seconds.observe(elapsed);
            }
        }
        metrics.record_snapshot_size(size_bytes);
    }

    pub fn finish_with_error(self) {
        let Some(metrics) = SaveMetrics::global() else {
            return;
        };
        let elapsed = self.start.elapsed().as_secs_f64();
        match self.operation {
            Operation::Save => metrics.save_latency_seconds.observe(elapsed),
            Operation::Load => metrics.load_latency_seconds.observe(elapsed),
        }
        metrics.failures_total.inc();
    }
}

/// Install the global tracing subscriber
///
/// `default_filter` applies when `RUST_LOG` is unset; `None` means
/// [`DEFAULT_FILTER`].
///
/// # Errors
/// The filter does not parse, or a global subscriber is already set.
pub fn init_observability(default_filter: Option<&str>) -> Result<()> {
    #[cfg(feature = "metrics")]
    if SaveMetrics::global().is_none() {
        tracing::warn!("Save metrics could not be registered");
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter.unwrap_or(DEFAULT_FILTER))
            .map_err(|e| SaveError::validation(format!("Invalid log filter: {e}")))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(false);

    let subscriber = TracingRegistry::default().with(filter).with(fmt_layer);

    set_global_default(subscriber).map_err(|e| {
        SaveError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Worldsave observability initialized");
    Ok(())
}

pub fn init_default_observability() -> Result<()> {
    init_observability(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        // Only reached when RUST_LOG is unset; otherwise the env filter wins
        // and a global subscriber may already exist.
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_observability(Some("worldsave=verbose")).is_err());
        }
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_gathering() {
        let metrics = SaveMetrics::global().unwrap();

        OperationTimer::start_save().finish(4096);
        OperationTimer::start_load().finish_with_error();

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("worldsave_saves_total"));
        assert!(text.contains("worldsave_failures_total"));
        assert!(text.contains("worldsave_snapshot_size_bytes"));
    }
}
