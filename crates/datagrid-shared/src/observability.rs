//! Observability: structured logging and table request metrics

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tokio::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::{LoggingConfig, MetricsConfig, ObservabilityConfig};

static OBSERVABILITY: OnceCell<ObservabilitySystem> = OnceCell::new();

/// Process-wide logging and metrics setup
#[derive(Debug)]
pub struct ObservabilitySystem {
    metrics_enabled: bool,
}

impl ObservabilitySystem {
    /// Initialize the observability system. Fails if called twice.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        let system = Self {
            metrics_enabled: config.metrics.enabled,
        };

        Self::init_logging(&config.logging)?;

        if config.metrics.enabled {
            Self::init_metrics(&config.metrics)?;
        }

        OBSERVABILITY
            .set(system)
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        info!("Observability system initialized");
        Ok(())
    }

    fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let env_filter = EnvFilter::builder()
            .with_default_directive(parse_level(&config.level).into())
            .from_env_lossy();

        let registry = tracing_subscriber::registry().with(env_filter);

        match config.format.to_lowercase().as_str() {
            "json" => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(json_layer).try_init()?;
            }
            _ => {
                let pretty_layer = tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(pretty_layer).try_init()?;
            }
        }

        Ok(())
    }

    /// Install the Prometheus recorder with its own scrape endpoint.
    fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
        let bind_addr: SocketAddr = config.bind_address.parse()?;

        PrometheusBuilder::new()
            .with_http_listener(bind_addr)
            .install()?;

        info!("Prometheus metrics initialized on {}", bind_addr);
        Ok(())
    }

    pub fn get() -> Option<&'static ObservabilitySystem> {
        OBSERVABILITY.get()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Table request metrics
pub struct GridMetrics;

impl GridMetrics {
    /// Record a handled request and its row counts
    pub fn request_handled(table: &str, filtered_rows: u64, total_rows: u64) {
        counter!("datagrid_requests_total", "table" => table.to_string()).increment(1);
        gauge!("datagrid_filtered_rows", "table" => table.to_string()).set(filtered_rows as f64);
        gauge!("datagrid_total_rows", "table" => table.to_string()).set(total_rows as f64);
    }

    /// Record a failed request
    pub fn request_failed(table: &str, error_kind: &str) {
        counter!("datagrid_requests_failed_total",
                "table" => table.to_string(),
                "error_kind" => error_kind.to_string())
            .increment(1);
    }

    /// Record rows streamed back to the client
    pub fn rows_returned(table: &str, rows: usize) {
        histogram!("datagrid_rows_returned", "table" => table.to_string()).record(rows as f64);
    }
}

/// Records the elapsed time of one table request when finished or dropped.
pub struct RequestTimer {
    start: Instant,
    table: String,
    finished: bool,
}

impl RequestTimer {
    pub fn start(table: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            table: table.into(),
            finished: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let duration = self.start.elapsed();
        if !self.finished {
            self.finished = true;
            histogram!("datagrid_request_duration_seconds", "table" => self.table.clone())
                .record(duration.as_secs_f64());
        }
        duration
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_request_timer_records_once() {
        let timer = RequestTimer::start("people");
        assert_eq!(timer.table, "people");
        let elapsed = timer.finish();
        assert!(elapsed >= Duration::ZERO);
    }

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        GridMetrics::request_handled("people", 3, 5);
        GridMetrics::request_failed("people", "invalid_request");
        GridMetrics::rows_returned("people", 3);
    }

    #[test]
    fn test_init_rejects_bad_metrics_address() {
        let config = MetricsConfig {
            enabled: true,
            bind_address: "not-an-address".to_string(),
        };
        assert!(ObservabilitySystem::init_metrics(&config).is_err());
    }
}
