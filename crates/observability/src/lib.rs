//! # Observability
//!
//! 批量导入管道的日志与指标。
//!
//! - [`init_with_config`]: 安装 tracing subscriber，可选启动 Prometheus 端点
//! - [`init_metrics_only`]: 日志已初始化后单独启动指标端点 (`run` 命令)
//! - [`metrics`]: 分区延迟、失败报告、运行结果的记录函数与汇总统计
//!
//! Every `bulk_ingest_*` series is described once the exporter is
//! installed, so `/metrics` carries HELP lines for them.
//!
//! ```ignore
//! let config = ObservabilityConfig::for_verbosity(1, false).with_format(LogFormat::Compact);
//! observability::init_with_config(config)?;
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_failure_report, record_group_lag, record_producers_finished, record_run_finished,
    IngestStatsAggregator, IngestSummary, RunningStats, StatsSummary,
};

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON, one object per line, with file/line and thread fields
    Json,
    #[default]
    Pretty,
    Compact,
}

/// 日志与指标配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub directive: String,
    /// Use `directive` even when `RUST_LOG` is set
    pub ignore_env: bool,
    /// Prometheus listener port, `None` disables the exporter
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::for_verbosity(0, false)
    }
}

impl ObservabilityConfig {
    /// `-v` count and `--quiet` as the CLI takes them.
    ///
    /// Quiet wins over `RUST_LOG` so scripted runs only see warnings.
    pub fn for_verbosity(verbose: u8, quiet: bool) -> Self {
        let directive = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            log_format: LogFormat::default(),
            directive: directive.to_string(),
            ignore_env: quiet,
            metrics_port: None,
        }
    }

    pub fn with_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    pub fn with_metrics_port(mut self, port: Option<u16>) -> Self {
        self.metrics_port = port;
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.ignore_env {
            return EnvFilter::new(&self.directive);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.directive))
    }
}

/// 安装全局 subscriber，按配置启动指标端点
///
/// The global subscriber can be installed once per process; a second call
/// fails.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        directive = %config.directive,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅启动 Prometheus 端点（tracing 已初始化）
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to install Prometheus recorder on port {port}"))?;
    crate::metrics::describe_pipeline_metrics();

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
