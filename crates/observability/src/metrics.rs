//! 导入管道指标收集模块
//!
//! 基于消费事件与消费组延迟收集和统计批量导入的运行指标。

use std::collections::{BTreeMap, HashMap};

use contracts::LogLag;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};

/// 为所有 `bulk_ingest_*` 指标注册说明
///
/// Called once after the recorder is installed; series recorded by the
/// producer and consumer crates are described here too.
pub fn describe_pipeline_metrics() {
    describe_counter!(
        "bulk_ingest_messages_produced_total",
        Unit::Count,
        "Messages produced by tree walkers"
    );
    describe_counter!(
        "bulk_ingest_records_appended_total",
        Unit::Count,
        "Records appended, by log and partition"
    );
    describe_counter!(
        "bulk_ingest_records_applied_total",
        Unit::Count,
        "Records applied to the sink, by log and partition"
    );
    describe_counter!(
        "bulk_ingest_record_failures_total",
        Unit::Count,
        "Records that could not be applied, by kind"
    );
    describe_counter!(
        "bulk_ingest_failure_reports_total",
        Unit::Count,
        "Failure reports by kind and skip/halt action"
    );
    describe_counter!(
        "bulk_ingest_retries_total",
        Unit::Count,
        "Retried append, read and apply attempts"
    );
    describe_counter!(
        "bulk_ingest_producer_forks_total",
        Unit::Count,
        "Branches handed to a new producer worker"
    );
    describe_counter!(
        "bulk_ingest_producer_aborts_total",
        Unit::Count,
        "Source nodes skipped as unreadable or too large"
    );
    describe_counter!("bulk_ingest_runs_total", Unit::Count, "Pipeline runs by outcome");
    describe_gauge!(
        "bulk_ingest_active_producers",
        Unit::Count,
        "Producer workers currently scheduled"
    );
    describe_gauge!(
        "bulk_ingest_consumer_lag",
        Unit::Count,
        "Records behind the end offset, seen by the partition worker"
    );
    describe_gauge!(
        "bulk_ingest_group_lag",
        Unit::Count,
        "Uncommitted records of a consumer group at the end of a run"
    );
    describe_gauge!(
        "bulk_ingest_log_end_offset",
        Unit::Count,
        "Next offset of each partition"
    );
    describe_gauge!(
        "bulk_ingest_last_run_produced",
        Unit::Count,
        "Messages produced by the last run"
    );
    describe_histogram!(
        "bulk_ingest_apply_latency_ms",
        Unit::Milliseconds,
        "Time to apply one record, retries included"
    );
    describe_histogram!(
        "bulk_ingest_run_duration_seconds",
        Unit::Seconds,
        "Wall time of a pipeline run"
    );
}

/// 记录消费组在某个分区上的延迟
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_group_lag;
///
/// let lag = log.lag("bulk-import")?;
/// for (partition, lag) in lag.partitions.iter().enumerate() {
///     record_group_lag(&lag.log, &lag.group, partition as u32, lag);
/// }
/// ```
pub fn record_group_lag(log: &str, group: &str, partition: u32, lag: &LogLag) {
    gauge!(
        "bulk_ingest_group_lag",
        "log" => log.to_string(),
        "group" => group.to_string(),
        "partition" => partition.to_string()
    )
    .set(lag.pending as f64);

    gauge!(
        "bulk_ingest_log_end_offset",
        "log" => log.to_string(),
        "partition" => partition.to_string()
    )
    .set(lag.end as f64);
}

/// 记录一条失败报告
pub fn record_failure_report(kind: &str, action: &str) {
    counter!(
        "bulk_ingest_failure_reports_total",
        "kind" => kind.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

/// 记录生产阶段结束
pub fn record_producers_finished(produced: u64, aborts: u64) {
    gauge!("bulk_ingest_last_run_produced").set(produced as f64);
    if aborts > 0 {
        counter!("bulk_ingest_producer_aborts_total").increment(aborts);
    }
}

/// 记录一次完整运行
pub fn record_run_finished(outcome: &str, duration_secs: f64) {
    counter!("bulk_ingest_runs_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("bulk_ingest_run_duration_seconds").record(duration_secs);
}

/// 导入指标聚合器
///
/// 在内存中聚合消费事件，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct IngestStatsAggregator {
    /// 已写入 sink 的记录数
    pub total_applied: u64,

    /// 失败记录数
    pub total_failures: u64,

    /// 各错误类型的失败次数
    pub failures_by_kind: HashMap<String, u64>,

    /// 各分区写入数
    pub applied_per_partition: BTreeMap<u32, u64>,

    /// 写入延迟统计 (毫秒)
    pub latency_stats: RunningStats,
}

impl IngestStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次成功写入
    pub fn record_applied(&mut self, partition: u32, latency_ms: f64) {
        self.total_applied += 1;
        *self.applied_per_partition.entry(partition).or_insert(0) += 1;
        self.latency_stats.push(latency_ms);
    }

    /// 记录一次失败
    pub fn record_failure(&mut self, kind: &str) {
        self.total_failures += 1;
        *self.failures_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> IngestSummary {
        let processed = self.total_applied + self.total_failures;
        IngestSummary {
            total_applied: self.total_applied,
            total_failures: self.total_failures,
            failure_rate: if processed > 0 {
                self.total_failures as f64 / processed as f64 * 100.0
            } else {
                0.0
            },
            apply_latency_ms: StatsSummary::from(&self.latency_stats),
            applied_per_partition: self.applied_per_partition.clone(),
            failures_by_kind: self.failures_by_kind.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub total_applied: u64,
    pub total_failures: u64,
    pub failure_rate: f64,
    pub apply_latency_ms: StatsSummary,
    pub applied_per_partition: BTreeMap<u32, u64>,
    pub failures_by_kind: HashMap<String, u64>,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingest Metrics Summary ===")?;
        writeln!(f, "Applied records: {}", self.total_applied)?;
        writeln!(
            f,
            "Failed records: {} ({:.2}%)",
            self.total_failures, self.failure_rate
        )?;
        writeln!(f, "Apply latency (ms): {}", self.apply_latency_ms)?;

        if !self.applied_per_partition.is_empty() {
            writeln!(f, "Applied per partition:")?;
            for (partition, count) in &self.applied_per_partition {
                writeln!(f, "  {}: {}", partition, count)?;
            }
        }

        if !self.failures_by_kind.is_empty() {
            writeln!(f, "Failures by kind:")?;
            let mut kinds: Vec<_> = self.failures_by_kind.iter().collect();
            kinds.sort();
            for (kind, count) in kinds {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_pipeline_metrics();
        record_group_lag("document", "g", 0, &LogLag::of(2, 5));
        record_failure_report("corrupt_record", "Skip");
        record_run_finished("completed", 0.5);
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = IngestStatsAggregator::new();
        aggregator.record_applied(0, 1.5);
        aggregator.record_applied(0, 2.5);
        aggregator.record_applied(2, 3.0);
        aggregator.record_failure("corrupt_record");

        assert_eq!(aggregator.total_applied, 3);
        assert_eq!(aggregator.total_failures, 1);
        assert_eq!(aggregator.applied_per_partition.get(&0), Some(&2));
        assert_eq!(aggregator.applied_per_partition.get(&1), None);
        assert_eq!(aggregator.failures_by_kind.get("corrupt_record"), Some(&1));

        let summary = aggregator.summary();
        assert!((summary.failure_rate - 25.0).abs() < 1e-10);
        assert_eq!(summary.apply_latency_ms.count, 3);

        aggregator.reset();
        assert_eq!(aggregator.total_applied, 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = IngestSummary {
            total_applied: 95,
            total_failures: 5,
            failure_rate: 5.0,
            apply_latency_ms: StatsSummary {
                count: 95,
                min: 0.2,
                max: 8.0,
                mean: 1.0,
                std_dev: 0.5,
            },
            applied_per_partition: BTreeMap::from([(0, 50), (1, 45)]),
            failures_by_kind: HashMap::from([("partition_failure".to_string(), 5)]),
        };

        let output = format!("{}", summary);
        assert!(output.contains("Applied records: 95"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("  1: 45"));
        assert!(output.contains("partition_failure: 5"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = IngestStatsAggregator::new().summary();
        assert_eq!(summary.failure_rate, 0.0);
        assert_eq!(format!("{}", summary.apply_latency_ms), "N/A");
    }
}
