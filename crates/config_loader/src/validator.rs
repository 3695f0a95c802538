//! 配置校验模块
//!
//! 校验规则：
//! - partitions / batch_size / max_concurrent_producers >= 1
//! - consumers >= 1 (若配置)
//! - codec 与 fork_policy 已注册
//! - file 后端必须配置 root
//! - sink 名称非空
//! - retry.budget_ms >= retry.base_ms

use codec::CodecRegistry;
use contracts::{IngestError, LogBackend, PipelineBlueprint, SourceConfig};

/// 校验 PipelineBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    validate_log(blueprint)?;
    validate_producer(blueprint)?;
    validate_consumer(blueprint)?;
    validate_retry(blueprint)?;
    validate_sink(blueprint)?;
    Ok(())
}

/// 校验日志存储配置
fn validate_log(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let log = &blueprint.log;

    if log.partitions == 0 {
        return Err(IngestError::config_validation(
            "log.partitions",
            "partitions must be >= 1",
        ));
    }

    if log.backend == LogBackend::File && log.root.is_none() {
        return Err(IngestError::config_validation(
            "log.root",
            "root is required for the file backend",
        ));
    }

    // 未注册的 codec 直接返回 UnknownCodec
    CodecRegistry::builtin().get(&log.codec)?;
    Ok(())
}

/// 校验生产者配置
fn validate_producer(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let producer = &blueprint.producer;

    if producer.batch_size == 0 {
        return Err(IngestError::config_validation(
            "producer.batch_size",
            "batch_size must be >= 1",
        ));
    }
    if producer.max_concurrent_producers == 0 {
        return Err(IngestError::config_validation(
            "producer.max_concurrent_producers",
            "max_concurrent_producers must be >= 1",
        ));
    }
    if !ingestion::fork_policy_names().contains(&producer.fork_policy.as_str()) {
        return Err(IngestError::config_validation(
            "producer.fork_policy",
            format!(
                "unknown fork policy '{}', expected one of {:?}",
                producer.fork_policy,
                ingestion::fork_policy_names()
            ),
        ));
    }

    if let SourceConfig::Synthetic { fan_out, .. } = producer.source {
        if fan_out == 0 {
            return Err(IngestError::config_validation(
                "producer.source.fan_out",
                "fan_out must be >= 1",
            ));
        }
    }
    Ok(())
}

/// 校验消费者配置
fn validate_consumer(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let consumer = &blueprint.consumer;

    if consumer.consumers == Some(0) {
        return Err(IngestError::config_validation(
            "consumer.consumers",
            "consumers must be >= 1 when set",
        ));
    }
    if consumer.group.is_empty() {
        return Err(IngestError::config_validation(
            "consumer.group",
            "group cannot be empty",
        ));
    }
    if consumer.poll_interval_ms == 0 {
        return Err(IngestError::config_validation(
            "consumer.poll_interval_ms",
            "poll_interval_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验重试配置
fn validate_retry(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    let retry = &blueprint.retry;

    if retry.budget_ms < retry.base_ms {
        return Err(IngestError::config_validation(
            "retry.base_ms / retry.budget_ms",
            format!(
                "budget_ms ({}) must be >= base_ms ({})",
                retry.budget_ms, retry.base_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sink(blueprint: &PipelineBlueprint) -> Result<(), IngestError> {
    if blueprint.sink.name.is_empty() {
        return Err(IngestError::config_validation(
            "sink.name",
            "sink name cannot be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, ConsumerConfig, LogConfig, LogKind, ProducerConfig, RetryConfig,
        SinkConfig, SinkType,
    };
    use std::path::PathBuf;

    fn minimal_blueprint() -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            log: LogConfig {
                backend: LogBackend::File,
                root: Some(PathBuf::from("./ingest-data")),
                name: LogKind::Document,
                partitions: 3,
                codec: "bincode".into(),
            },
            producer: ProducerConfig {
                batch_size: 50,
                max_concurrent_producers: 5,
                fork_policy: "adaptive".into(),
                source: SourceConfig::Filesystem {
                    path: PathBuf::from("./to-import"),
                },
            },
            consumer: ConsumerConfig::default(),
            retry: RetryConfig::default(),
            sink: SinkConfig {
                name: "repository".into(),
                sink_type: SinkType::Directory,
                params: Default::default(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_partitions() {
        let mut bp = minimal_blueprint();
        bp.log.partitions = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("partitions must be >= 1"), "got: {err}");
    }

    #[test]
    fn test_file_backend_requires_root() {
        let mut bp = minimal_blueprint();
        bp.log.root = None;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("root is required"), "got: {err}");

        bp.log.backend = LogBackend::Memory;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_unknown_codec() {
        let mut bp = minimal_blueprint();
        bp.log.codec = "avro".into();
        let result = validate(&bp);
        assert!(
            matches!(result, Err(IngestError::UnknownCodec { ref name }) if name == "avro"),
            "got: {result:?}"
        );
    }

    #[test]
    fn test_zero_batch_size() {
        let mut bp = minimal_blueprint();
        bp.producer.batch_size = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("batch_size must be >= 1"), "got: {err}");
    }

    #[test]
    fn test_zero_producers() {
        let mut bp = minimal_blueprint();
        bp.producer.max_concurrent_producers = 0;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(
            err.contains("max_concurrent_producers must be >= 1"),
            "got: {err}"
        );
    }

    #[test]
    fn test_unknown_fork_policy() {
        let mut bp = minimal_blueprint();
        bp.producer.fork_policy = "random".into();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("unknown fork policy"), "got: {err}");

        bp.producer.fork_policy = "sequential".into();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_consumers() {
        let mut bp = minimal_blueprint();
        bp.consumer.consumers = Some(0);
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("consumers must be >= 1"), "got: {err}");

        bp.consumer.consumers = Some(7);
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_budget_below_base() {
        let mut bp = minimal_blueprint();
        bp.retry.base_ms = 100;
        bp.retry.budget_ms = 10;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("budget_ms"), "got: {err}");
    }

    #[test]
    fn test_empty_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sink.name = String::new();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("cannot be empty"), "got: {err}");
    }
}
