//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{IngestError, PipelineBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<PipelineBlueprint, IngestError> {
    toml::from_str(content).map_err(|e| IngestError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<PipelineBlueprint, IngestError> {
    serde_json::from_str(content).map_err(|e| IngestError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineBlueprint, IngestError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LogBackend, LogKind, SinkType, SourceConfig};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[log]
backend = "memory"
partitions = 3

[producer.source]
kind = "synthetic"

[sink]
name = "mem"
sink_type = "memory"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.log.backend, LogBackend::Memory);
        assert_eq!(bp.log.name, LogKind::Document);
        assert_eq!(bp.log.partitions, 3);
        assert_eq!(bp.producer.batch_size, 50);
        assert!(matches!(
            bp.producer.source,
            SourceConfig::Synthetic {
                fan_out: 3,
                depth: 2,
                ..
            }
        ));
        assert_eq!(bp.sink.sink_type, SinkType::Memory);
        assert_eq!(bp.consumer.group, "bulk-import");
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "log": { "backend": "file", "root": "./data", "name": "blob", "partitions": 2 },
            "producer": {
                "batch_size": 9,
                "source": { "kind": "filesystem", "path": "./to-import" }
            },
            "consumer": { "failure_policy": "halt" },
            "sink": { "name": "log", "sink_type": "log" }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.log.name, LogKind::Blob);
        assert_eq!(bp.producer.batch_size, 9);
        assert_eq!(bp.consumer.failure_policy, contracts::FailurePolicy::Halt);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, IngestError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_unknown_source_kind() {
        let content = r#"
[log]
partitions = 1
[producer.source]
kind = "ftp"
[sink]
name = "log"
sink_type = "log"
"#;
        assert!(matches!(
            parse_toml(content),
            Err(IngestError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
