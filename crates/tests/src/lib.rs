//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 生产者 -> 日志 -> 消费者 e2e 测试
//! - 重启、失败策略与取消语义

#[cfg(test)]
mod contract_tests {
    use contracts::{partition_for_key, EntityId, LogKind};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
        assert_eq!(LogKind::BlobInfo.log_name(), "blob-info");
    }

    #[test]
    fn test_partition_mapping_is_stable() {
        // crc32 based; changing it would reshuffle every existing log
        for key in ["/a", "/a/b.txt", "7f3a"] {
            let p = partition_for_key(key, 3);
            assert!(p < 3);
            assert_eq!(p, partition_for_key(key, 3));
        }
        assert_eq!(partition_for_key("anything", 1), 0);
        assert_eq!(EntityId::document("/a").as_str(), "doc:/a");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use codec::{BincodeCodec, CodecRegistry, JsonCodec};
    use config_loader::{ConfigFormat, ConfigLoader};
    use consumer::{
        ConsumerEvent, ConsumerPoolBuilder, ConsumerReport, MemorySink, PartitionOutcome,
        SinkFactory,
    };
    use contracts::{
        BackoffKind, EntityId, FailurePolicy, HaltEscalation, LogKind, Message, MessageSink,
        SinkError,
    };
    use ingestion::{
        fork_policy, source_root, LogAppender, ProducerPoolBuilder, ProducerReport,
        SyntheticSourceNode,
    };
    use logstore::{FileLogManager, Log, LogManager, MemoryLogManager};
    use observability::IngestStatsAggregator;
    use retry::RetrySettings;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn fast_retry(budget_ms: u64) -> RetrySettings {
        RetrySettings {
            kind: BackoffKind::Fixed,
            base: Duration::from_millis(1),
            budget: Duration::from_millis(budget_ms),
        }
    }

    /// Walk a synthetic tree into `log`
    async fn produce(
        log: &Arc<dyn Log>,
        fan_out: usize,
        depth: usize,
        batch_size: u64,
    ) -> ProducerReport {
        let token = CancellationToken::new();
        let appender = LogAppender::new(
            Arc::clone(log),
            Arc::new(BincodeCodec),
            RetrySettings::default(),
            token.clone(),
        );
        ProducerPoolBuilder::new(appender)
            .fork_policy(fork_policy("adaptive", 5).unwrap())
            .batch_size(batch_size)
            .log_kind(LogKind::Document)
            .cancellation(token)
            .build()
            .run(Arc::new(SyntheticSourceNode::root(fan_out, depth, 16)))
            .await
            .unwrap()
    }

    /// Builder whose workers stop once caught up
    fn drained(log: &Arc<dyn Log>) -> ConsumerPoolBuilder {
        let drain = CancellationToken::new();
        drain.cancel();
        ConsumerPoolBuilder::new(Arc::clone(log), "e2e")
            .drain(drain)
            .commit_every(3)
            .poll_interval(Duration::from_millis(5))
            .retry(fast_retry(20))
    }

    async fn consume(builder: ConsumerPoolBuilder, sink: &MemorySink) -> ConsumerReport {
        let sink = sink.clone();
        builder
            .build()
            .unwrap()
            .run(move |_| Ok(sink.clone()))
            .await
            .unwrap()
    }

    /// Sink failing transiently a fixed number of times, then storing
    #[derive(Clone)]
    struct FlakySink {
        failures_left: Arc<AtomicU32>,
        inner: MemorySink,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures_left: Arc::new(AtomicU32::new(failures)),
                inner: MemorySink::new("flaky"),
            }
        }
    }

    impl MessageSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SinkError::transient("flaky", "repository unavailable"));
            }
            self.inner.apply(message).await
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    /// 9 leaves, batch 9, 3 partitions: every leaf stored once, in log order
    #[tokio::test]
    async fn test_e2e_nine_leaves_three_partitions() {
        let log = MemoryLogManager::new()
            .create_or_open("document", 3)
            .unwrap();

        let report = produce(&log, 9, 1, 9).await;
        assert_eq!(report.produced, 9);
        assert_eq!(report.appended, 9);
        assert_eq!(report.aborts, 0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = MemorySink::new("repository");
        let consumed = consume(drained(&log).subscribe(tx), &sink).await;

        assert!(consumed.all_drained());
        assert_eq!(consumed.applied(), 9);
        assert_eq!(sink.len(), 9);

        // per partition: offsets strictly increasing, keys mapped to that partition
        let mut last: HashMap<u32, u64> = HashMap::new();
        let mut stats = IngestStatsAggregator::new();
        while let Ok(event) = rx.try_recv() {
            if let ConsumerEvent::Applied {
                partition,
                offset,
                entity,
                latency,
            } = event
            {
                if let Some(previous) = last.insert(partition, offset) {
                    assert!(offset > previous, "partition {partition} out of order");
                }
                let message = sink.get(entity.as_str()).unwrap();
                assert_eq!(message.partition(3), partition);
                stats.record_applied(partition, latency.as_secs_f64() * 1000.0);
            }
        }
        assert_eq!(stats.total_applied, 9);

        let lag = log.lag("e2e").unwrap();
        assert_eq!(lag.total().end, 9);
        assert_eq!(lag.total().pending, 0);
    }

    /// Producers and consumers run concurrently; consumers drain once told
    #[tokio::test]
    async fn test_e2e_concurrent_produce_and_consume() {
        let log = MemoryLogManager::new()
            .create_or_open("document", 4)
            .unwrap();
        let drain = CancellationToken::new();
        let sink = MemorySink::new("repository");
        let run_sink = sink.clone();

        let pool = ConsumerPoolBuilder::new(Arc::clone(&log), "live")
            .drain(drain.clone())
            .poll_interval(Duration::from_millis(2))
            .build()
            .unwrap();
        let consumers = tokio::spawn(pool.run(move |_| Ok(run_sink.clone())));

        let report = produce(&log, 4, 3, 5).await;
        drain.cancel();

        let consumed = tokio::time::timeout(Duration::from_secs(10), consumers)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // 4 + 16 + 64 nodes
        assert_eq!(report.produced, 84);
        assert_eq!(consumed.applied(), 84);
        assert_eq!(sink.len(), 84);
    }

    /// A restart on a reopened file log resumes from committed offsets
    #[tokio::test]
    async fn test_e2e_restart_from_committed_offset() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::new("repository");

        {
            let log = FileLogManager::new(dir.path())
                .create_or_open("document", 3)
                .unwrap();
            produce(&log, 3, 2, 9).await;
            let first = consume(drained(&log), &sink).await;
            assert_eq!(first.applied(), 12);
        }

        // same tree again: new records, same entities
        let log = FileLogManager::new(dir.path()).open("document").unwrap();
        assert_eq!(log.lag("e2e").unwrap().total().pending, 0);
        produce(&log, 3, 2, 9).await;
        assert_eq!(log.lag("e2e").unwrap().total().pending, 12);

        let second = consume(drained(&log), &sink).await;
        assert_eq!(second.applied(), 12);
        assert_eq!(sink.len(), 12);
        assert_eq!(sink.applies(), 24);
        assert_eq!(log.lag("e2e").unwrap().total().end, 24);
    }

    fn corrupt_log() -> Arc<dyn Log> {
        let log = MemoryLogManager::new()
            .create_or_open("document", 1)
            .unwrap();
        let message = |path: &str| {
            Message::Document(contracts::DocumentMessage {
                doc_type: "File".into(),
                parent_path: "/".into(),
                name: path.into(),
                properties: Default::default(),
                blob: None,
            })
        };
        let encode = |m: &Message| {
            use codec::Codec;
            BincodeCodec.encode(m).unwrap()
        };
        log.append(0, BincodeCodec::ID, &encode(&message("a"))).unwrap();
        log.append(0, BincodeCodec::ID, b"\x01garbage").unwrap();
        log.append(0, BincodeCodec::ID, &encode(&message("c"))).unwrap();
        log
    }

    #[tokio::test]
    async fn test_e2e_corrupt_record_skip() {
        let log = corrupt_log();
        let sink = MemorySink::new("repository");
        let report = consume(drained(&log).failure_policy(FailurePolicy::Skip), &sink).await;

        assert!(report.all_drained());
        assert_eq!(report.applied(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].offset, 1);
        assert_eq!(report.failures[0].kind, "corrupt_record");
        assert_eq!(log.committed("e2e", 0).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_e2e_corrupt_record_halt() {
        let log = corrupt_log();
        let sink = MemorySink::new("repository");
        let token = CancellationToken::new();
        let report = consume(
            drained(&log)
                .failure_policy(FailurePolicy::Halt)
                .on_partition_halt(HaltEscalation::FailPipeline)
                .cancellation(token.clone()),
            &sink,
        )
        .await;

        assert!(matches!(
            report.partitions[0].outcome,
            PartitionOutcome::Halted { offset: 1 }
        ));
        assert_eq!(report.halted(), vec![0]);
        assert_eq!(sink.len(), 1);
        // the halted record is the next one a restart reads
        assert_eq!(log.committed("e2e", 0).unwrap(), 1);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_e2e_transient_sink_retry() {
        let log = MemoryLogManager::new()
            .create_or_open("document", 2)
            .unwrap();
        produce(&log, 3, 1, 9).await;

        let sink = FlakySink::new(3);
        let store = sink.inner.clone();
        let report = drained(&log)
            .retry(fast_retry(5_000))
            .build()
            .unwrap()
            .run(move |_| Ok(sink.clone()))
            .await
            .unwrap();

        assert!(report.all_drained());
        assert_eq!(report.applied(), 3);
        assert!(report.failures.is_empty());
        let retries: u64 = report.partitions.iter().map(|p| p.metrics.retries).sum();
        assert_eq!(retries, 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_e2e_cancellation_during_backoff() {
        let log = MemoryLogManager::new()
            .create_or_open("document", 1)
            .unwrap();
        produce(&log, 4, 1, 9).await;

        let token = CancellationToken::new();
        let sink = FlakySink::new(u32::MAX);
        let pool = drained(&log)
            .retry(fast_retry(60_000))
            .cancellation(token.clone())
            .build()
            .unwrap();
        let handle = tokio::spawn(pool.run(move |_| Ok(sink.clone())));

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(report.applied(), 0);
        assert!(report.failures.is_empty());
        assert!(matches!(
            report.partitions[0].outcome,
            PartitionOutcome::Cancelled
        ));
        // nothing committed: every record is replayed on restart
        assert_eq!(log.lag("e2e").unwrap().total().pending, 4);
    }

    #[tokio::test]
    async fn test_e2e_json_codec_records() {
        let log = MemoryLogManager::new()
            .create_or_open("document", 2)
            .unwrap();
        let token = CancellationToken::new();
        let appender = LogAppender::new(
            Arc::clone(&log),
            CodecRegistry::builtin().get(JsonCodec::NAME).unwrap(),
            RetrySettings::default(),
            token.clone(),
        );
        let report = ProducerPoolBuilder::new(appender)
            .cancellation(token)
            .build()
            .run(Arc::new(SyntheticSourceNode::root(2, 2, 8)))
            .await
            .unwrap();

        let sink = MemorySink::new("repository");
        let consumed = consume(drained(&log), &sink).await;
        assert_eq!(consumed.applied(), report.produced);
        let codec_ids: Vec<u8> = (0..2)
            .filter_map(|partition| log.read(partition, 0).unwrap())
            .map(|record| record.codec_id)
            .collect();
        assert!(!codec_ids.is_empty());
        assert!(codec_ids.iter().all(|id| *id == JsonCodec::ID));
    }

    /// Configuration drives the whole pipeline: filesystem source into a
    /// directory sink through a file log
    #[tokio::test]
    async fn test_e2e_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("to-import");
        std::fs::create_dir_all(source.join("reports")).unwrap();
        std::fs::write(source.join("readme.txt"), "hello").unwrap();
        std::fs::write(source.join("reports").join("q1.csv"), "a,b\n1,2\n").unwrap();

        let config = format!(
            r#"
[log]
backend = "file"
root = "{root}"
name = "document"
partitions = 2

[producer]
batch_size = 2
[producer.source]
kind = "filesystem"
path = "{source}"

[retry]
kind = "fixed"
base_ms = 1
budget_ms = 50

[sink]
name = "repository"
sink_type = "directory"
[sink.params]
base_path = "{repo}"
"#,
            root = slash(&dir.path().join("logs")),
            source = slash(&source),
            repo = slash(&dir.path().join("repository")),
        );
        let blueprint = ConfigLoader::load_from_str(&config, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.assigned_partitions(), vec![0, 1]);

        let log = FileLogManager::new(blueprint.log.root.clone().unwrap())
            .create_or_open(blueprint.log_name(), blueprint.log.partitions)
            .unwrap();
        let token = CancellationToken::new();
        let appender = LogAppender::new(
            Arc::clone(&log),
            CodecRegistry::builtin().get(&blueprint.log.codec).unwrap(),
            RetrySettings::from_config(&blueprint.retry),
            token.clone(),
        );
        let produced = ProducerPoolBuilder::new(appender)
            .fork_policy(
                fork_policy(
                    &blueprint.producer.fork_policy,
                    blueprint.producer.max_concurrent_producers,
                )
                .unwrap(),
            )
            .batch_size(blueprint.producer.batch_size)
            .log_kind(blueprint.log.name)
            .cancellation(token.clone())
            .build()
            .run(source_root(&blueprint.producer.source).unwrap())
            .await
            .unwrap();
        // reports/, reports/q1.csv, readme.txt
        assert_eq!(produced.produced, 3);

        let drain = CancellationToken::new();
        drain.cancel();
        let factory = SinkFactory::from_config(&blueprint.sink).unwrap();
        let consumed = ConsumerPoolBuilder::from_blueprint(Arc::clone(&log), &blueprint)
            .cancellation(token)
            .drain(drain)
            .build()
            .unwrap()
            .run(move |partition| factory.make(partition))
            .await
            .unwrap();

        assert!(consumed.all_drained());
        assert_eq!(consumed.applied(), 3);
        let documents = dir.path().join("repository").join("documents");
        assert!(documents.exists());
        assert_eq!(log.lag("bulk-import").unwrap().total().pending, 0);
    }

    fn slash(path: &Path) -> String {
        path.display().to_string().replace('\\', "/")
    }
}
