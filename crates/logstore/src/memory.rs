//! MemoryLogManager - process-local logs for tests and the `memory` backend

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use bytes::Bytes;
use contracts::{IngestError, LogRecord, Offset};

use crate::lease::LeaseTable;
use crate::{
    check_group, check_partition, check_partition_count, check_payload_len, now_millis, CursorLease,
    Log, LogManager,
};

/// In-memory log manager
#[derive(Debug, Default)]
pub struct MemoryLogManager {
    logs: Mutex<HashMap<String, Arc<MemoryLog>>>,
}

impl MemoryLogManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn logs(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<MemoryLog>>>, IngestError> {
        self.logs
            .lock()
            .map_err(|_| IngestError::Other("memory log table poisoned".to_string()))
    }
}

impl LogManager for MemoryLogManager {
    fn create_or_open(&self, name: &str, partitions: u32) -> Result<Arc<dyn Log>, IngestError> {
        check_partition_count(name, partitions)?;
        let mut logs = self.logs()?;
        let log = logs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryLog::new(name, partitions)));

        if log.partitions() != partitions {
            return Err(IngestError::PartitionCountMismatch {
                log: name.to_string(),
                requested: partitions,
                actual: log.partitions(),
            });
        }
        Ok(log.clone())
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Log>, IngestError> {
        self.logs()?
            .get(name)
            .map(|log| log.clone() as Arc<dyn Log>)
            .ok_or_else(|| IngestError::LogNotFound {
                log: name.to_string(),
            })
    }

    fn exists(&self, name: &str) -> bool {
        self.logs().map(|logs| logs.contains_key(name)).unwrap_or(false)
    }

    fn partition_count(&self, name: &str) -> Result<u32, IngestError> {
        Ok(self.open(name)?.partitions())
    }

    fn list(&self) -> Result<Vec<String>, IngestError> {
        let mut names: Vec<String> = self.logs()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// In-memory log
#[derive(Debug)]
pub struct MemoryLog {
    name: String,
    partitions: Vec<RwLock<Vec<LogRecord>>>,
    offsets: Mutex<HashMap<(String, u32), Offset>>,
    leases: LeaseTable,
}

impl MemoryLog {
    pub fn new(name: impl Into<String>, partitions: u32) -> Self {
        Self {
            name: name.into(),
            partitions: (0..partitions).map(|_| RwLock::new(Vec::new())).collect(),
            offsets: Mutex::new(HashMap::new()),
            leases: LeaseTable::default(),
        }
    }

    fn records(&self, partition: u32) -> Result<&RwLock<Vec<LogRecord>>, IngestError> {
        check_partition(&self.name, partition, self.partitions())?;
        Ok(&self.partitions[partition as usize])
    }

    fn poisoned(&self, partition: u32) -> IngestError {
        IngestError::Other(format!("partition {partition} of '{}' poisoned", self.name))
    }
}

impl Log for MemoryLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn partitions(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn append(&self, partition: u32, codec_id: u8, payload: &[u8]) -> Result<Offset, IngestError> {
        check_payload_len(&self.name, partition, payload.len())?;
        let mut records = self
            .records(partition)?
            .write()
            .map_err(|_| self.poisoned(partition))?;

        let offset = records.len() as Offset;
        records.push(LogRecord {
            partition,
            offset,
            codec_id,
            payload: Bytes::copy_from_slice(payload),
            append_timestamp: now_millis(),
        });
        Ok(offset)
    }

    fn read(&self, partition: u32, offset: Offset) -> Result<Option<LogRecord>, IngestError> {
        let records = self
            .records(partition)?
            .read()
            .map_err(|_| self.poisoned(partition))?;
        Ok(records.get(offset as usize).cloned())
    }

    fn end_offset(&self, partition: u32) -> Result<Offset, IngestError> {
        let records = self
            .records(partition)?
            .read()
            .map_err(|_| self.poisoned(partition))?;
        Ok(records.len() as Offset)
    }

    fn commit(&self, group: &str, partition: u32, next_offset: Offset) -> Result<(), IngestError> {
        check_group(group)?;
        check_partition(&self.name, partition, self.partitions())?;
        self.offsets
            .lock()
            .map_err(|_| self.poisoned(partition))?
            .insert((group.to_string(), partition), next_offset);
        Ok(())
    }

    fn committed(&self, group: &str, partition: u32) -> Result<Offset, IngestError> {
        check_group(group)?;
        check_partition(&self.name, partition, self.partitions())?;
        let offsets = self.offsets.lock().map_err(|_| self.poisoned(partition))?;
        Ok(offsets
            .get(&(group.to_string(), partition))
            .copied()
            .unwrap_or(0))
    }

    fn acquire_cursor(&self, group: &str, partition: u32) -> Result<CursorLease, IngestError> {
        check_group(group)?;
        check_partition(&self.name, partition, self.partitions())?;
        self.leases.acquire(&self.name, group, partition)
    }
}
