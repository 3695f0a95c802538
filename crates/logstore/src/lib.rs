//! # Logstore
//!
//! Named, partitioned, append-only logs.
//!
//! - [`LogManager`]: creates and opens logs; the partition count is fixed at
//!   creation
//! - [`Log`]: per-partition append/read, end offsets and consumer-group
//!   cursors
//! - [`Tail`]: lazy, restartable reader over one partition
//!
//! Backends: [`FileLogManager`] (directory per log, file per partition) and
//! [`MemoryLogManager`].
//!
//! ## Ordering
//! Records of one partition are observed in append order by every reader.
//! Nothing is ordered across partitions.

mod file;
pub mod frame;
mod lease;
mod memory;
mod offsets;
mod tail;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use contracts::{IngestError, LogLag, LogRecord, Offset};

pub use file::{FileLog, FileLogManager, LogMetadata};
pub use lease::CursorLease;
pub use memory::{MemoryLog, MemoryLogManager};
pub use tail::Tail;

/// Owner of named logs
pub trait LogManager: Send + Sync {
    /// Open `name`, creating it with `partitions` partitions if missing.
    ///
    /// # Errors
    /// - `PartitionCountMismatch` when the log exists with another count
    /// - `StorageCorruption` when existing data fails validation
    fn create_or_open(&self, name: &str, partitions: u32) -> Result<Arc<dyn Log>, IngestError>;

    /// Open an existing log
    ///
    /// # Errors
    /// `LogNotFound` when the log was never created
    fn open(&self, name: &str) -> Result<Arc<dyn Log>, IngestError>;

    fn exists(&self, name: &str) -> bool;

    /// Partition count of an existing log
    fn partition_count(&self, name: &str) -> Result<u32, IngestError>;

    /// Names of all logs, sorted
    fn list(&self) -> Result<Vec<String>, IngestError>;
}

/// One named log.
///
/// Single writer per partition is assumed on both sides; implementations
/// still serialize appends per partition so the offset counter is updated
/// atomically.
pub trait Log: Send + Sync {
    fn name(&self) -> &str;

    fn partitions(&self) -> u32;

    /// Append a record, durable once this returns.
    ///
    /// Offsets of a partition are strictly increasing and gap-free.
    fn append(&self, partition: u32, codec_id: u8, payload: &[u8]) -> Result<Offset, IngestError>;

    /// Record at `offset`, or `None` past the end
    fn read(&self, partition: u32, offset: Offset) -> Result<Option<LogRecord>, IngestError>;

    /// Offset the next append will get
    fn end_offset(&self, partition: u32) -> Result<Offset, IngestError>;

    /// Persist the next offset `group` will read from `partition`
    fn commit(&self, group: &str, partition: u32, next_offset: Offset) -> Result<(), IngestError>;

    /// Last committed next offset, 0 when nothing was committed
    fn committed(&self, group: &str, partition: u32) -> Result<Offset, IngestError>;

    /// Exclusive right to advance `group`'s cursor on `partition`
    ///
    /// # Errors
    /// `PartitionBusy` while another lease for the same pair is alive
    fn acquire_cursor(&self, group: &str, partition: u32) -> Result<CursorLease, IngestError>;
}

impl<'a> dyn Log + 'a {
    /// Reader over `partition` starting at `from`
    pub fn tail(&self, partition: u32, from: Offset) -> Tail<'_> {
        Tail::new(self, partition, from)
    }

    /// Lag of `group` on every partition
    pub fn lag(&self, group: &str) -> Result<GroupLag, IngestError> {
        let mut partitions = Vec::with_capacity(self.partitions() as usize);
        for partition in 0..self.partitions() {
            let end = self.end_offset(partition)?;
            let committed = self.committed(group, partition)?.min(end);
            partitions.push(LogLag::of(end - committed, end));
        }
        Ok(GroupLag {
            log: self.name().to_string(),
            group: group.to_string(),
            partitions,
        })
    }
}

/// Lag of a consumer group over a whole log
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GroupLag {
    pub log: String,
    pub group: String,
    /// Indexed by partition
    pub partitions: Vec<LogLag>,
}

impl GroupLag {
    pub fn total(&self) -> LogLag {
        self.partitions
            .iter()
            .fold(LogLag::default(), |acc, lag| acc.merge(*lag))
    }
}

pub(crate) fn check_partition(log: &str, partition: u32, partitions: u32) -> Result<(), IngestError> {
    if partition >= partitions {
        return Err(IngestError::InvalidPartition {
            log: log.to_string(),
            partition,
            partitions,
        });
    }
    Ok(())
}

/// Payloads over [`frame::MAX_PAYLOAD_LEN`] could be written but never
/// read back, so every backend refuses them up front
pub(crate) fn check_payload_len(log: &str, partition: u32, len: usize) -> Result<(), IngestError> {
    let max = u64::from(frame::MAX_PAYLOAD_LEN);
    let size = len as u64;
    if size > max {
        return Err(IngestError::InvalidPayload {
            log: log.to_string(),
            partition,
            size,
            max,
        });
    }
    Ok(())
}

/// Group names end up in file names
pub(crate) fn check_group(group: &str) -> Result<(), IngestError> {
    let valid = !group.is_empty()
        && group
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && group != "."
        && group != "..";
    if !valid {
        return Err(IngestError::config_validation(
            "consumer.group",
            format!("invalid consumer group name '{group}'"),
        ));
    }
    Ok(())
}

pub(crate) fn check_partition_count(log: &str, partitions: u32) -> Result<(), IngestError> {
    if partitions == 0 {
        return Err(IngestError::config_validation(
            "log.partitions",
            format!("log '{log}' needs at least one partition"),
        ));
    }
    Ok(())
}

/// Replace `path` with `bytes` through a synced temp file, so a crash
/// leaves either the old or the new content
pub(crate) fn write_durable(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)?;

    // persist the rename itself
    if let Some(dir) = path.parent() {
        if let Ok(dir) = File::open(dir) {
            dir.sync_all()?;
        }
    }
    Ok(())
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_names() {
        assert!(check_group("bulk-import").is_ok());
        assert!(check_group("group_1.v2").is_ok());
        assert!(check_group("").is_err());
        assert!(check_group("..").is_err());
        assert!(check_group("a/b").is_err());
    }

    /// Reads through a borrowed trait object, as callers holding `&dyn Log` do
    fn payloads(log: &dyn Log, partition: u32) -> Vec<Vec<u8>> {
        log.tail(partition, 0)
            .map(|record| record.unwrap().payload.to_vec())
            .collect()
    }

    #[test]
    fn test_tail_and_lag_on_borrowed_log() {
        let manager = MemoryLogManager::new();
        let log = manager.create_or_open("blob", 1).unwrap();
        log.append(0, 1, b"a").unwrap();
        log.append(0, 1, b"b").unwrap();

        let borrowed: &dyn Log = log.as_ref();
        assert_eq!(payloads(borrowed, 0), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(borrowed.lag("g").unwrap().total(), LogLag::of(2, 2));
    }

    #[test]
    fn test_write_durable_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.json");
        write_durable(&path, b"{\"0\":1}").unwrap();
        write_durable(&path, b"{\"0\":2}").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{\"0\":2}");
        assert!(!dir.path().join("g.json.tmp").exists());
    }

    #[test]
    fn test_payload_limit() {
        let max = frame::MAX_PAYLOAD_LEN as usize;
        assert!(check_payload_len("blob", 0, max).is_ok());
        assert!(matches!(
            check_payload_len("blob", 3, max + 1),
            Err(IngestError::InvalidPayload { partition: 3, .. })
        ));
    }

    #[test]
    fn test_group_lag_lifecycle() {
        let manager = MemoryLogManager::new();
        let log = manager.create_or_open("document", 2).unwrap();
        for i in 0..5u8 {
            log.append(u32::from(i % 2), 1, &[i]).unwrap();
        }
        log.commit("g", 0, 2).unwrap();

        let lag = log.lag("g").unwrap();
        assert_eq!(lag.partitions, vec![LogLag::of(1, 3), LogLag::of(2, 2)]);
        assert_eq!(lag.total(), LogLag::of(3, 5));
        assert_eq!(lag.total().committed(), 2);
    }
}
