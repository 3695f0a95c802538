//! FileLogManager - directory per log, file per partition
//!
//! ```text
//! <root>/<log>/metadata.json
//! <root>/<log>/partition-00000.log
//! <root>/<log>/offsets/<group>.json
//! ```

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use contracts::{IngestError, LogRecord, Offset};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::frame::{self, FrameHeader, HEADER_LEN};
use crate::lease::LeaseTable;
use crate::offsets::OffsetStore;
use crate::{
    check_group, check_partition, check_partition_count, check_payload_len, now_millis,
    write_durable, CursorLease, Log, LogManager,
};

const METADATA_FILE: &str = "metadata.json";

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMetadata {
    pub name: String,
    pub partitions: u32,
    /// RFC 3339
    pub created_at: String,
}

/// File-backed log manager.
///
/// Opened logs are cached, so every handle to one log in this process
/// shares partition locks and cursor leases.
#[derive(Debug)]
pub struct FileLogManager {
    root: PathBuf,
    open: Mutex<HashMap<String, Arc<FileLog>>>,
}

impl FileLogManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn log_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_metadata(&self, name: &str) -> Result<Option<LogMetadata>, IngestError> {
        let path = self.log_dir(name).join(METADATA_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                IngestError::storage_corruption(name, 0, 0, format!("bad {METADATA_FILE}: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IngestError::transient(format!("reading metadata of log '{name}'"), e)),
        }
    }

    fn cache(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<FileLog>>>, IngestError> {
        self.open
            .lock()
            .map_err(|_| IngestError::Other("log cache poisoned".to_string()))
    }
}

impl LogManager for FileLogManager {
    #[instrument(name = "log_create_or_open", skip(self), fields(root = %self.root.display()))]
    fn create_or_open(&self, name: &str, partitions: u32) -> Result<Arc<dyn Log>, IngestError> {
        check_partition_count(name, partitions)?;
        let mut cache = self.cache()?;

        if let Some(log) = cache.get(name) {
            if log.partitions() != partitions {
                return Err(IngestError::PartitionCountMismatch {
                    log: name.to_string(),
                    requested: partitions,
                    actual: log.partitions(),
                });
            }
            return Ok(log.clone());
        }

        let dir = self.log_dir(name);
        let metadata = match self.read_metadata(name)? {
            Some(metadata) if metadata.partitions != partitions => {
                return Err(IngestError::PartitionCountMismatch {
                    log: name.to_string(),
                    requested: partitions,
                    actual: metadata.partitions,
                });
            }
            Some(metadata) => metadata,
            None => {
                let metadata = LogMetadata {
                    name: name.to_string(),
                    partitions,
                    created_at: chrono::Utc::now().to_rfc3339(),
                };
                write_metadata(&dir, &metadata)?;
                info!(log = name, partitions, "Created log");
                metadata
            }
        };

        let log = Arc::new(FileLog::open(dir, metadata)?);
        cache.insert(name.to_string(), log.clone());
        Ok(log)
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Log>, IngestError> {
        if let Some(log) = self.cache()?.get(name) {
            return Ok(log.clone());
        }
        let partitions = self.partition_count(name)?;
        self.create_or_open(name, partitions)
    }

    fn exists(&self, name: &str) -> bool {
        self.log_dir(name).join(METADATA_FILE).is_file()
    }

    fn partition_count(&self, name: &str) -> Result<u32, IngestError> {
        self.read_metadata(name)?
            .map(|metadata| metadata.partitions)
            .ok_or_else(|| IngestError::LogNotFound {
                log: name.to_string(),
            })
    }

    fn list(&self) -> Result<Vec<String>, IngestError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IngestError::transient("listing logs", e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| IngestError::transient("listing logs", e))?;
            if let Some(name) = entry.file_name().to_str() {
                if self.exists(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn write_metadata(dir: &Path, metadata: &LogMetadata) -> Result<(), IngestError> {
    let context = || format!("creating log '{}'", metadata.name);
    fs::create_dir_all(dir.join("offsets")).map_err(|e| IngestError::transient(context(), e))?;

    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| IngestError::Other(format!("{}: {e}", context())))?;
    write_durable(&dir.join(METADATA_FILE), &json).map_err(|e| IngestError::transient(context(), e))
}

/// One partition file and its offset index
#[derive(Debug)]
struct PartitionFile {
    file: File,
    /// Start position of each record, indexed by offset
    positions: Vec<u64>,
    len: u64,
    /// Set when a failed append could not be rolled back; the file no
    /// longer matches `positions` until the log is reopened and recovered
    damaged: Option<String>,
}

/// File-backed log
#[derive(Debug)]
pub struct FileLog {
    name: String,
    dir: PathBuf,
    partitions: Vec<Mutex<PartitionFile>>,
    offsets: OffsetStore,
    leases: LeaseTable,
}

impl FileLog {
    /// Open every partition file, rebuilding offset indexes
    fn open(dir: PathBuf, metadata: LogMetadata) -> Result<Self, IngestError> {
        let mut partitions = Vec::with_capacity(metadata.partitions as usize);
        for partition in 0..metadata.partitions {
            let path = dir.join(partition_file_name(partition));
            partitions.push(Mutex::new(recover_partition(&metadata.name, partition, &path)?));
        }

        Ok(Self {
            offsets: OffsetStore::new(dir.join("offsets")),
            name: metadata.name,
            dir,
            partitions,
            leases: LeaseTable::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn partition(&self, partition: u32) -> Result<MutexGuard<'_, PartitionFile>, IngestError> {
        check_partition(&self.name, partition, self.partitions())?;
        let part = self.partitions[partition as usize]
            .lock()
            .map_err(|_| IngestError::Other(format!("partition {partition} lock poisoned")))?;
        if let Some(reason) = &part.damaged {
            return Err(IngestError::storage_corruption(
                &self.name,
                partition,
                part.positions.len() as Offset,
                reason.clone(),
            ));
        }
        Ok(part)
    }
}

pub(crate) fn partition_file_name(partition: u32) -> String {
    format!("partition-{partition:05}.log")
}

/// Scan a partition file, truncating a torn trailing frame
fn recover_partition(log: &str, partition: u32, path: &Path) -> Result<PartitionFile, IngestError> {
    let context = || format!("opening partition {partition} of log '{log}'");
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| IngestError::transient(context(), e))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| IngestError::transient(context(), e))?;

    let scan = frame::scan(&bytes).map_err(|e| {
        IngestError::storage_corruption(log, partition, e.offset, e.defect.to_string())
    })?;

    if scan.torn_bytes > 0 {
        warn!(
            log,
            partition,
            records = scan.positions.len(),
            torn_bytes = scan.torn_bytes,
            "Truncating torn write at end of partition"
        );
        file.set_len(scan.valid_len)
            .map_err(|e| IngestError::transient(context(), e))?;
        file.sync_all()
            .map_err(|e| IngestError::transient(context(), e))?;
    }

    debug!(log, partition, records = scan.positions.len(), "Partition recovered");
    Ok(PartitionFile {
        file,
        positions: scan.positions,
        len: scan.valid_len,
        damaged: None,
    })
}

impl Log for FileLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn partitions(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn append(&self, partition: u32, codec_id: u8, payload: &[u8]) -> Result<Offset, IngestError> {
        check_payload_len(&self.name, partition, payload.len())?;
        let mut part = self.partition(partition)?;
        let context = || format!("appending to partition {partition} of log '{}'", self.name);

        let bytes = frame::encode(codec_id, payload, now_millis());
        if let Err(e) = part.file.write_all(&bytes).and_then(|_| part.file.sync_data()) {
            // drop whatever part of the frame made it to disk
            let len = part.len;
            if let Err(rollback) = part.file.set_len(len) {
                let reason = format!("append failed ({e}) and could not be rolled back: {rollback}");
                error!(
                    log = %self.name,
                    partition,
                    offset = part.positions.len(),
                    reason,
                    "Partition damaged, reopen the log to recover"
                );
                part.damaged = Some(reason.clone());
                return Err(IngestError::storage_corruption(
                    &self.name,
                    partition,
                    part.positions.len() as Offset,
                    reason,
                ));
            }
            return Err(IngestError::transient(context(), e));
        }

        let offset = part.positions.len() as Offset;
        let position = part.len;
        part.positions.push(position);
        part.len += bytes.len() as u64;
        Ok(offset)
    }

    fn read(&self, partition: u32, offset: Offset) -> Result<Option<LogRecord>, IngestError> {
        let mut part = self.partition(partition)?;
        let Some(&position) = part.positions.get(offset as usize) else {
            return Ok(None);
        };

        let corrupt = |message: String| {
            IngestError::storage_corruption(&self.name, partition, offset, message)
        };
        let context = || format!("reading partition {partition} of log '{}'", self.name);

        part.file
            .seek(SeekFrom::Start(position))
            .map_err(|e| IngestError::transient(context(), e))?;

        let mut header = [0u8; HEADER_LEN];
        part.file.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => corrupt("frame header cut short".to_string()),
            _ => IngestError::transient(context(), e),
        })?;
        let header = FrameHeader::parse(&header);
        frame::check_len(&header).map_err(|d| corrupt(d.to_string()))?;

        let mut payload = vec![0u8; header.len as usize];
        part.file.read_exact(&mut payload).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => corrupt("frame payload cut short".to_string()),
            _ => IngestError::transient(context(), e),
        })?;
        frame::check_crc(&header, &payload).map_err(|d| corrupt(d.to_string()))?;

        Ok(Some(LogRecord {
            partition,
            offset,
            codec_id: header.codec_id,
            payload: Bytes::from(payload),
            append_timestamp: header.append_timestamp,
        }))
    }

    fn end_offset(&self, partition: u32) -> Result<Offset, IngestError> {
        Ok(self.partition(partition)?.positions.len() as Offset)
    }

    fn commit(&self, group: &str, partition: u32, next_offset: Offset) -> Result<(), IngestError> {
        check_group(group)?;
        check_partition(&self.name, partition, self.partitions())?;
        self.offsets.commit(group, partition, next_offset)
    }

    fn committed(&self, group: &str, partition: u32) -> Result<Offset, IngestError> {
        check_group(group)?;
        check_partition(&self.name, partition, self.partitions())?;
        self.offsets.committed(group, partition)
    }

    fn acquire_cursor(&self, group: &str, partition: u32) -> Result<CursorLease, IngestError> {
        check_group(group)?;
        check_partition(&self.name, partition, self.partitions())?;
        self.leases.acquire(&self.name, group, partition)
    }
}
