//! Consumer-group cursor store: `offsets/<group>.json`

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use contracts::{IngestError, Offset};

use crate::write_durable;

type GroupOffsets = BTreeMap<u32, Offset>;

/// Committed offsets of every group of one log
#[derive(Debug)]
pub(crate) struct OffsetStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, GroupOffsets>>,
}

impl OffsetStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn path(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{group}.json"))
    }

    fn load(&self, group: &str) -> Result<GroupOffsets, IngestError> {
        let path = self.path(group);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                IngestError::Other(format!("unreadable offsets file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GroupOffsets::new()),
            Err(e) => Err(IngestError::transient(
                format!("reading offsets of group '{group}'"),
                e,
            )),
        }
    }

    pub fn committed(&self, group: &str, partition: u32) -> Result<Offset, IngestError> {
        let mut cache = self.lock()?;
        if !cache.contains_key(group) {
            let loaded = self.load(group)?;
            cache.insert(group.to_string(), loaded);
        }
        Ok(cache
            .get(group)
            .and_then(|offsets| offsets.get(&partition).copied())
            .unwrap_or(0))
    }

    /// Synced temp file then rename, so a crash never leaves a half-written file
    pub fn commit(&self, group: &str, partition: u32, next_offset: Offset) -> Result<(), IngestError> {
        let mut cache = self.lock()?;
        if !cache.contains_key(group) {
            let loaded = self.load(group)?;
            cache.insert(group.to_string(), loaded);
        }

        let mut offsets = cache.get(group).cloned().unwrap_or_default();
        offsets.insert(partition, next_offset);

        let context = || format!("committing offsets of group '{group}'");
        let json = serde_json::to_vec_pretty(&offsets)
            .map_err(|e| IngestError::Other(format!("{}: {e}", context())))?;

        fs::create_dir_all(&self.dir).map_err(|e| IngestError::transient(context(), e))?;
        write_durable(&self.path(group), &json).map_err(|e| IngestError::transient(context(), e))?;

        cache.insert(group.to_string(), offsets);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, GroupOffsets>>, IngestError> {
        self.cache
            .lock()
            .map_err(|_| IngestError::Other("offset cache poisoned".to_string()))
    }
}
