//! Cursor leases - at most one consumer per (group, partition)

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use contracts::IngestError;

type LeaseKey = (String, u32);

/// In-process table of held leases, one per log
#[derive(Debug, Default, Clone)]
pub(crate) struct LeaseTable {
    held: Arc<Mutex<HashSet<LeaseKey>>>,
}

impl LeaseTable {
    pub fn acquire(&self, log: &str, group: &str, partition: u32) -> Result<CursorLease, IngestError> {
        let key = (group.to_string(), partition);
        let mut held = self
            .held
            .lock()
            .map_err(|_| IngestError::Other("lease table poisoned".to_string()))?;

        if !held.insert(key.clone()) {
            return Err(IngestError::PartitionBusy {
                log: log.to_string(),
                group: group.to_string(),
                partition,
            });
        }

        Ok(CursorLease {
            table: self.held.clone(),
            key,
        })
    }
}

/// Held while a consumer owns a cursor; released on drop
#[derive(Debug)]
pub struct CursorLease {
    table: Arc<Mutex<HashSet<LeaseKey>>>,
    key: LeaseKey,
}

impl CursorLease {
    pub fn group(&self) -> &str {
        &self.key.0
    }

    pub fn partition(&self) -> u32 {
        self.key.1
    }
}

impl Drop for CursorLease {
    fn drop(&mut self) {
        // a poisoned table is still released
        let mut held = match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lease_is_busy() {
        let table = LeaseTable::default();
        let lease = table.acquire("document", "g", 0).unwrap();
        assert_eq!(lease.partition(), 0);

        let err = table.acquire("document", "g", 0).unwrap_err();
        assert!(matches!(err, IngestError::PartitionBusy { partition: 0, .. }));

        // other partition or group is free
        let _other = table.acquire("document", "g", 1).unwrap();
        let _group = table.acquire("document", "h", 0).unwrap();

        drop(lease);
        assert!(table.acquire("document", "g", 0).is_ok());
    }
}
