//! Tail - restartable partition reader

use contracts::{IngestError, LogRecord, Offset};

use crate::Log;

/// Lazy reader over one partition.
///
/// The only state is the next offset, so a tail can be rebuilt from a
/// committed cursor at any time. Not fused: `None` means caught up for
/// now, and a later `next` yields records appended in the meantime.
pub struct Tail<'a> {
    log: &'a dyn Log,
    partition: u32,
    next: Offset,
}

impl<'a> Tail<'a> {
    pub fn new(log: &'a dyn Log, partition: u32, from: Offset) -> Self {
        Self {
            log,
            partition,
            next: from,
        }
    }

    /// Offset of the next record this tail returns
    pub fn position(&self) -> Offset {
        self.next
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Whether every record appended so far was returned
    pub fn caught_up(&self) -> Result<bool, IngestError> {
        Ok(self.next >= self.log.end_offset(self.partition)?)
    }
}

impl Iterator for Tail<'_> {
    type Item = Result<LogRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.log.read(self.partition, self.next) {
            Ok(Some(record)) => {
                self.next += 1;
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::fmt::Debug for Tail<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tail")
            .field("log", &self.log.name())
            .field("partition", &self.partition)
            .field("next", &self.next)
            .finish()
    }
}
