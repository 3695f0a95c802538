//! MemorySink - process-local entity store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use contracts::{EntityId, Message, MessageSink, SinkError};
use tracing::{debug, instrument};

use super::entity_id;

/// Shared in-memory store.
///
/// Clones share the same map, so one store can back every partition
/// worker of a pool. Re-applying a message replaces the entity.
#[derive(Debug, Clone)]
pub struct MemorySink {
    name: String,
    entities: Arc<Mutex<HashMap<EntityId, Message>>>,
    applies: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Arc::new(Mutex::new(HashMap::new())),
            applies: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Distinct entities stored
    pub fn len(&self) -> usize {
        self.lock().map(|entities| entities.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful `apply` calls, counting re-applications
    pub fn applies(&self) -> u64 {
        self.applies.load(Ordering::Relaxed)
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        self.lock().ok()?.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Stored entity ids, sorted
    pub fn ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .lock()
            .map(|entities| entities.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<EntityId, Message>>, SinkError> {
        self.entities
            .lock()
            .map_err(|_| SinkError::rejected(&self.name, "entity map poisoned"))
    }
}

impl MessageSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "memory_sink_apply",
        skip(self, message),
        fields(sink = %self.name, kind = message.kind())
    )]
    async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError> {
        let entity = entity_id(message);
        let replaced = self.lock()?.insert(entity.clone(), message.clone());
        self.applies.fetch_add(1, Ordering::Relaxed);
        if replaced.is_some() {
            debug!(entity = %entity, "Entity re-applied");
        }
        Ok(entity)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
