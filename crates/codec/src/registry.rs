//! CodecRegistry - name and wire-id lookup

use std::sync::Arc;

use contracts::IngestError;

use crate::{BincodeCodec, Codec, JsonCodec};

/// Constructor registered under a codec name
pub type CodecFactory = fn() -> Arc<dyn Codec>;

fn bincode_factory() -> Arc<dyn Codec> {
    Arc::new(BincodeCodec)
}

fn json_factory() -> Arc<dyn Codec> {
    Arc::new(JsonCodec)
}

/// Fixed table of available codecs
#[derive(Clone)]
pub struct CodecRegistry {
    entries: Vec<(&'static str, u8, CodecFactory)>,
}

impl CodecRegistry {
    /// Registry holding every codec built into this crate
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                (BincodeCodec::NAME, BincodeCodec::ID, bincode_factory),
                (JsonCodec::NAME, JsonCodec::ID, json_factory),
            ],
        }
    }

    /// Look up a codec by its configured name
    ///
    /// # Errors
    /// `IngestError::UnknownCodec` when no codec has that name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Codec>, IngestError> {
        self.entries
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, _, factory)| factory())
            .ok_or_else(|| IngestError::UnknownCodec {
                name: name.to_string(),
            })
    }

    /// Look up a codec by the id stored in a record header
    pub fn by_id(&self, id: u8) -> Result<Arc<dyn Codec>, IngestError> {
        self.entries
            .iter()
            .find(|(_, i, _)| *i == id)
            .map(|(_, _, factory)| factory())
            .ok_or_else(|| IngestError::UnknownCodec {
                name: format!("#{id}"),
            })
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _, _)| *n).collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_CODEC;

    #[test]
    fn test_default_codec_is_registered() {
        let registry = CodecRegistry::builtin();
        let codec = registry.get(DEFAULT_CODEC).unwrap();
        assert_eq!(codec.name(), "bincode");
        assert_eq!(codec.id(), 1);
    }

    #[test]
    fn test_lookup_by_id_matches_name() {
        let registry = CodecRegistry::builtin();
        for name in registry.names() {
            let codec = registry.get(name).unwrap();
            assert_eq!(registry.by_id(codec.id()).unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_codec() {
        let registry = CodecRegistry::builtin();
        let err = registry.get("avro").err().unwrap();
        assert!(matches!(err, IngestError::UnknownCodec { ref name } if name == "avro"));
        assert!(registry.by_id(0).is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(CodecRegistry::builtin().names(), vec!["bincode", "json"]);
    }
}
