//! EntityId - identifier of an entity created or updated by a sink

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Target-store entity identifier.
///
/// Backed by `Arc<str>`: sinks hand these out per applied record and the
/// consumer keeps them in reports, so clones must stay cheap.
///
/// # Examples
/// ```
/// use contracts::EntityId;
///
/// let id = EntityId::document("/workspaces/reports/q3.pdf");
/// assert_eq!(id.as_str(), "doc:/workspaces/reports/q3.pdf");
/// assert_eq!(id.clone(), id);
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Arc<str>);

impl EntityId {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Id of a document entity, addressed by its full path
    pub fn document(path: &str) -> Self {
        Self::from(format!("doc:{path}"))
    }

    /// Id of a stored blob, addressed by its key
    pub fn blob(key: &str) -> Self {
        Self::from(format!("blob:{key}"))
    }

    /// Id of a blob metadata entity
    pub fn blob_info(key: &str) -> Self {
        Self::from(format!("blobinfo:{key}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for EntityId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl PartialEq<str> for EntityId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for EntityId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:?})", &*self.0)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}
