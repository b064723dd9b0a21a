use crate::core::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separates an aggregated object's local part from its parent's identity.
pub const AGGREGATE_SEPARATOR: char = '~';
/// Separates an object type from its identifier.
pub const TYPE_SEPARATOR: char = ':';
/// Joins identities inside a stored reference collection.
pub const REFERENCE_DELIMITER: char = '|';

/// Object identity.
///
/// Transient identities carry negative ids and persistent ones positive
/// ids, so the two id spaces never collide. An aggregated identity is
/// owned by its parent and never exists on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Oid {
    Transient {
        spec: String,
        id: i64,
    },
    Persistent {
        spec: String,
        id: i64,
    },
    Aggregated {
        spec: String,
        parent: Box<Oid>,
        local_id: String,
    },
}

impl Oid {
    pub fn transient(spec: impl Into<String>, id: i64) -> Self {
        Oid::Transient {
            spec: spec.into(),
            id,
        }
    }

    pub fn persistent(spec: impl Into<String>, id: i64) -> Self {
        Oid::Persistent {
            spec: spec.into(),
            id,
        }
    }

    pub fn aggregated(spec: impl Into<String>, parent: Oid, local_id: impl Into<String>) -> Self {
        Oid::Aggregated {
            spec: spec.into(),
            parent: Box::new(parent),
            local_id: local_id.into(),
        }
    }

    pub fn spec_name(&self) -> &str {
        match self {
            Oid::Transient { spec, .. }
            | Oid::Persistent { spec, .. }
            | Oid::Aggregated { spec, .. } => spec,
        }
    }

    /// True for a transient root, or an aggregate whose root is still transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Oid::Transient { .. } => true,
            Oid::Persistent { .. } => false,
            Oid::Aggregated { parent, .. } => parent.is_transient(),
        }
    }

    pub fn is_persistent(&self) -> bool {
        !self.is_transient()
    }

    pub fn is_aggregated(&self) -> bool {
        matches!(self, Oid::Aggregated { .. })
    }

    pub fn parent(&self) -> Option<&Oid> {
        match self {
            Oid::Aggregated { parent, .. } => Some(parent),
            _ => None,
        }
    }

    /// The non-aggregated identity at the top of the ownership chain.
    pub fn root(&self) -> &Oid {
        match self {
            Oid::Aggregated { parent, .. } => parent.root(),
            other => other,
        }
    }

    /// Serial id of a root identity.
    pub fn serial(&self) -> Option<i64> {
        match self {
            Oid::Transient { id, .. } | Oid::Persistent { id, .. } => Some(*id),
            Oid::Aggregated { .. } => None,
        }
    }

    /// Rebuilds this identity with `old` replaced by `new` anywhere in its
    /// ownership chain.
    pub fn rebased(&self, old: &Oid, new: &Oid) -> Oid {
        if self == old {
            return new.clone();
        }
        match self {
            Oid::Aggregated {
                spec,
                parent,
                local_id,
            } => Oid::Aggregated {
                spec: spec.clone(),
                parent: Box::new(parent.rebased(old, new)),
                local_id: local_id.clone(),
            },
            other => other.clone(),
        }
    }

    /// Parses the string form produced by `Display`.
    pub fn parse(encoded: &str) -> Result<Oid> {
        let invalid = || StoreError::DomainModel(format!("Invalid object identity '{}'", encoded));

        if let Some(split) = encoded.rfind(AGGREGATE_SEPARATOR) {
            let parent = Oid::parse(&encoded[..split])?;
            let (spec, local_id) = encoded[split + 1..]
                .split_once(TYPE_SEPARATOR)
                .ok_or_else(invalid)?;
            if spec.is_empty() || local_id.is_empty() {
                return Err(invalid());
            }
            return Ok(Oid::aggregated(spec, parent, local_id));
        }

        let (spec, id) = encoded.split_once(TYPE_SEPARATOR).ok_or_else(invalid)?;
        if spec.is_empty() {
            return Err(invalid());
        }
        let id: i64 = id.parse().map_err(|_| invalid())?;
        if id < 0 {
            Ok(Oid::transient(spec, id))
        } else {
            Ok(Oid::persistent(spec, id))
        }
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Oid::Transient { spec, id } | Oid::Persistent { spec, id } => {
                write!(f, "{}{}{}", spec, TYPE_SEPARATOR, id)
            }
            Oid::Aggregated {
                spec,
                parent,
                local_id,
            } => write!(
                f,
                "{}{}{}{}{}",
                parent, AGGREGATE_SEPARATOR, spec, TYPE_SEPARATOR, local_id
            ),
        }
    }
}

/// Stable, printable reference to an entity, independent of any adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bookmark {
    pub object_type: String,
    pub identifier: String,
}

impl Bookmark {
    pub fn new(object_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            identifier: identifier.into(),
        }
    }
}

impl From<&Oid> for Bookmark {
    fn from(oid: &Oid) -> Self {
        let identifier = match oid {
            Oid::Transient { id, .. } | Oid::Persistent { id, .. } => id.to_string(),
            Oid::Aggregated {
                parent, local_id, ..
            } => format!("{}{}{}", parent, AGGREGATE_SEPARATOR, local_id),
        };
        Bookmark::new(oid.spec_name(), identifier)
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.object_type, TYPE_SEPARATOR, self.identifier)
    }
}
