//! UUID→subvolume lookup and the snapshot-lineage ancestor walk.

use std::collections::HashMap;

use crate::error::GraphError;
use crate::subvolume::Subvolume;

/// Indexes a set of subvolumes by UUID and exposes the ancestor walk over
/// the snapshot-lineage forest (`parent_uuid` edges).
pub struct SubvolumeGraph<'a> {
    by_uuid: HashMap<&'a str, &'a Subvolume>,
}

impl<'a> SubvolumeGraph<'a> {
    pub fn build(subvolumes: &'a [Subvolume]) -> Result<Self, GraphError> {
        let mut by_uuid = HashMap::with_capacity(subvolumes.len());
        for sv in subvolumes {
            if by_uuid.insert(sv.uuid.as_str(), sv).is_some() {
                return Err(GraphError::DuplicateUuid(sv.uuid.clone()));
            }
        }
        Ok(Self { by_uuid })
    }

    pub fn get(&self, uuid: &str) -> Option<&'a Subvolume> {
        self.by_uuid.get(uuid).copied()
    }

    /// The subvolume's direct snapshot origin, if it is in the working set.
    pub fn origin(&self, sv: &Subvolume) -> Option<&'a Subvolume> {
        self.get(sv.parent_uuid.as_deref()?)
    }

    /// Lazily walks `origin(sv), origin(origin(sv)), ...` until
    /// `parent_uuid` is absent or leaves the working set. Finite,
    /// non-restartable, and never revisits a node (a `parent_uuid` chain
    /// cannot cycle back into the working set without the origin also
    /// being missing from it, since every subvolume appears at most once).
    pub fn ancestors(&self, sv: &'a Subvolume) -> Ancestors<'a, '_> {
        Ancestors {
            graph: self,
            current: Some(sv),
        }
    }
}

pub struct Ancestors<'a, 'g> {
    graph: &'g SubvolumeGraph<'a>,
    current: Option<&'a Subvolume>,
}

impl<'a, 'g> Iterator for Ancestors<'a, 'g> {
    type Item = &'a Subvolume;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.graph.origin(self.current?)?;
        self.current = Some(next);
        Some(next)
    }
}
