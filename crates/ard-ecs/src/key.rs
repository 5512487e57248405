use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::component::ComponentId;

/// Sorted, de-duplicated set of component IDs. Identifies an archetype.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    types: SmallVec<[ComponentId; 8]>,
}

impl TypeKey {
    #[inline]
    pub fn from_ids(ids: impl IntoIterator<Item = ComponentId>) -> TypeKey {
        let mut key = TypeKey::default();
        for id in ids {
            key.add_by_id(id);
        }
        key
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ComponentId> {
        self.types.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[ComponentId] {
        &self.types
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.types.binary_search(&id).is_ok()
    }

    /// Position of the component within the key, which is also its column index in chunks of
    /// the matching archetype.
    #[inline]
    pub fn position(&self, id: ComponentId) -> Option<usize> {
        self.types.binary_search(&id).ok()
    }

    /// Returns true if the key contained the type removed.
    #[inline]
    pub fn remove_by_id(&mut self, id: ComponentId) -> bool {
        if let Ok(pos) = self.types.binary_search(&id) {
            self.types.remove(pos);
            true
        } else {
            false
        }
    }

    /// Returns true if the type was already present.
    #[inline]
    pub fn add_by_id(&mut self, id: ComponentId) -> bool {
        if let Err(pos) = self.types.binary_search(&id) {
            self.types.insert(pos, id);
            false
        } else {
            true
        }
    }

    /// Indicates that this type key and the other don't contain any types in common.
    #[inline]
    pub fn disjoint(&self, other: &TypeKey) -> bool {
        let mut self_idx = 0;
        let mut other_idx = 0;
        while self_idx < self.types.len() && other_idx < other.types.len() {
            match self.types[self_idx].cmp(&other.types[other_idx]) {
                Ordering::Equal => return false,
                Ordering::Less => self_idx += 1,
                Ordering::Greater => other_idx += 1,
            }
        }
        true
    }

    /// Indicates that every type in this key is also found in the other key.
    #[inline]
    pub fn subset_of(&self, other: &TypeKey) -> bool {
        let mut i = 0;
        for ty in &other.types {
            if i == self.types.len() {
                break;
            }
            if *ty == self.types[i] {
                i += 1;
            }
        }
        i == self.types.len()
    }
}
