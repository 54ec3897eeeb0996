//! Bridges: an accessory aggregating other accessories

use std::collections::BTreeMap;

use hap_types::{Aid, Category, STANDALONE_AID};

use super::{Accessory, AidAllocator};
use crate::error::RegistryError;

/// A bridge and the accessories behind it
///
/// The bridge itself always takes the standalone aid; children receive
/// unique aids from the bridge's allocator.
#[derive(Debug)]
pub struct Bridge {
    accessory: Accessory,
    children: BTreeMap<Aid, Accessory>,
    aids: AidAllocator,
}

impl Bridge {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::from_accessory(Accessory::new(display_name).with_category(Category::Bridge))
    }

    /// Turn an accessory into a bridge
    pub fn from_accessory(mut accessory: Accessory) -> Self {
        accessory.set_aid(STANDALONE_AID);
        Self {
            accessory,
            children: BTreeMap::new(),
            aids: AidAllocator::new(),
        }
    }

    /// Attach an accessory, allocating its aid unless one was requested
    ///
    /// Fails without side effects when the requested aid is reserved, zero
    /// or already taken.
    pub fn add_accessory(&mut self, mut accessory: Accessory) -> Result<Aid, RegistryError> {
        let aid = match accessory.aid() {
            Some(aid) => {
                self.aids.reserve(aid, accessory.display_name())?;
                aid
            }
            None => self.aids.allocate(),
        };

        accessory.set_aid(aid);
        tracing::debug!(aid, name = %accessory.display_name(), "Accessory bridged");
        self.children.insert(aid, accessory);
        Ok(aid)
    }

    /// The bridge's own accessory
    pub fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    /// Bridged accessories ordered by aid
    pub fn children(&self) -> impl Iterator<Item = &Accessory> {
        self.children.values()
    }

    pub fn get(&self, aid: Aid) -> Option<&Accessory> {
        if aid == STANDALONE_AID {
            return Some(&self.accessory);
        }
        self.children.get(&aid)
    }

    pub fn get_mut(&mut self, aid: Aid) -> Option<&mut Accessory> {
        if aid == STANDALONE_AID {
            return Some(&mut self.accessory);
        }
        self.children.get_mut(&aid)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_get_unique_aids() {
        let mut bridge = Bridge::new("Bridge");
        let a = bridge.add_accessory(Accessory::new("A")).unwrap();
        let b = bridge.add_accessory(Accessory::new("B")).unwrap();

        assert_eq!(bridge.accessory().aid(), Some(STANDALONE_AID));
        assert_eq!(bridge.accessory().category(), Category::Bridge);
        assert_ne!(a, b);
        assert!(a > STANDALONE_AID && b > STANDALONE_AID);
        assert_eq!(bridge.get(a).unwrap().display_name(), "A");
    }

    #[test]
    fn test_rejected_child_leaves_bridge_untouched() {
        let mut bridge = Bridge::new("Bridge");
        bridge.add_accessory(Accessory::new("A").with_aid(5)).unwrap();

        let dup = bridge.add_accessory(Accessory::new("B").with_aid(5));
        assert!(matches!(dup, Err(RegistryError::DuplicateAid(5))));

        let reserved = bridge.add_accessory(Accessory::new("C").with_aid(STANDALONE_AID));
        assert!(matches!(reserved, Err(RegistryError::ReservedAid { .. })));

        assert_eq!(bridge.len(), 1);
        assert_eq!(bridge.get(5).unwrap().display_name(), "A");
    }
}
