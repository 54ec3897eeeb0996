//! Identifier allocators
//!
//! Both allocators are monotonic: an id handed out (or reserved) is never
//! issued again for the lifetime of the allocator.

use std::collections::BTreeSet;

use hap_types::{Aid, Iid, STANDALONE_AID};

use crate::error::RegistryError;

/// Issues accessory ids for the children of a bridge
#[derive(Debug, Clone)]
pub struct AidAllocator {
    next: Aid,
    used: BTreeSet<Aid>,
}

impl AidAllocator {
    pub fn new() -> Self {
        Self {
            next: STANDALONE_AID + 1,
            used: BTreeSet::new(),
        }
    }

    /// Issue the next free aid
    pub fn allocate(&mut self) -> Aid {
        while self.used.contains(&self.next) {
            self.next += 1;
        }
        let aid = self.next;
        self.used.insert(aid);
        self.next += 1;
        aid
    }

    /// Claim an explicitly chosen aid
    pub fn reserve(&mut self, aid: Aid, name: &str) -> Result<(), RegistryError> {
        Self::check(aid, name)?;
        if !self.used.insert(aid) {
            return Err(RegistryError::DuplicateAid(aid));
        }
        Ok(())
    }

    /// Check whether an aid has been issued or reserved
    pub fn is_used(&self, aid: Aid) -> bool {
        self.used.contains(&aid)
    }

    /// Validate an aid proposed for a bridged accessory
    pub fn check(aid: Aid, name: &str) -> Result<(), RegistryError> {
        match aid {
            0 => Err(RegistryError::ZeroAid),
            STANDALONE_AID => Err(RegistryError::ReservedAid {
                name: name.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for AidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Issues instance ids within one accessory, starting at 1
#[derive(Debug, Clone)]
pub struct IidAllocator {
    next: Iid,
}

impl IidAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> Iid {
        let iid = self.next;
        self.next += 1;
        iid
    }
}

impl Default for IidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aid_allocation_skips_reserved() {
        let mut aids = AidAllocator::new();
        aids.reserve(3, "lamp").unwrap();

        assert_eq!(aids.allocate(), 2);
        assert_eq!(aids.allocate(), 4);
        assert!(aids.is_used(3));
    }

    #[test]
    fn test_aid_reserve_rejects_invalid() {
        let mut aids = AidAllocator::new();
        assert!(matches!(
            aids.reserve(STANDALONE_AID, "lamp"),
            Err(RegistryError::ReservedAid { .. })
        ));
        assert!(matches!(aids.reserve(0, "lamp"), Err(RegistryError::ZeroAid)));

        let aid = aids.allocate();
        assert!(matches!(
            aids.reserve(aid, "lamp"),
            Err(RegistryError::DuplicateAid(a)) if a == aid
        ));
    }

    #[test]
    fn test_iids_are_monotonic() {
        let mut iids = IidAllocator::new();
        let issued: Vec<_> = (0..4).map(|_| iids.allocate()).collect();
        assert_eq!(issued, vec![1, 2, 3, 4]);
    }
}
