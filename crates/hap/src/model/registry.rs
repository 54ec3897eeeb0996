//! The addressable accessory tree
//!
//! A registry holds at most one root accessory. The root is either a
//! standalone accessory or a bridge; in both cases it carries the
//! standalone aid. Further accessories can only be added behind a bridge.

use hap_types::{AccessoriesResponse, Aid, Category, Iid, STANDALONE_AID};

use super::{Accessory, Bridge, Characteristic, Routine};
use crate::error::RegistryError;

/// The top-level accessory
#[derive(Debug)]
pub enum Root {
    Standalone(Accessory),
    Bridge(Bridge),
}

/// Registry of every accessory served by a driver
#[derive(Debug, Default)]
pub struct Registry {
    root: Option<Root>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an accessory
    ///
    /// The first accessory becomes the standalone root and takes the
    /// standalone aid. Once a bridge is the root, accessories are bridged
    /// behind it. A standalone root accepts no further accessories.
    pub fn add_accessory(&mut self, mut accessory: Accessory) -> Result<Aid, RegistryError> {
        match &mut self.root {
            None => {
                match accessory.aid() {
                    None | Some(STANDALONE_AID) => {}
                    Some(aid) => return Err(RegistryError::RootAid(aid)),
                }
                accessory.set_aid(STANDALONE_AID);
                tracing::debug!(name = %accessory.display_name(), "Standalone accessory registered");
                self.root = Some(Root::Standalone(accessory));
                Ok(STANDALONE_AID)
            }
            Some(Root::Bridge(bridge)) => bridge.add_accessory(accessory),
            Some(Root::Standalone(_)) => Err(RegistryError::NoBridge {
                name: accessory.display_name().to_string(),
            }),
        }
    }

    /// Install a bridge as the root
    pub fn add_bridge(&mut self, bridge: Bridge) -> Result<Aid, RegistryError> {
        if self.root.is_some() {
            return Err(RegistryError::DuplicateAid(STANDALONE_AID));
        }
        tracing::debug!(
            name = %bridge.accessory().display_name(),
            bridged = bridge.len(),
            "Bridge registered"
        );
        self.root = Some(Root::Bridge(bridge));
        Ok(STANDALONE_AID)
    }

    pub fn root(&self) -> Option<&Root> {
        self.root.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Category advertised for the registry
    pub fn category(&self) -> Option<Category> {
        self.get(STANDALONE_AID).map(Accessory::category)
    }

    pub fn get(&self, aid: Aid) -> Option<&Accessory> {
        match self.root.as_ref()? {
            Root::Standalone(acc) => (aid == STANDALONE_AID).then_some(acc),
            Root::Bridge(bridge) => bridge.get(aid),
        }
    }

    pub fn get_mut(&mut self, aid: Aid) -> Option<&mut Accessory> {
        match self.root.as_mut()? {
            Root::Standalone(acc) => (aid == STANDALONE_AID).then_some(acc),
            Root::Bridge(bridge) => bridge.get_mut(aid),
        }
    }

    /// Every accessory, root first, then bridged accessories by aid
    pub fn accessories(&self) -> Vec<&Accessory> {
        match &self.root {
            None => Vec::new(),
            Some(Root::Standalone(acc)) => vec![acc],
            Some(Root::Bridge(bridge)) => std::iter::once(bridge.accessory())
                .chain(bridge.children())
                .collect(),
        }
    }

    /// Routines of every accessory, paired with their owner's aid
    pub fn routines(&self) -> Vec<(Aid, Routine)> {
        self.accessories()
            .into_iter()
            .flat_map(|acc| {
                let aid = acc.aid().unwrap_or_default();
                acc.routines().iter().cloned().map(move |r| (aid, r))
            })
            .collect()
    }

    pub fn characteristic(&self, aid: Aid, iid: Iid) -> Option<&Characteristic> {
        self.get(aid)?.characteristic(iid)
    }

    pub fn characteristic_mut(&mut self, aid: Aid, iid: Iid) -> Option<&mut Characteristic> {
        self.get_mut(aid)?.characteristic_mut(iid)
    }

    pub fn set_available(&mut self, aid: Aid, available: bool) -> Result<(), RegistryError> {
        let acc = self.get_mut(aid).ok_or(RegistryError::UnknownAccessory(aid))?;
        acc.set_available(available);
        Ok(())
    }

    /// Render the accessory database
    pub fn to_repr(&self) -> AccessoriesResponse {
        AccessoriesResponse {
            accessories: self.accessories().into_iter().map(Accessory::to_repr).collect(),
        }
    }
}
