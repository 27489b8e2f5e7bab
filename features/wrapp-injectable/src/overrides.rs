use std::collections::{HashMap, HashSet};

use crate::{
    composite_map::CompositeMap,
    injectable::{InjectableDef, InstantiateFn},
    types::{Instance, KeyPart},
};

/// Replacement factory of an injectable, caching its own instances
pub(crate) struct Override {
    pub instantiate: InstantiateFn,
    pub instances: CompositeMap<KeyPart, Instance>,
}

/// Override stacks and the side effect gate
#[derive(Default)]
pub(crate) struct Overrides {
    stacks: HashMap<u64, Vec<Override>>,
    injected: HashSet<u64>,
    side_effects_prevented: bool,
    permitted: HashSet<u64>,
}

impl Overrides {
    pub fn push(&mut self, serial: u64, instantiate: InstantiateFn) {
        self.stacks.entry(serial).or_default().push(Override {
            instantiate,
            instances: CompositeMap::new(),
        });
    }

    /// The most recently pushed override
    pub fn active(&self, serial: u64) -> Option<&Override> {
        self.stacks.get(&serial).and_then(|stack| stack.last())
    }

    pub fn active_mut(&mut self, serial: u64) -> Option<&mut Override> {
        self.stacks.get_mut(&serial).and_then(|stack| stack.last_mut())
    }

    /// Drops every override of the injectable, returning how many there were
    pub fn remove(&mut self, serial: u64) -> usize {
        self.stacks.remove(&serial).map_or(0, |stack| stack.len())
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
    }

    /// Drops the instances cached by the overrides of the injectable
    pub fn purge(&mut self, serial: u64) {
        for entry in self.stacks.get_mut(&serial).into_iter().flatten() {
            entry.instances.clear();
        }
    }

    pub fn mark_injected(&mut self, serial: u64) {
        self.injected.insert(serial);
    }

    pub fn was_injected(&self, serial: u64) -> bool {
        self.injected.contains(&serial)
    }

    /// Forgets everything known about a deregistered injectable
    pub fn forget(&mut self, serial: u64) {
        self.stacks.remove(&serial);
        self.injected.remove(&serial);
    }

    pub fn prevent_side_effects(&mut self) {
        self.side_effects_prevented = true;
    }

    pub fn permit_side_effects(&mut self, serial: u64) {
        self.permitted.insert(serial);
    }

    /// Whether instantiating the injectable is currently refused
    pub fn blocks(&self, def: &InjectableDef) -> bool {
        self.side_effects_prevented
            && def.causes_side_effects
            && !self.permitted.contains(&def.serial)
    }
}
