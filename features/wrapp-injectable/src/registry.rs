use std::{collections::HashMap, sync::Arc};

use crate::{
    composite_map::CompositeMap,
    context::Context,
    errors::InjectError,
    injectable::{Alias, InjectableDef},
    types::{Instance, KeyPart},
};

/// A registered injectable together with its instance cache
pub(crate) struct Registration {
    pub def: Arc<InjectableDef>,
    pub namespaced_id: String,
    /// Context the injectable was registered from
    pub context: Context,
    pub instances: CompositeMap<KeyPart, Instance>,
}

/// Everything registered in one container
#[derive(Default)]
pub(crate) struct Registry {
    registrations: HashMap<u64, Registration>,
    /// Serials in registration order
    order: Vec<u64>,
    ids: HashMap<String, u64>,
    by_token: HashMap<u64, Vec<u64>>,
}

/// Id of an injectable registered from within the given context
pub(crate) fn namespaced_id(context: &Context, id: &str) -> String {
    match context.head().injectable() {
        Some(_) => format!("{}:{}", context.head().id(), id),
        None => id.to_string(),
    }
}

impl Registry {
    /// Fails if any of the injectables can not be registered, without registering anything
    pub fn validate(
        &self,
        batch: &[(Arc<InjectableDef>, String)],
        context: &Context,
    ) -> Result<(), InjectError> {
        for (index, (def, namespaced_id)) in batch.iter().enumerate() {
            let earlier = &batch[..index];

            if self.registrations.contains_key(&def.serial)
                || earlier.iter().any(|(other, _)| other.serial == def.serial)
            {
                return Err(InjectError::DuplicateRegistration {
                    id: namespaced_id.clone(),
                    same_injectable: true,
                    chain: context.chain().with(namespaced_id.clone()),
                });
            }

            if self.ids.contains_key(namespaced_id)
                || earlier.iter().any(|(_, other)| other == namespaced_id)
            {
                return Err(InjectError::DuplicateRegistration {
                    id: namespaced_id.clone(),
                    same_injectable: false,
                    chain: context.chain().with(namespaced_id.clone()),
                });
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, def: Arc<InjectableDef>, namespaced_id: String, context: Context) {
        let serial = def.serial;

        for token in def.token_lineage() {
            self.by_token.entry(token.serial).or_default().push(serial);
        }
        self.ids.insert(namespaced_id.clone(), serial);
        self.order.push(serial);
        self.registrations.insert(
            serial,
            Registration {
                def,
                namespaced_id,
                context,
                instances: CompositeMap::new(),
            },
        );
    }

    pub fn remove(&mut self, serial: u64) -> Option<Registration> {
        let registration = self.registrations.remove(&serial)?;

        self.ids.remove(&registration.namespaced_id);
        self.order.retain(|other| *other != serial);
        for token in registration.def.token_lineage() {
            if let Some(implementations) = self.by_token.get_mut(&token.serial) {
                implementations.retain(|other| *other != serial);
                if implementations.is_empty() {
                    self.by_token.remove(&token.serial);
                }
            }
        }

        Some(registration)
    }

    pub fn get(&self, serial: u64) -> Option<&Registration> {
        self.registrations.get(&serial)
    }

    pub fn get_mut(&mut self, serial: u64) -> Option<&mut Registration> {
        self.registrations.get_mut(&serial)
    }

    /// All registrations, in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Registration> + '_ {
        self.order
            .iter()
            .filter_map(|serial| self.registrations.get(serial))
    }

    pub fn contains(&self, serial: u64) -> bool {
        self.registrations.contains_key(&serial)
    }

    /// Registered injectables resolvable through the alias, in registration order
    pub fn related(&self, alias: &Alias) -> Vec<Arc<InjectableDef>> {
        match alias {
            Alias::Injectable(def) => self
                .registrations
                .get(&def.serial)
                .map(|registration| vec![registration.def.clone()])
                .unwrap_or_default(),
            Alias::Token(token) => self
                .by_token
                .get(&token.serial)
                .into_iter()
                .flatten()
                .filter_map(|serial| self.registrations.get(serial))
                .map(|registration| registration.def.clone())
                .collect(),
        }
    }

    /// Injectables registered from within the instantiation of the given one, in registration order
    pub fn registered_within(&self, serial: u64) -> Vec<Arc<InjectableDef>> {
        self.iter()
            .filter(|registration| registration.context.contains(serial))
            .map(|registration| registration.def.clone())
            .collect()
    }

    /// Id used in messages and metadata
    pub fn display_id(&self, alias: &Alias) -> String {
        match alias {
            Alias::Injectable(def) => self
                .registrations
                .get(&def.serial)
                .map(|registration| registration.namespaced_id.clone())
                .unwrap_or_else(|| def.id.clone()),
            Alias::Token(token) => token.id.clone(),
        }
    }

    /// Drops the cached instances of every registration
    pub fn purge_all(&mut self) {
        for registration in self.registrations.values_mut() {
            registration.instances.clear();
        }
    }
}
