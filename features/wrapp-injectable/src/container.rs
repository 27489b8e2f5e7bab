use std::{
    collections::HashSet,
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, ThreadId},
};

use crate::{
    builder::{ContainerBuilder, ContainerConfig},
    callbacks::{deregistration_callback_token, registration_callback_token, DeregistrationCallback},
    context::Context,
    decorators::{
        self, injection_decorator_token, instantiation_decorator, instantiation_decorator_token,
        InjectFn, InjectionDecorator, InstantiationDecorator,
    },
    dependency_graph::{DependencyGraph, Node},
    errors::{Chain, InjectError, InvalidKeyError},
    handle::DiHandle,
    injectable::{
        typed_instantiate, Alias, Injectable, InjectableDef, InstanceKey, InstantiateFn, Resolvable,
    },
    overrides::Overrides,
    registry::{self, Registry},
    types::{DynError, Injected, Instance, KeyPart, Meta, Parameter, WithMeta},
};

/// Anything which can be registered: a single injectable or a [Bunch]
pub trait Registrable {
    fn injectables(&self) -> Vec<Arc<InjectableDef>>;
}

impl<T: Injected, P: Injected> Registrable for Injectable<T, P> {
    fn injectables(&self) -> Vec<Arc<InjectableDef>> {
        vec![self.def().clone()]
    }
}

impl Registrable for Arc<InjectableDef> {
    fn injectables(&self) -> Vec<Arc<InjectableDef>> {
        vec![self.clone()]
    }
}

impl<R: Registrable> Registrable for Vec<R> {
    fn injectables(&self) -> Vec<Arc<InjectableDef>> {
        self.iter().flat_map(Registrable::injectables).collect()
    }
}

/// Named injectables registered and deregistered together
#[derive(Debug, Clone, Default)]
pub struct Bunch {
    entries: Vec<(String, Arc<InjectableDef>)>,
}

impl Bunch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Injected, P: Injected>(
        mut self,
        name: impl Into<String>,
        injectable: &Injectable<T, P>,
    ) -> Self {
        self.entries.push((name.into(), injectable.def().clone()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<InjectableDef>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, def)| def)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl Registrable for Bunch {
    fn injectables(&self) -> Vec<Arc<InjectableDef>> {
        self.entries.iter().map(|(_, def)| def.clone()).collect()
    }
}

/// Whether a resolution needs exactly one match or takes all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    One,
    Many,
}

/// Resolutions running on one thread, by injectable and instance key
type InFlightKey = (ThreadId, u64, Vec<KeyPart>);

#[derive(Default)]
pub(crate) struct State {
    registry: Registry,
    graph: DependencyGraph,
    overrides: Overrides,
    in_flight: HashSet<InFlightKey>,
}

impl State {
    fn cached(&self, serial: u64, overridden: bool, key: &[KeyPart]) -> Option<Instance> {
        let cache = if overridden {
            &self.overrides.active(serial)?.instances
        } else {
            &self.registry.get(serial)?.instances
        };
        cache.get(key).cloned()
    }

    /// Stores the instance unless another one got stored first, returning the stored one
    fn store(
        &mut self,
        serial: u64,
        overridden: bool,
        key: &[KeyPart],
        instance: Instance,
    ) -> Result<Instance, InvalidKeyError> {
        let cache = if overridden {
            self.overrides.active_mut(serial).map(|entry| &mut entry.instances)
        } else {
            self.registry
                .get_mut(serial)
                .map(|registration| &mut registration.instances)
        };

        // Deregistered or unoverridden in the meantime
        let Some(cache) = cache else {
            return Ok(instance);
        };

        if let Some(existing) = cache.get(key) {
            return Ok(existing.clone());
        }
        cache.insert(key, instance.clone())?;
        Ok(instance)
    }
}

/// Container of injectables.
///
/// Cheap to clone, all clones share the same registrations and instances.
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);

struct ContainerInner {
    config: ContainerConfig,
    state: Mutex<State>,
    decorations: AtomicU64,
}

impl Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        let mut map = f.debug_struct("Container");
        map.field("id", &self.0.config.id);
        for registration in state.registry.iter() {
            map.field(&registration.namespaced_id, &registration.instances.len());
        }
        map.finish()
    }
}

impl Container {
    /// Container with default configuration
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(ContainerConfig::new(id))
    }

    pub fn builder(id: impl Into<String>) -> ContainerBuilder {
        ContainerBuilder::new(id)
    }

    pub(crate) fn with_config(config: ContainerConfig) -> Self {
        let mut state = State::default();
        state.graph.describe(Node::Container, config.id.clone(), false);

        Container(Arc::new(ContainerInner {
            config,
            state: Mutex::new(state),
            decorations: AtomicU64::new(0),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.config.id
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.0.config
    }

    /// Handle at the container root, starting a new resolution episode
    fn root(&self) -> DiHandle {
        DiHandle::new(self.clone(), Context::root(&self.0.config.id))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.0.state)
    }
}

// Public resolution surface
impl Container {
    pub fn inject<R: Resolvable<Parameter = ()>>(&self, alias: &R) -> Result<R::Instance, InjectError> {
        self.root().inject(alias)
    }

    pub fn inject_with<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<R::Instance, InjectError> {
        self.root().inject_with(alias, parameter)
    }

    pub fn inject_many<R: Resolvable<Parameter = ()>>(
        &self,
        alias: &R,
    ) -> Result<Vec<R::Instance>, InjectError> {
        self.root().inject_many(alias)
    }

    pub fn inject_many_with<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<Vec<R::Instance>, InjectError> {
        self.root().inject_many_with(alias, parameter)
    }

    pub fn inject_with_meta<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<WithMeta<R::Instance>, InjectError> {
        self.root().inject_with_meta(alias, parameter)
    }

    pub fn inject_many_with_meta<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<Vec<WithMeta<R::Instance>>, InjectError> {
        self.root().inject_many_with_meta(alias, parameter)
    }

    /// Function resolving the alias from the container root on every call
    pub fn inject_factory<R: Resolvable + 'static>(
        &self,
        alias: &R,
    ) -> impl Fn(R::Parameter) -> Result<R::Instance, InjectError> + Send + Sync + 'static {
        self.root().inject_factory(alias)
    }

    pub fn register(&self, injectables: &impl Registrable) -> Result<(), InjectError> {
        self.root().register(injectables)
    }

    pub fn register_all(&self, injectables: &[&dyn Registrable]) -> Result<(), InjectError> {
        self.root().register_all(injectables)
    }

    pub fn deregister(&self, injectables: &impl Registrable) -> Result<(), InjectError> {
        self.root().deregister(injectables)
    }

    pub fn deregister_all(&self, injectables: &[&dyn Registrable]) -> Result<(), InjectError> {
        self.root().deregister_all(injectables)
    }

    pub fn has_registrations(&self, alias: &impl Resolvable) -> bool {
        !self.state().registry.related(&alias.alias()).is_empty()
    }

    /// Replaces the factory of the injectable the alias resolves to.
    ///
    /// Overrides stack, the latest one is used. Instances cached before stay with the original.
    pub fn override_with<R, F, E>(&self, alias: &R, instantiate: F) -> Result<(), InjectError>
    where
        R: Resolvable,
        F: Fn(&DiHandle, R::Parameter) -> Result<R::Instance, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        self.push_override(&alias.alias(), typed_instantiate(instantiate), false)
    }

    /// Same as [Container::override_with], meant to be called before anything was injected
    pub fn early_override<R, F, E>(&self, alias: &R, instantiate: F) -> Result<(), InjectError>
    where
        R: Resolvable,
        F: Fn(&DiHandle, R::Parameter) -> Result<R::Instance, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        self.push_override(&alias.alias(), typed_instantiate(instantiate), true)
    }

    /// Removes every override of the injectable the alias resolves to
    pub fn unoverride(&self, alias: &impl Resolvable) -> Result<(), InjectError> {
        let mut state = self.state();
        let alias = alias.alias();
        let def = self.single_match(&state, &alias, || InjectError::NotRegistered {
            chain: Chain(vec![self.id().to_string()]).with(alias.id()),
        })?;
        let removed = state.overrides.remove(def.serial);
        tracing::debug!("Removed {removed} override(s) of \"{}\"", def.id);
        Ok(())
    }

    /// Removes all overrides
    pub fn reset(&self) {
        self.state().overrides.clear();
        tracing::debug!("Removed all overrides of container \"{}\"", self.id());
    }

    /// From now on injectables causing side effects fail to instantiate unless permitted
    pub fn prevent_side_effects(&self) {
        self.state().overrides.prevent_side_effects();
    }

    pub fn permit_side_effects(&self, alias: &impl Resolvable) {
        let alias = alias.alias();
        let mut state = self.state();
        let serials = match &alias {
            Alias::Injectable(def) => vec![def.serial],
            Alias::Token(_) => state
                .registry
                .related(&alias)
                .iter()
                .map(|def| def.serial)
                .collect(),
        };
        for serial in serials {
            state.overrides.permit_side_effects(serial);
        }
    }

    /// Drops the cached instances of everything the alias resolves to, overrides included
    pub fn purge(&self, alias: &impl Resolvable) {
        let alias = alias.alias();
        let mut state = self.state();
        for def in state.registry.related(&alias) {
            if let Some(registration) = state.registry.get_mut(def.serial) {
                registration.instances.clear();
            }
            state.overrides.purge(def.serial);
        }
        tracing::debug!("Purged instances of \"{}\"", alias.id());
    }

    /// Drops all cached instances except the ones created by overrides
    pub fn purge_all_but_overrides(&self) {
        self.state().registry.purge_all();
        tracing::debug!("Purged all instances of container \"{}\"", self.id());
    }

    /// Instances already cached for the alias, without instantiating anything
    pub fn get_instances<R: Resolvable>(&self, alias: &R) -> Result<Vec<R::Instance>, InjectError> {
        let state = self.state();
        let mut instances = Vec::new();
        for def in state.registry.related(&alias.alias()) {
            let cache = match state.overrides.active(def.serial) {
                Some(entry) => &entry.instances,
                None => match state.registry.get(def.serial) {
                    Some(registration) => &registration.instances,
                    None => continue,
                },
            };
            for instance in cache.values() {
                instances.push(instance.downcast()?);
            }
        }
        Ok(instances)
    }

    /// Registers the instantiation decorator, restricted to the alias
    pub fn decorate<R: Resolvable>(
        &self,
        target: &R,
        decorator: InstantiationDecorator,
    ) -> Result<(), InjectError> {
        let index = self.0.decorations.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-decorator-{index}", target.alias().id());
        self.register(&instantiation_decorator(id, decorator.targeting(target)))
    }

    /// Wraps the function provided by the alias, e.g. an `Arc<dyn Fn(..)>`, once per instantiation
    pub fn decorate_function<R: Resolvable>(
        &self,
        target: &R,
        wrap: impl Fn(R::Instance) -> R::Instance + Send + Sync + 'static,
    ) -> Result<(), InjectError> {
        self.decorate(target, InstantiationDecorator::map_instance(wrap))
    }
}

// Registration
impl Container {
    pub(crate) fn register_from(
        &self,
        context: &Context,
        injectables: Vec<Arc<InjectableDef>>,
    ) -> Result<(), InjectError> {
        if injectables.is_empty() {
            return Ok(());
        }

        let batch = injectables
            .into_iter()
            .map(|def| {
                let id = registry::namespaced_id(context, &def.id);
                (def, id)
            })
            .collect::<Vec<_>>();

        {
            let mut state = self.state();
            state.registry.validate(&batch, context)?;
            for (def, id) in &batch {
                tracing::debug!("Registering \"{id}\" in container \"{}\"", self.id());
                state.registry.insert(def.clone(), id.clone(), context.clone());
            }
        }

        let callbacks = DiHandle::new(self.clone(), context.clone())
            .inject_many(&registration_callback_token())?;
        for (def, _) in &batch {
            for callback in &callbacks {
                callback.call(def);
            }
        }
        Ok(())
    }

    pub(crate) fn deregister_from(
        &self,
        context: &Context,
        injectables: Vec<Arc<InjectableDef>>,
    ) -> Result<(), InjectError> {
        {
            let state = self.state();
            if let Some(missing) = injectables
                .iter()
                .find(|def| !state.registry.contains(def.serial))
            {
                return Err(InjectError::NotRegistered {
                    chain: context.chain().with(missing.id.clone()),
                });
            }
        }

        let callbacks = DiHandle::new(self.clone(), context.clone())
            .inject_many(&deregistration_callback_token())?;
        for def in &injectables {
            self.deregister_single(def, &callbacks);
        }
        Ok(())
    }

    /// Deregisters the injectable and everything registered from within its instantiation
    fn deregister_single(&self, def: &Arc<InjectableDef>, callbacks: &[DeregistrationCallback]) {
        let nested = self.state().registry.registered_within(def.serial);
        for child in &nested {
            self.deregister_single(child, callbacks);
        }

        // Already gone through an earlier cascade
        if !self.state().registry.contains(def.serial) {
            return;
        }

        for callback in callbacks {
            callback.call(def);
        }

        let mut state = self.state();
        if let Some(registration) = state.registry.remove(def.serial) {
            tracing::debug!(
                "Deregistered \"{}\" from container \"{}\"",
                registration.namespaced_id,
                self.id()
            );
        }
        state.overrides.forget(def.serial);
        state.graph.remove(Node::Injectable(def.serial));
    }

    fn push_override(
        &self,
        alias: &Alias,
        instantiate: InstantiateFn,
        early: bool,
    ) -> Result<(), InjectError> {
        let mut state = self.state();
        let def = self.single_match(&state, alias, || InjectError::OverrideNotRegistered {
            id: alias.id().to_string(),
        })?;
        let id = state.registry.display_id(&Alias::Injectable(def.clone()));

        if !early && state.overrides.was_injected(def.serial) {
            tracing::warn!(
                "Overriding \"{id}\" which was already injected, existing instances are kept"
            );
        }
        tracing::debug!("Overriding \"{id}\"");
        state.overrides.push(def.serial, instantiate);
        Ok(())
    }

    /// The only registered injectable the alias resolves to
    fn single_match(
        &self,
        state: &State,
        alias: &Alias,
        not_registered: impl FnOnce() -> InjectError,
    ) -> Result<Arc<InjectableDef>, InjectError> {
        let related = state.registry.related(alias);
        match related.as_slice() {
            [def] => Ok(def.clone()),
            [] => Err(not_registered()),
            _ => Err(InjectError::TooManyMatches {
                token: alias.id().to_string(),
                matches: related
                    .iter()
                    .map(|def| state.registry.display_id(&Alias::Injectable(def.clone())))
                    .collect(),
                chain: Chain(vec![self.id().to_string()]).with(alias.id()),
            }),
        }
    }
}

// Resolution pipeline
impl Container {
    pub(crate) fn inject_erased(
        &self,
        context: &Context,
        alias: &Alias,
        parameter: Parameter,
        mode: Mode,
    ) -> Result<Vec<WithMeta<Instance>>, InjectError> {
        let dependee = match context.head().injectable() {
            Some(def) => Node::Injectable(def.serial),
            None => Node::Container,
        };
        self.inject_alias(context, dependee, alias, parameter, mode)
    }

    /// Tracks the dependency, then injects through the injection decorators
    fn inject_alias(
        &self,
        context: &Context,
        dependee: Node,
        alias: &Alias,
        parameter: Parameter,
        mode: Mode,
    ) -> Result<Vec<WithMeta<Instance>>, InjectError> {
        self.track(dependee, alias)?;

        if !alias.is_decorable() {
            return self.inject_matches(context, alias, parameter, mode);
        }

        let di = DiHandle::new(self.clone(), context.clone());
        let decorators = self.injection_decorators(&di, alias)?;
        if decorators.is_empty() {
            return self.inject_matches(context, alias, parameter, mode);
        }

        tracing::trace!(
            "Decorating injection of \"{}\" with {} decorator(s)",
            alias.id(),
            decorators.len()
        );
        let container = self.clone();
        let inject: InjectFn = Arc::new(
            move |di: &DiHandle, alias: &Alias, parameter: Parameter| {
                container.inject_matches(di.context(), alias, parameter, mode)
            },
        );
        decorators::compose(inject, &decorators)(&di, alias, parameter)
    }

    /// Records the dependency and fails if it closes a cycle
    fn track(&self, dependee: Node, alias: &Alias) -> Result<(), InjectError> {
        let mut state = self.state();
        let node = alias.node();
        let id = state.registry.display_id(alias);

        state.graph.describe(node, id, alias.cannot_cause_cycles());
        state.graph.link(dependee, node);

        if self.0.config.detect_cycles {
            state.graph.check(node)?;
        }
        Ok(())
    }

    fn injection_decorators(
        &self,
        di: &DiHandle,
        alias: &Alias,
    ) -> Result<Vec<InjectionDecorator>, InjectError> {
        Ok(di
            .inject_many(&injection_decorator_token())?
            .into_iter()
            .filter(|decorator| decorator.applies_to(alias))
            .collect())
    }

    fn instantiation_decorators(
        &self,
        di: &DiHandle,
        def: &Arc<InjectableDef>,
    ) -> Result<Vec<InstantiationDecorator>, InjectError> {
        let alias = Alias::Injectable(def.clone());
        Ok(di
            .inject_many(&instantiation_decorator_token())?
            .into_iter()
            .filter(|decorator| decorator.applies_to(&alias))
            .collect())
    }

    /// Resolves the alias to its registered injectables and instantiates them
    fn inject_matches(
        &self,
        context: &Context,
        alias: &Alias,
        parameter: Parameter,
        mode: Mode,
    ) -> Result<Vec<WithMeta<Instance>>, InjectError> {
        match alias {
            Alias::Injectable(def) => {
                let registered = self.state().registry.contains(def.serial);
                if !registered {
                    if def.ad_hoc {
                        tracing::debug!("Registering ad hoc injectable \"{}\"", def.id);
                        self.register_from(&Context::root(self.id()), vec![def.clone()])?;
                    } else if mode == Mode::Many {
                        return Ok(Vec::new());
                    } else {
                        return Err(InjectError::NotRegistered {
                            chain: context.chain().with(def.id.clone()),
                        });
                    }
                }
                Ok(vec![self.instance_of(context, def, parameter)?])
            }
            Alias::Token(token) => {
                let (related, ids) = {
                    let state = self.state();
                    let related = state.registry.related(alias);
                    let ids = related
                        .iter()
                        .map(|def| state.registry.display_id(&Alias::Injectable(def.clone())))
                        .collect::<Vec<_>>();
                    (related, ids)
                };

                match mode {
                    Mode::One => match related.as_slice() {
                        [] => Err(InjectError::NotRegistered {
                            chain: context.chain().with(token.id.clone()),
                        }),
                        [def] => {
                            let matched = Alias::Injectable(def.clone());
                            self.track(Node::Token(token.serial), &matched)?;
                            Ok(vec![self.instance_of(context, def, parameter)?])
                        }
                        _ => Err(InjectError::TooManyMatches {
                            token: token.id.clone(),
                            matches: ids,
                            chain: context.chain().with(token.id.clone()),
                        }),
                    },
                    Mode::Many => {
                        let mut instances = Vec::new();
                        for def in related {
                            instances.extend(self.inject_alias(
                                context,
                                Node::Token(token.serial),
                                &Alias::Injectable(def),
                                parameter.clone(),
                                Mode::Many,
                            )?);
                        }
                        Ok(instances)
                    }
                }
            }
        }
    }

    /// Returns the cached instance for the lifecycle key or instantiates a new one
    fn instance_of(
        &self,
        context: &Context,
        def: &Arc<InjectableDef>,
        parameter: Parameter,
    ) -> Result<WithMeta<Instance>, InjectError> {
        let (id, instantiate, overridden) = {
            let mut state = self.state();
            let Some(id) = state
                .registry
                .get(def.serial)
                .map(|registration| registration.namespaced_id.clone())
            else {
                return Err(InjectError::NotRegistered {
                    chain: context.chain().with(def.id.clone()),
                });
            };

            state.overrides.mark_injected(def.serial);
            match state.overrides.active(def.serial) {
                Some(entry) => (id, entry.instantiate.clone(), true),
                None if state.overrides.blocks(def) => {
                    return Err(InjectError::SideEffectsPrevented {
                        chain: context.chain().with(id),
                    });
                }
                None => (id, def.instantiate.clone(), false),
            }
        };

        let context = context.extend(def, id.clone(), parameter.clone());
        let di = DiHandle::new(self.clone(), context.clone());

        let key = match def.lifecycle.instance_key(&di, &parameter)? {
            InstanceKey::Stored(key) if key.is_empty() => {
                return Err(InjectError::InvalidKey {
                    chain: context.chain(),
                    source: InvalidKeyError,
                });
            }
            key => key,
        };

        if let InstanceKey::Stored(key) = &key {
            let cached = self.state().cached(def.serial, overridden, key);
            if let Some(instance) = cached {
                tracing::trace!("Reusing instance of \"{id}\" for key {key:?}");
                return Ok(WithMeta {
                    instance,
                    meta: Meta { id },
                });
            }
        }

        let _in_flight = match &key {
            InstanceKey::Stored(key) => Some(self.enter(&context, def.serial, key)?),
            InstanceKey::Unstored => None,
        };

        let instantiate = if def.is_decorable() {
            let decorators = self.instantiation_decorators(&di, def)?;
            tracing::trace!(
                "Decorating instantiation of \"{id}\" with {} decorator(s)",
                decorators.len()
            );
            decorators::compose(instantiate, &decorators)
        } else {
            instantiate
        };

        tracing::debug!("Instantiating \"{id}\"");
        let instance = instantiate(&di, parameter)?;

        let instance = match &key {
            InstanceKey::Stored(key) => self
                .state()
                .store(def.serial, overridden, key, instance)
                .map_err(|source| InjectError::InvalidKey {
                    chain: context.chain(),
                    source,
                })?,
            InstanceKey::Unstored => instance,
        };

        Ok(WithMeta {
            instance,
            meta: Meta { id },
        })
    }

    /// Marks the instantiation as running on this thread until the guard drops
    fn enter(&self, context: &Context, serial: u64, key: &[KeyPart]) -> Result<InFlight, InjectError> {
        let entry = (thread::current().id(), serial, key.to_vec());
        if !self.state().in_flight.insert(entry.clone()) {
            return Err(InjectError::CycleDetected {
                cycle: context.chain_from(serial).unwrap_or_else(|| context.chain()),
            });
        }
        Ok(InFlight {
            container: self.0.clone(),
            entry,
        })
    }
}

struct InFlight {
    container: Arc<ContainerInner>,
    entry: InFlightKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.container.state).in_flight.remove(&self.entry);
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
