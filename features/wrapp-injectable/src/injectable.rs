use std::{
    collections::HashMap,
    convert::Infallible,
    fmt,
    future::Future,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

use crate::{
    dependency_graph::Node,
    errors::InjectError,
    handle::DiHandle,
    types::{into_async_instance, AsyncInstance, DynError, Injected, Instance, KeyPart, Parameter, TypeInfo},
};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Identity of injectables and tokens, unique per process
fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Type erased factory of an injectable
pub type InstantiateFn =
    Arc<dyn Fn(&DiHandle, Parameter) -> Result<Instance, InjectError> + Send + Sync>;

/// Type erased key function of a keyed singleton
pub type InstanceKeyFn =
    Arc<dyn Fn(&DiHandle, &Parameter) -> Result<Vec<KeyPart>, InjectError> + Send + Sync>;

/// Caching policy of an injectable
#[derive(Clone)]
pub enum Lifecycle {
    /// One instance for the lifetime of the container
    Singleton,
    /// A new instance for every resolution, nothing is cached
    Transient,
    /// One instance per distinct key
    KeyedSingleton(InstanceKeyFn),
}

pub(crate) enum InstanceKey {
    Stored(Vec<KeyPart>),
    Unstored,
}

impl Lifecycle {
    pub fn keyed<P: Injected>(
        key: impl Fn(&DiHandle, &P) -> Result<Vec<KeyPart>, InjectError> + Send + Sync + 'static,
    ) -> Self {
        Lifecycle::KeyedSingleton(Arc::new(move |di: &DiHandle, parameter: &Parameter| {
            key(di, &parameter.get::<P>()?)
        }))
    }

    pub(crate) fn instance_key(
        &self,
        di: &DiHandle,
        parameter: &Parameter,
    ) -> Result<InstanceKey, InjectError> {
        match self {
            Lifecycle::Singleton => Ok(InstanceKey::Stored(vec![KeyPart::Unit])),
            Lifecycle::Transient => Ok(InstanceKey::Unstored),
            Lifecycle::KeyedSingleton(key) => key(di, parameter).map(InstanceKey::Stored),
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Singleton => f.write_str("Singleton"),
            Lifecycle::Transient => f.write_str("Transient"),
            Lifecycle::KeyedSingleton(_) => f.write_str("KeyedSingleton"),
        }
    }
}

/// Type erased description of how to build a value
#[derive(Clone)]
pub struct InjectableDef {
    pub(crate) serial: u64,
    pub(crate) id: String,
    pub(crate) provides: TypeInfo,
    pub(crate) instantiate: InstantiateFn,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) tokens: Vec<Arc<TokenDef>>,
    pub(crate) causes_side_effects: bool,
    pub(crate) decorable: bool,
    pub(crate) ad_hoc: bool,
    pub(crate) cannot_cause_cycles: bool,
}

impl InjectableDef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provides(&self) -> TypeInfo {
        self.provides
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn causes_side_effects(&self) -> bool {
        self.causes_side_effects
    }

    pub fn cannot_cause_cycles(&self) -> bool {
        self.cannot_cause_cycles
    }

    /// Decorators apply unless disabled here or by one of the implemented tokens
    pub fn is_decorable(&self) -> bool {
        self.decorable && self.tokens.iter().all(|token| token.decorable)
    }

    /// Whether the injectable implements the token, directly or through a more specific token
    pub fn implements(&self, token: &TokenDef) -> bool {
        self.tokens
            .iter()
            .any(|implemented| implemented.descends_from(token.serial))
    }

    /// Every token this injectable can be found by, most specific first
    pub(crate) fn token_lineage(&self) -> Vec<Arc<TokenDef>> {
        let mut lineage: Vec<Arc<TokenDef>> = Vec::new();
        for token in &self.tokens {
            for ancestor in token.lineage() {
                if !lineage.iter().any(|known| known.serial == ancestor.serial) {
                    lineage.push(ancestor);
                }
            }
        }
        lineage
    }
}

impl fmt::Debug for InjectableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectableDef")
            .field("id", &self.id)
            .field("provides", &self.provides.type_name)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Typed handle to a registrable injectable.
///
/// `T` is the provided value, `P` the instantiation parameter (`()` for none).
pub struct Injectable<T, P = ()> {
    def: Arc<InjectableDef>,
    _marker: PhantomData<fn(P) -> T>,
}

impl<T, P> Clone for Injectable<T, P> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, P> fmt::Debug for Injectable<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Injectable").field(&self.def.id).finish()
    }
}

impl<T: Injected> Injectable<T, ()> {
    pub fn singleton<F, E>(id: impl Into<String>, instantiate: F) -> Self
    where
        F: Fn(&DiHandle) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        Self::with_lifecycle(id, Lifecycle::Singleton, move |di, ()| instantiate(di))
    }

    pub fn transient<F, E>(id: impl Into<String>, instantiate: F) -> Self
    where
        F: Fn(&DiHandle) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        Self::with_lifecycle(id, Lifecycle::Transient, move |di, ()| instantiate(di))
    }
}

impl<T: Injected> Injectable<AsyncInstance<T>, ()> {
    /// Singleton whose value is produced asynchronously.
    ///
    /// The pending value is cached immediately, so concurrent awaiters share one instantiation.
    pub fn singleton_async<F, Fut, E>(id: impl Into<String>, instantiate: F) -> Self
    where
        F: Fn(&DiHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<DynError>,
    {
        Self::singleton(id, move |di| {
            Ok::<_, Infallible>(into_async_instance(instantiate(di)))
        })
    }
}

impl<T: Injected, P: Injected> Injectable<T, P> {
    pub fn with_lifecycle<F, E>(id: impl Into<String>, lifecycle: Lifecycle, instantiate: F) -> Self
    where
        F: Fn(&DiHandle, P) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        Self::from_def(InjectableDef {
            serial: next_serial(),
            id: id.into(),
            provides: TypeInfo::of::<T>(),
            instantiate: typed_instantiate(instantiate),
            lifecycle,
            tokens: Vec::new(),
            causes_side_effects: false,
            decorable: true,
            ad_hoc: false,
            cannot_cause_cycles: false,
        })
    }

    /// Transient receiving an instantiation parameter
    pub fn transient_with<F, E>(id: impl Into<String>, instantiate: F) -> Self
    where
        F: Fn(&DiHandle, P) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        Self::with_lifecycle(id, Lifecycle::Transient, instantiate)
    }

    /// Singleton per key computed from the instantiation parameter
    pub fn keyed_singleton<K, F, E>(id: impl Into<String>, key: K, instantiate: F) -> Self
    where
        K: Fn(&DiHandle, &P) -> Result<Vec<KeyPart>, InjectError> + Send + Sync + 'static,
        F: Fn(&DiHandle, P) -> Result<T, E> + Send + Sync + 'static,
        E: Into<DynError>,
    {
        Self::with_lifecycle(id, Lifecycle::keyed::<P>(key), instantiate)
    }

    pub(crate) fn from_def(def: InjectableDef) -> Self {
        Injectable {
            def: Arc::new(def),
            _marker: PhantomData,
        }
    }

    /// Makes the injectable resolvable through the token
    pub fn implements(self, token: &InjectionToken<T, P>) -> Self {
        let token = token.def.clone();
        self.update(|def| def.tokens.push(token))
    }

    /// Resolving this injectable fails while side effects are prevented
    pub fn causes_side_effects(self) -> Self {
        self.update(|def| def.causes_side_effects = true)
    }

    /// Decorators are never applied to this injectable
    pub fn not_decorable(self) -> Self {
        self.update(|def| def.decorable = false)
    }

    /// The injectable registers itself on first resolution
    pub fn ad_hoc(self) -> Self {
        self.update(|def| def.ad_hoc = true)
    }

    /// Never reported as the root of a dependency cycle
    pub fn cannot_cause_cycles(self) -> Self {
        self.update(|def| def.cannot_cause_cycles = true)
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn def(&self) -> &Arc<InjectableDef> {
        &self.def
    }

    /// Changes the descriptor. A descriptor shared with clones is forked into a new injectable.
    fn update(mut self, change: impl FnOnce(&mut InjectableDef)) -> Self {
        if Arc::get_mut(&mut self.def).is_none() {
            let mut fork = InjectableDef::clone(&self.def);
            fork.serial = next_serial();
            self.def = Arc::new(fork);
        }
        change(Arc::make_mut(&mut self.def));
        self
    }
}

pub(crate) fn typed_instantiate<T, P, F, E>(instantiate: F) -> InstantiateFn
where
    T: Injected,
    P: Injected,
    F: Fn(&DiHandle, P) -> Result<T, E> + Send + Sync + 'static,
    E: Into<DynError>,
{
    Arc::new(move |di: &DiHandle, parameter: Parameter| {
        let parameter = parameter.get::<P>()?;
        instantiate(di, parameter)
            .map(Instance::new)
            .map_err(|error| InjectError::from_factory(error.into(), || di.context().chain()))
    })
}

/// Type erased injection token
pub struct TokenDef {
    pub(crate) serial: u64,
    pub(crate) id: String,
    pub(crate) parent: Option<Arc<TokenDef>>,
    pub(crate) speciality: Option<String>,
    pub(crate) decorable: bool,
    specifics: Mutex<HashMap<String, Weak<TokenDef>>>,
}

impl TokenDef {
    fn new(id: String, parent: Option<Arc<TokenDef>>, speciality: Option<String>, decorable: bool) -> Self {
        TokenDef {
            serial: next_serial(),
            id,
            parent,
            speciality,
            decorable,
            specifics: Mutex::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn speciality(&self) -> Option<&str> {
        self.speciality.as_deref()
    }

    /// The general token this one refines
    pub fn parent(&self) -> Option<&Arc<TokenDef>> {
        self.parent.as_ref()
    }

    /// True for the token itself and every token refining it
    pub(crate) fn descends_from(&self, serial: u64) -> bool {
        self.serial == serial
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.descends_from(serial))
    }

    /// The token followed by all its general tokens
    fn lineage(self: &Arc<Self>) -> Vec<Arc<TokenDef>> {
        let mut lineage = vec![self.clone()];
        let mut current = self.parent.clone();
        while let Some(token) = current {
            current = token.parent.clone();
            lineage.push(token);
        }
        lineage
    }
}

impl fmt::Debug for TokenDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenDef")
            .field("id", &self.id)
            .field("speciality", &self.speciality)
            .finish_non_exhaustive()
    }
}

/// Abstract contract grouping interchangeable injectables
pub struct InjectionToken<T, P = ()> {
    def: Arc<TokenDef>,
    _marker: PhantomData<fn(P) -> T>,
}

impl<T, P> Clone for InjectionToken<T, P> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, P> fmt::Debug for InjectionToken<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InjectionToken").field(&self.def.id).finish()
    }
}

impl<T: Injected, P: Injected> InjectionToken<T, P> {
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_def(TokenDef::new(id.into(), None, None, true))
    }

    /// Token whose implementations are never decorated
    pub(crate) fn not_decorable(id: impl Into<String>) -> Self {
        Self::from_def(TokenDef::new(id.into(), None, None, false))
    }

    /// Narrower token refining this one.
    ///
    /// Implementations of the specific token are also found through this token.
    /// Asking twice for the same speciality yields the same token.
    pub fn specific(&self, speciality: impl Into<String>) -> Self {
        let speciality = speciality.into();
        let mut specifics = self
            .def
            .specifics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = specifics.get(&speciality).and_then(Weak::upgrade) {
            return InjectionToken {
                def: existing,
                _marker: PhantomData,
            };
        }

        let def = Arc::new(TokenDef::new(
            format!("{}:{}", self.def.id, speciality),
            Some(self.def.clone()),
            Some(speciality.clone()),
            self.def.decorable,
        ));
        specifics.insert(speciality, Arc::downgrade(&def));
        InjectionToken {
            def,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn def(&self) -> &Arc<TokenDef> {
        &self.def
    }

    fn from_def(def: TokenDef) -> Self {
        InjectionToken {
            def: Arc::new(def),
            _marker: PhantomData,
        }
    }
}

/// Anything resolvable: an injectable or an injection token
#[derive(Clone)]
pub enum Alias {
    Injectable(Arc<InjectableDef>),
    Token(Arc<TokenDef>),
}

impl Alias {
    pub fn id(&self) -> &str {
        match self {
            Alias::Injectable(def) => &def.id,
            Alias::Token(def) => &def.id,
        }
    }

    pub(crate) fn node(&self) -> Node {
        match self {
            Alias::Injectable(def) => Node::Injectable(def.serial),
            Alias::Token(def) => Node::Token(def.serial),
        }
    }

    pub(crate) fn is_decorable(&self) -> bool {
        match self {
            Alias::Injectable(def) => def.is_decorable(),
            Alias::Token(def) => def.decorable,
        }
    }

    pub(crate) fn cannot_cause_cycles(&self) -> bool {
        match self {
            Alias::Injectable(def) => def.cannot_cause_cycles,
            Alias::Token(_) => false,
        }
    }

    /// Whether something aimed at `target` applies to this alias.
    ///
    /// Injectables match themselves and every token they implement,
    /// tokens match themselves and their general tokens.
    pub fn is_covered_by(&self, target: &Alias) -> bool {
        match (self, target) {
            (Alias::Injectable(def), Alias::Injectable(target)) => def.serial == target.serial,
            (Alias::Injectable(def), Alias::Token(target)) => def.implements(target),
            (Alias::Token(token), Alias::Token(target)) => token.descends_from(target.serial),
            (Alias::Token(_), Alias::Injectable(_)) => false,
        }
    }
}

impl fmt::Debug for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::Injectable(def) => f.debug_tuple("Injectable").field(&def.id).finish(),
            Alias::Token(def) => f.debug_tuple("Token").field(&def.id).finish(),
        }
    }
}

/// Typed alias
pub trait Resolvable {
    type Instance: Injected;
    type Parameter: Injected;

    fn alias(&self) -> Alias;
}

impl<T: Injected, P: Injected> Resolvable for Injectable<T, P> {
    type Instance = T;
    type Parameter = P;

    fn alias(&self) -> Alias {
        Alias::Injectable(self.def.clone())
    }
}

impl<T: Injected, P: Injected> Resolvable for InjectionToken<T, P> {
    type Instance = T;
    type Parameter = P;

    fn alias(&self) -> Alias {
        Alias::Token(self.def.clone())
    }
}
