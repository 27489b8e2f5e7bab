use std::{
    any::{Any, TypeId},
    fmt,
    future::Future,
    hash::{Hash, Hasher},
    sync::Arc,
};

use futures::future::{BoxFuture, Shared};

use crate::errors::InjectError;

/// Errors returned by user factories
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Anything the container can hand out.
///
/// Resolutions return a clone of the cached value, so values which should be shared
/// (and compared by identity) are usually `Arc`s.
pub trait Injected: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> Injected for T {}

/// A value produced by an asynchronous factory.
///
/// The container never awaits it. The shared future is cached like any other value,
/// so every awaiter of the same cached instance observes the same result or rejection.
pub type AsyncInstance<T> = Shared<BoxFuture<'static, Result<T, Arc<DynError>>>>;

pub(crate) fn into_async_instance<T, E, Fut>(future: Fut) -> AsyncInstance<T>
where
    T: Injected,
    E: Into<DynError>,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    use futures::FutureExt;

    async move { future.await.map_err(|e| Arc::new(e.into())) }
        .boxed()
        .shared()
}

/// Type erased instance produced by an injectable
#[derive(Clone)]
pub struct Instance {
    pub info: TypeInfo,
    pub instance: Arc<dyn Any + Send + Sync + 'static>,
}

impl Instance {
    pub fn new<T: Injected>(instance: T) -> Self {
        Instance {
            info: TypeInfo::of::<T>(),
            instance: Arc::new(instance),
        }
    }

    /// Clones the wrapped value out as `T`
    pub fn downcast<T: Injected>(&self) -> Result<T, InjectError> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or(InjectError::DowncastFailed {
                required_type: std::any::type_name::<T>(),
                actual_type: self.info.type_name,
            })
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.instance.downcast_ref::<T>()
    }

    /// Transforms the wrapped value, keeping everything else about the instance
    pub fn map<T: Injected, U: Injected>(
        &self,
        transform: impl FnOnce(T) -> U,
    ) -> Result<Instance, InjectError> {
        self.downcast::<T>().map(transform).map(Instance::new)
    }

    /// True if both instances are the very same cached value
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.info.type_name).finish()
    }
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }
}

/// Instantiation parameter passed along a resolution.
///
/// An empty parameter means "no parameter", which is what every `()` parameter turns into.
#[derive(Clone, Default)]
pub struct Parameter(Option<Instance>);

impl Parameter {
    pub fn none() -> Self {
        Parameter(None)
    }

    pub fn of<P: Injected>(value: P) -> Self {
        if TypeId::of::<P>() == TypeId::of::<()>() {
            return Parameter(None);
        }
        Parameter(Some(Instance::new(value)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.0.as_ref()
    }

    pub fn get<P: Injected>(&self) -> Result<P, InjectError> {
        match &self.0 {
            Some(instance) => instance.downcast(),
            None => (&() as &dyn Any)
                .downcast_ref::<P>()
                .cloned()
                .ok_or(InjectError::DowncastFailed {
                    required_type: std::any::type_name::<P>(),
                    actual_type: std::any::type_name::<()>(),
                }),
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(instance) => f.debug_tuple("Parameter").field(&instance.info.type_name).finish(),
            None => f.write_str("Parameter(none)"),
        }
    }
}

/// One position of an instance key.
///
/// Plain values compare by value, [KeyPart::identity] compares by reference.
#[derive(Clone)]
pub enum KeyPart {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(Arc<str>),
    Ref(RefKey),
}

impl KeyPart {
    /// Key part matching only this exact allocation
    pub fn identity<T: ?Sized + Send + Sync + 'static>(value: &Arc<T>) -> KeyPart {
        KeyPart::Ref(RefKey {
            address: Arc::as_ptr(value).cast::<()>() as usize,
            type_name: std::any::type_name::<T>(),
            _keep_alive: Arc::new(value.clone()),
        })
    }
}

/// Reference identity key, holding on to the referenced value so its address stays unique
#[derive(Clone)]
pub struct RefKey {
    address: usize,
    type_name: &'static str,
    _keep_alive: Arc<dyn Any + Send + Sync>,
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyPart::Unit, KeyPart::Unit) => true,
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a == b,
            (KeyPart::Int(a), KeyPart::Int(b)) => a == b,
            (KeyPart::UInt(a), KeyPart::UInt(b)) => a == b,
            (KeyPart::Str(a), KeyPart::Str(b)) => a == b,
            (KeyPart::Ref(a), KeyPart::Ref(b)) => a.address == b.address,
            _ => false,
        }
    }
}
impl Eq for KeyPart {}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            KeyPart::Unit => {}
            KeyPart::Bool(v) => v.hash(state),
            KeyPart::Int(v) => v.hash(state),
            KeyPart::UInt(v) => v.hash(state),
            KeyPart::Str(v) => v.hash(state),
            KeyPart::Ref(v) => v.address.hash(state),
        }
    }
}

impl fmt::Debug for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Unit => f.write_str("()"),
            KeyPart::Bool(v) => write!(f, "{v}"),
            KeyPart::Int(v) => write!(f, "{v}"),
            KeyPart::UInt(v) => write!(f, "{v}"),
            KeyPart::Str(v) => write!(f, "{v:?}"),
            KeyPart::Ref(v) => write!(f, "&{}@{:#x}", v.type_name, v.address),
        }
    }
}

impl From<()> for KeyPart {
    fn from(_: ()) -> Self {
        KeyPart::Unit
    }
}
impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}
impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}
impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(value.into())
    }
}
impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        KeyPart::UInt(value)
    }
}
impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::UInt(value.into())
    }
}
impl From<usize> for KeyPart {
    fn from(value: usize) -> Self {
        KeyPart::UInt(value as u64)
    }
}
impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.into())
    }
}
impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value.into())
    }
}
impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.as_str().into())
    }
}

/// Registration metadata returned next to an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Namespaced id of the injectable that produced the instance
    pub id: String,
}

/// An instance together with its [Meta]
#[derive(Debug, Clone)]
pub struct WithMeta<T> {
    pub instance: T,
    pub meta: Meta,
}

impl WithMeta<Instance> {
    pub(crate) fn downcast<T: Injected>(self) -> Result<WithMeta<T>, InjectError> {
        Ok(WithMeta {
            instance: self.instance.downcast()?,
            meta: self.meta,
        })
    }
}
