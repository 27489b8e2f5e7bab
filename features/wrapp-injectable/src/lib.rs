//! Runtime dependency injection container.
//!
//! Injectables describe how to build a value, injection tokens group interchangeable
//! injectables. The [Container] builds values lazily when they are injected, caches them
//! according to their [Lifecycle], applies decorators and overrides, and rejects cyclic
//! dependencies with the full resolution chain in the error.
//!
//! ```
//! use std::{convert::Infallible, sync::Arc};
//! use wrapp_injectable::{Container, Injectable, InjectError};
//!
//! let greeting = Injectable::singleton("greeting", |_| Ok::<_, Infallible>(Arc::new("hello")));
//! let message = Injectable::transient("message", {
//!     let greeting = greeting.clone();
//!     move |di| Ok::<_, InjectError>(format!("{} world", di.inject(&greeting)?))
//! });
//!
//! let container = Container::new("app");
//! container.register_all(&[&greeting, &message])?;
//! assert_eq!(container.inject(&message)?, "hello world");
//! # Ok::<(), InjectError>(())
//! ```

pub mod builder;
pub mod callbacks;
pub mod composite_map;
pub mod container;
pub mod context;
pub mod decorators;
mod dependency_graph;
pub mod errors;
pub mod handle;
pub mod injectable;
pub mod monitoring;
mod overrides;
mod registry;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::{ContainerBuilder, ContainerConfig};
pub use callbacks::{
    deregistration_callback, deregistration_callback_token, registration_callback,
    registration_callback_token, DeregistrationCallback, RegistrationCallback,
};
pub use composite_map::CompositeMap;
pub use container::{Bunch, Container, Registrable};
pub use context::{Context, ContextItem};
pub use decorators::{
    injection_decorator, injection_decorator_token, instantiation_decorator,
    instantiation_decorator_token, Decorator, InjectFn, InjectionDecorator,
    InstantiationDecorator,
};
pub use errors::{Chain, InjectError, InvalidKeyError};
pub use handle::DiHandle;
pub use injectable::{
    Alias, Injectable, InjectableDef, InjectionToken, InstanceKeyFn, InstantiateFn, Lifecycle,
    Resolvable, TokenDef,
};
pub use monitoring::{
    error_monitor, error_monitor_token, register_error_monitoring, ErrorMonitor, ErrorReport,
};
pub use types::{AsyncInstance, DynError, Injected, Instance, KeyPart, Meta, Parameter, TypeInfo, WithMeta};
