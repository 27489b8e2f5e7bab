//! Decorators wrap either the factory of an injectable (instantiation decorators) or the
//! whole injection of an alias (injection decorators).
//!
//! Decorators are injectables implementing one of the two well-known tokens. They are looked up
//! on every instantiation or injection and applied in registration order, the first registered
//! decorator wrapping the undecorated function.

use std::{
    convert::Infallible,
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    errors::InjectError,
    handle::DiHandle,
    injectable::{Alias, Injectable, InjectionToken, InstantiateFn, Resolvable},
    types::{Injected, Instance, Parameter, WithMeta},
};

/// Type erased injection of an alias
pub type InjectFn = Arc<
    dyn Fn(&DiHandle, &Alias, Parameter) -> Result<Vec<WithMeta<Instance>>, InjectError>
        + Send
        + Sync,
>;

/// Wrapper around a function of type `F`, optionally restricted to one alias
pub struct Decorator<F> {
    decorate: Arc<dyn Fn(F) -> F + Send + Sync>,
    target: Option<Alias>,
}

/// Decorates the factory of injectables
pub type InstantiationDecorator = Decorator<InstantiateFn>;

/// Decorates the injection of aliases
pub type InjectionDecorator = Decorator<InjectFn>;

impl<F> Clone for Decorator<F> {
    fn clone(&self) -> Self {
        Decorator {
            decorate: self.decorate.clone(),
            target: self.target.clone(),
        }
    }
}

impl<F> fmt::Debug for Decorator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<F> Decorator<F> {
    /// Decorator applying to everything decorable
    pub fn new(decorate: impl Fn(F) -> F + Send + Sync + 'static) -> Self {
        Decorator {
            decorate: Arc::new(decorate),
            target: None,
        }
    }

    /// Restricts the decorator to the alias.
    ///
    /// Targeting a token covers every injectable implementing it.
    pub fn targeting(mut self, target: &impl Resolvable) -> Self {
        self.target = Some(target.alias());
        self
    }

    pub fn target(&self) -> Option<&Alias> {
        self.target.as_ref()
    }

    pub(crate) fn applies_to(&self, alias: &Alias) -> bool {
        match &self.target {
            Some(target) => alias.is_covered_by(target),
            None => true,
        }
    }
}

impl InstantiationDecorator {
    /// Decorator transforming every instance of `T` right after instantiation
    pub fn map_instance<T: Injected>(transform: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        let transform = Arc::new(transform);
        Decorator::new(move |instantiate: InstantiateFn| -> InstantiateFn {
            let transform = transform.clone();
            Arc::new(
                move |di: &DiHandle, parameter: Parameter| -> Result<Instance, InjectError> {
                    instantiate(di, parameter)?.map(|instance: T| transform(instance))
                },
            )
        })
    }
}

impl InjectionDecorator {
    /// Decorator transforming every injected instance of `T`
    pub fn map_instance<T: Injected>(transform: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        let transform = Arc::new(transform);
        Decorator::new(move |inject: InjectFn| -> InjectFn {
            let transform = transform.clone();
            Arc::new(
                move |di: &DiHandle,
                      alias: &Alias,
                      parameter: Parameter|
                      -> Result<Vec<WithMeta<Instance>>, InjectError> {
                    inject(di, alias, parameter)?
                        .into_iter()
                        .map(|with_meta| {
                            Ok(WithMeta {
                                instance: with_meta.instance.map(|instance: T| transform(instance))?,
                                meta: with_meta.meta,
                            })
                        })
                        .collect()
                },
            )
        })
    }
}

/// Composes the decorators around `base`, the first one innermost
pub(crate) fn compose<F>(base: F, decorators: &[Decorator<F>]) -> F {
    decorators
        .iter()
        .fold(base, |decorated, decorator| (decorator.decorate)(decorated))
}

/// Token implemented by instantiation decorators
pub fn instantiation_decorator_token() -> InjectionToken<InstantiationDecorator> {
    static TOKEN: OnceLock<InjectionToken<InstantiationDecorator>> = OnceLock::new();
    TOKEN
        .get_or_init(|| InjectionToken::not_decorable("instantiate-decorator-token"))
        .clone()
}

/// Token implemented by injection decorators
pub fn injection_decorator_token() -> InjectionToken<InjectionDecorator> {
    static TOKEN: OnceLock<InjectionToken<InjectionDecorator>> = OnceLock::new();
    TOKEN
        .get_or_init(|| InjectionToken::not_decorable("injection-decorator-token"))
        .clone()
}

/// Injectable providing an instantiation decorator
pub fn instantiation_decorator(
    id: impl Into<String>,
    decorator: InstantiationDecorator,
) -> Injectable<InstantiationDecorator> {
    Injectable::singleton(id, move |_| Ok::<_, Infallible>(decorator.clone()))
        .implements(&instantiation_decorator_token())
}

/// Injectable providing an injection decorator
pub fn injection_decorator(
    id: impl Into<String>,
    decorator: InjectionDecorator,
) -> Injectable<InjectionDecorator> {
    Injectable::singleton(id, move |_| Ok::<_, Infallible>(decorator.clone()))
        .implements(&injection_decorator_token())
}
