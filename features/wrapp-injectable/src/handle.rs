use crate::{
    container::{Container, Mode, Registrable},
    context::Context,
    errors::InjectError,
    injectable::{Alias, Resolvable},
    types::{Instance, Parameter, WithMeta},
};

/// View of the container bound to a resolution context.
///
/// Factories, key functions and decorators receive one. Everything injected or registered
/// through it is attributed to the context it was created with.
#[derive(Clone)]
pub struct DiHandle {
    container: Container,
    context: Context,
}

impl DiHandle {
    pub(crate) fn new(container: Container, context: Context) -> Self {
        DiHandle { container, context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn inject<R: Resolvable<Parameter = ()>>(&self, alias: &R) -> Result<R::Instance, InjectError> {
        self.inject_with(alias, ())
    }

    pub fn inject_with<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<R::Instance, InjectError> {
        Ok(self.inject_with_meta(alias, parameter)?.instance)
    }

    pub fn inject_many<R: Resolvable<Parameter = ()>>(
        &self,
        alias: &R,
    ) -> Result<Vec<R::Instance>, InjectError> {
        self.inject_many_with(alias, ())
    }

    pub fn inject_many_with<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<Vec<R::Instance>, InjectError> {
        self.resolve(&alias.alias(), Parameter::of(parameter), Mode::Many)?
            .into_iter()
            .map(|with_meta| with_meta.instance.downcast())
            .collect()
    }

    pub fn inject_with_meta<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<WithMeta<R::Instance>, InjectError> {
        let alias = alias.alias();
        self.resolve(&alias, Parameter::of(parameter), Mode::One)?
            .into_iter()
            .next()
            .ok_or_else(|| InjectError::NotRegistered {
                chain: self.context.chain().with(alias.id()),
            })?
            .downcast()
    }

    pub fn inject_many_with_meta<R: Resolvable>(
        &self,
        alias: &R,
        parameter: R::Parameter,
    ) -> Result<Vec<WithMeta<R::Instance>>, InjectError> {
        self.resolve(&alias.alias(), Parameter::of(parameter), Mode::Many)?
            .into_iter()
            .map(WithMeta::downcast)
            .collect()
    }

    /// Function resolving the alias anew on every call
    pub fn inject_factory<R: Resolvable + 'static>(
        &self,
        alias: &R,
    ) -> impl Fn(R::Parameter) -> Result<R::Instance, InjectError> + Send + Sync + 'static {
        let handle = self.clone();
        let alias = alias.alias();
        move |parameter| {
            handle
                .resolve(&alias, Parameter::of(parameter), Mode::One)?
                .into_iter()
                .next()
                .ok_or_else(|| InjectError::NotRegistered {
                    chain: handle.context.chain().with(alias.id()),
                })?
                .instance
                .downcast()
        }
    }

    /// Registers the injectables, namespaced by this context
    pub fn register(&self, injectables: &impl Registrable) -> Result<(), InjectError> {
        self.container
            .register_from(&self.context, injectables.injectables())
    }

    pub fn register_all(&self, injectables: &[&dyn Registrable]) -> Result<(), InjectError> {
        self.container.register_from(
            &self.context,
            injectables.iter().flat_map(|item| item.injectables()).collect(),
        )
    }

    pub fn deregister(&self, injectables: &impl Registrable) -> Result<(), InjectError> {
        self.container
            .deregister_from(&self.context, injectables.injectables())
    }

    pub fn deregister_all(&self, injectables: &[&dyn Registrable]) -> Result<(), InjectError> {
        self.container.deregister_from(
            &self.context,
            injectables.iter().flat_map(|item| item.injectables()).collect(),
        )
    }

    pub fn has_registrations(&self, alias: &impl Resolvable) -> bool {
        self.container.has_registrations(alias)
    }

    pub(crate) fn resolve(
        &self,
        alias: &Alias,
        parameter: Parameter,
        mode: Mode,
    ) -> Result<Vec<WithMeta<Instance>>, InjectError> {
        self.container
            .inject_erased(&self.context, alias, parameter, mode)
    }
}
