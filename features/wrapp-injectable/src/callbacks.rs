use std::{
    convert::Infallible,
    fmt,
    sync::{Arc, OnceLock},
};

use crate::injectable::{Injectable, InjectableDef, InjectionToken};

/// Called for every injectable after its registration batch was committed
#[derive(Clone)]
pub struct RegistrationCallback(Arc<dyn Fn(&InjectableDef) + Send + Sync>);

/// Called for every injectable right before it is deregistered
#[derive(Clone)]
pub struct DeregistrationCallback(Arc<dyn Fn(&InjectableDef) + Send + Sync>);

impl RegistrationCallback {
    pub fn new(callback: impl Fn(&InjectableDef) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub(crate) fn call(&self, injectable: &InjectableDef) {
        (self.0)(injectable)
    }
}

impl DeregistrationCallback {
    pub fn new(callback: impl Fn(&InjectableDef) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }

    pub(crate) fn call(&self, injectable: &InjectableDef) {
        (self.0)(injectable)
    }
}

impl fmt::Debug for RegistrationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RegistrationCallback")
    }
}

impl fmt::Debug for DeregistrationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeregistrationCallback")
    }
}

pub fn registration_callback_token() -> InjectionToken<RegistrationCallback> {
    static TOKEN: OnceLock<InjectionToken<RegistrationCallback>> = OnceLock::new();
    TOKEN
        .get_or_init(|| InjectionToken::new("registration-callback-token"))
        .clone()
}

pub fn deregistration_callback_token() -> InjectionToken<DeregistrationCallback> {
    static TOKEN: OnceLock<InjectionToken<DeregistrationCallback>> = OnceLock::new();
    TOKEN
        .get_or_init(|| InjectionToken::new("deregistration-callback-token"))
        .clone()
}

/// Injectable providing a registration callback
pub fn registration_callback(
    id: impl Into<String>,
    callback: impl Fn(&InjectableDef) + Send + Sync + 'static,
) -> Injectable<RegistrationCallback> {
    let callback = RegistrationCallback::new(callback);
    Injectable::singleton(id, move |_| Ok::<_, Infallible>(callback.clone()))
        .implements(&registration_callback_token())
}

/// Injectable providing a deregistration callback
pub fn deregistration_callback(
    id: impl Into<String>,
    callback: impl Fn(&InjectableDef) + Send + Sync + 'static,
) -> Injectable<DeregistrationCallback> {
    let callback = DeregistrationCallback::new(callback);
    Injectable::singleton(id, move |_| Ok::<_, Infallible>(callback.clone()))
        .implements(&deregistration_callback_token())
}
