use std::{
    convert::Infallible,
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    container::Container,
    context::ContextItem,
    decorators::{instantiation_decorator, Decorator, InstantiationDecorator},
    errors::InjectError,
    handle::DiHandle,
    injectable::{Injectable, InjectionToken, InstantiateFn},
    types::{Instance, Parameter},
};

/// A failed instantiation
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error: InjectError,
    /// Items from the first injectable below the container root to the failing one
    pub context: Vec<ContextItem>,
}

/// Receives every failed instantiation once per root resolution
#[derive(Clone)]
pub struct ErrorMonitor(Arc<dyn Fn(&ErrorReport) + Send + Sync>);

impl ErrorMonitor {
    pub fn new(monitor: impl Fn(&ErrorReport) + Send + Sync + 'static) -> Self {
        Self(Arc::new(monitor))
    }
}

impl fmt::Debug for ErrorMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorMonitor")
    }
}

pub fn error_monitor_token() -> InjectionToken<ErrorMonitor> {
    static TOKEN: OnceLock<InjectionToken<ErrorMonitor>> = OnceLock::new();
    TOKEN
        .get_or_init(|| InjectionToken::new("error-monitor-token"))
        .clone()
}

/// Injectable providing an error monitor
pub fn error_monitor(
    id: impl Into<String>,
    monitor: impl Fn(&ErrorReport) + Send + Sync + 'static,
) -> Injectable<ErrorMonitor> {
    let monitor = ErrorMonitor::new(monitor);
    Injectable::singleton(id, move |_| Ok::<_, Infallible>(monitor.clone()))
        .implements(&error_monitor_token())
}

/// Reports failed instantiations of the container to all registered [ErrorMonitor]s
pub fn register_error_monitoring(container: &Container) -> Result<(), InjectError> {
    container.register(&instantiation_decorator(
        "error-monitoring",
        monitoring_decorator(),
    ))
}

fn monitoring_decorator() -> InstantiationDecorator {
    Decorator::new(|instantiate: InstantiateFn| -> InstantiateFn {
        Arc::new(
            move |di: &DiHandle, parameter: Parameter| -> Result<Instance, InjectError> {
                let result = instantiate(di, parameter);
                if let Err(error) = &result {
                    report(di, error);
                }
                result
            },
        )
    })
}

fn report(di: &DiHandle, error: &InjectError) {
    let context = di.context();

    let is_monitor = context
        .head()
        .injectable()
        .is_some_and(|def| def.implements(error_monitor_token().def()));
    if is_monitor || !context.episode().first_report(error) {
        return;
    }

    let monitors = match di.inject_many(&error_monitor_token()) {
        Ok(monitors) => monitors,
        Err(lookup_error) => {
            tracing::warn!("Could not inject error monitors to report \"{error}\": {lookup_error}");
            return;
        }
    };

    let report = ErrorReport {
        error: error.clone(),
        context: context.items().into_iter().skip(1).collect(),
    };
    for monitor in monitors {
        (monitor.0)(&report);
    }
}
