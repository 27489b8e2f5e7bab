use std::sync::Arc;

use crate::{
    container::{Container, Registrable},
    errors::InjectError,
    injectable::InjectableDef,
    monitoring::register_error_monitoring,
};

/// Settings fixed for the lifetime of a [Container]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Id of the container, the root of every resolution chain
    pub id: String,
    /// Search the dependency graph for cycles on every injection.
    ///
    /// Re-entering an instantiation still in progress fails regardless.
    pub detect_cycles: bool,
}

impl ContainerConfig {
    pub fn new(id: impl Into<String>) -> Self {
        ContainerConfig {
            id: id.into(),
            detect_cycles: true,
        }
    }
}

/// Configures a [Container] and its initial registrations
pub struct ContainerBuilder {
    config: ContainerConfig,
    /// Registered in one batch on build
    registered: Vec<Arc<InjectableDef>>,
    error_monitoring: bool,
}

impl ContainerBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        ContainerBuilder {
            config: ContainerConfig::new(id),
            registered: Vec::new(),
            error_monitoring: false,
        }
    }

    pub fn detect_cycles(mut self, detect_cycles: bool) -> Self {
        self.config.detect_cycles = detect_cycles;
        self
    }

    pub fn register(mut self, injectables: &impl Registrable) -> Self {
        self.registered.extend(injectables.injectables());
        self
    }

    /// Reports failed instantiations to the registered error monitors
    pub fn with_error_monitoring(mut self) -> Self {
        self.error_monitoring = true;
        self
    }

    pub fn build(self) -> Result<Container, InjectError> {
        let ContainerBuilder {
            config,
            registered,
            error_monitoring,
        } = self;

        tracing::debug!(
            "Building container \"{}\" with {} injectables",
            config.id,
            registered.len()
        );

        let container = Container::with_config(config);
        if error_monitoring {
            register_error_monitoring(&container)?;
        }
        container.register(&registered)?;
        Ok(container)
    }
}
