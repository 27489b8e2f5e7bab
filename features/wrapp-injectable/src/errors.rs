use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::types::DynError;

/// Errors raised while registering, resolving or overriding injectables
#[derive(Error, Debug, Clone)]
pub enum InjectError {
    /// Nothing is registered for the alias
    #[error("Tried to inject non-registered injectable {chain}.")]
    NotRegistered { chain: Chain },

    /// A single instance was requested from a token with several implementations
    #[error(
        "Tried to inject single injectable for injection token \"{token}\" but found multiple injectables: {} (injecting {chain})",
        Chain::quoted_list(.matches)
    )]
    TooManyMatches {
        token: String,
        matches: Vec<String>,
        chain: Chain,
    },

    /// The injectable itself, or another one with the same namespaced id, is already registered
    #[error("{} (registering {chain})", duplicate_message(.id, .same_injectable))]
    DuplicateRegistration {
        id: String,
        same_injectable: bool,
        chain: Chain,
    },

    /// An override targets an alias nothing is registered for
    #[error("Tried to override \"{id}\" which is not registered.")]
    OverrideNotRegistered { id: String },

    /// Resolving would close a loop in the dependency graph
    #[error("Cycle of injectables encountered: {cycle}")]
    CycleDetected { cycle: Chain },

    /// A side effecting injectable was resolved while side effects are prevented
    #[error("Tried to inject {chain} when side-effects are prevented.")]
    SideEffectsPrevented { chain: Chain },

    /// A keyed singleton computed an empty instance key
    #[error("{source} (injecting {chain})")]
    InvalidKey {
        chain: Chain,
        source: InvalidKeyError,
    },

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },

    /// A factory failed
    #[error("Instantiation of {chain} failed - error: {error}")]
    InstantiationFailed { chain: Chain, error: Arc<DynError> },
}

fn duplicate_message(id: &str, same_injectable: &bool) -> String {
    if *same_injectable {
        format!("Tried to register same injectable multiple times: \"{id}\"")
    } else {
        format!("Tried to register multiple injectables for ID \"{id}\"")
    }
}

impl InjectError {
    /// Wraps a factory error, unless it is an [InjectError] which travelled through the factory
    pub(crate) fn from_factory(error: DynError, chain: impl FnOnce() -> Chain) -> Self {
        match error.downcast::<InjectError>() {
            Ok(inject_error) => *inject_error,
            Err(error) => InjectError::InstantiationFailed {
                chain: chain(),
                error: Arc::new(error),
            },
        }
    }

    /// Whether both values describe the same failure.
    ///
    /// Factory failures are only the same if they wrap the very same error.
    pub fn is_same(&self, other: &InjectError) -> bool {
        match (self, other) {
            (
                InjectError::InstantiationFailed { error: a, .. },
                InjectError::InstantiationFailed { error: b, .. },
            ) => Arc::ptr_eq(a, b),
            (InjectError::InstantiationFailed { .. }, _)
            | (_, InjectError::InstantiationFailed { .. }) => false,
            (a, b) => {
                std::mem::discriminant(a) == std::mem::discriminant(b)
                    && a.to_string() == b.to_string()
            }
        }
    }
}

/// Errors of [crate::composite_map::CompositeMap] keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Keys must be at least length 1")]
pub struct InvalidKeyError;

/// Ordered ids of a resolution path, rendered as `"a" -> "b" -> "c"`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain(pub Vec<String>);

impl Chain {
    pub fn ids(&self) -> &[String] {
        &self.0
    }

    pub(crate) fn with(mut self, id: impl Into<String>) -> Self {
        self.0.push(id.into());
        self
    }

    fn quoted_list(ids: &[String]) -> String {
        ids.iter()
            .map(|id| format!("\"{id}\""))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted = self
            .0
            .iter()
            .map(|id| format!("\"{id}\""))
            .collect::<Vec<_>>();
        f.write_str(&quoted.join(" -> "))
    }
}

impl From<Vec<String>> for Chain {
    fn from(ids: Vec<String>) -> Self {
        Chain(ids)
    }
}
