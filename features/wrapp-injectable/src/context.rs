use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    errors::{Chain, InjectError},
    injectable::InjectableDef,
    types::Parameter,
};

/// The chain of in-flight resolutions, from the container root to the current injectable.
///
/// Extending a context never touches the parent, so handles captured by earlier factories
/// keep seeing the path they were created with.
#[derive(Clone)]
pub struct Context {
    head: Arc<Frame>,
}

struct Frame {
    item: ContextItem,
    parent: Option<Arc<Frame>>,
    episode: Arc<Episode>,
}

impl Frame {
    fn is(&self, serial: u64) -> bool {
        self.item
            .injectable
            .as_ref()
            .is_some_and(|def| def.serial == serial)
    }
}

/// One entry of a [Context]
#[derive(Debug, Clone)]
pub struct ContextItem {
    id: String,
    injectable: Option<Arc<InjectableDef>>,
    parameter: Parameter,
}

impl ContextItem {
    /// Namespaced id of the injectable, or the container id for the root item
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    /// The injectable being instantiated, `None` for the container root
    pub fn injectable(&self) -> Option<&Arc<InjectableDef>> {
        self.injectable.as_ref()
    }
}

impl Context {
    /// Starts a new resolution episode at the container root
    pub(crate) fn root(container_id: &str) -> Context {
        Context {
            head: Arc::new(Frame {
                item: ContextItem {
                    id: container_id.to_string(),
                    injectable: None,
                    parameter: Parameter::none(),
                },
                parent: None,
                episode: Arc::default(),
            }),
        }
    }

    pub(crate) fn extend(
        &self,
        injectable: &Arc<InjectableDef>,
        id: String,
        parameter: Parameter,
    ) -> Context {
        Context {
            head: Arc::new(Frame {
                item: ContextItem {
                    id,
                    injectable: Some(injectable.clone()),
                    parameter,
                },
                parent: Some(self.head.clone()),
                episode: self.head.episode.clone(),
            }),
        }
    }

    /// The innermost item
    pub fn head(&self) -> &ContextItem {
        &self.head.item
    }

    /// All items, root first
    pub fn items(&self) -> Vec<ContextItem> {
        let mut items = self.frames().map(|frame| frame.item.clone()).collect::<Vec<_>>();
        items.reverse();
        items
    }

    /// Ids of all items, root first
    pub fn chain(&self) -> Chain {
        let mut ids = self.frames().map(|frame| frame.item.id.clone()).collect::<Vec<_>>();
        ids.reverse();
        Chain(ids)
    }

    /// Ids from the outermost occurrence of the injectable down to the head
    pub(crate) fn chain_from(&self, serial: u64) -> Option<Chain> {
        let mut frames = self.frames().collect::<Vec<_>>();
        frames.reverse();
        let start = frames.iter().position(|frame| frame.is(serial))?;
        Some(Chain(
            frames[start..]
                .iter()
                .map(|frame| frame.item.id.clone())
                .collect(),
        ))
    }

    /// Whether the injectable appears anywhere on the path
    pub(crate) fn contains(&self, serial: u64) -> bool {
        self.frames().any(|frame| frame.is(serial))
    }

    pub(crate) fn episode(&self) -> &Episode {
        &self.head.episode
    }

    /// Frames from the head up to the root
    fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        let mut next = Some(self.head.as_ref());
        std::iter::from_fn(move || {
            let frame = next?;
            next = frame.parent.as_deref();
            Some(frame)
        })
    }
}

/// State shared by every context of one root resolution
#[derive(Default)]
pub(crate) struct Episode {
    reported: Mutex<Vec<InjectError>>,
}

impl Episode {
    /// Records the error, returning false if the same error was already reported in this episode
    pub(crate) fn first_report(&self, error: &InjectError) -> bool {
        let mut reported = self.reported.lock().unwrap_or_else(PoisonError::into_inner);
        if reported.iter().any(|seen| seen.is_same(error)) {
            return false;
        }
        reported.push(error.clone());
        true
    }
}
