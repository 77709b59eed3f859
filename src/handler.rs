//! Ordered handler chains invoked per queued event.

use crate::model::EventKind;
use parking_lot::RwLock;
use std::{marker::PhantomData, sync::Arc};
use thiserror::Error;

/// Error returned by a handler stage.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The controller has not completed its initial sync. Emitted by the
    /// chain's gate stage so the queue retries the task later.
    #[error("initial cache synchronization has not completed")]
    NotSynced,
    /// A registered consumer stage failed.
    #[error(transparent)]
    Stage(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn stage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Stage(err.into())
    }
}

/// A consumer of cache change events for one resource kind.
///
/// Stages run on the single queue worker, strictly serialized. Returning
/// an error aborts the remaining stages for the task and causes the whole
/// chain to be retried, so stages must be idempotent.
pub trait ResourceHandler<K>: Send + Sync {
    fn on_add(&self, object: &K) -> Result<(), HandlerError>;
    fn on_update(&self, object: &K) -> Result<(), HandlerError>;
    fn on_delete(&self, object: &K) -> Result<(), HandlerError>;
}

/// An append-only, ordered list of handler stages for one resource kind.
pub struct HandlerChain<K> {
    stages: RwLock<Vec<Arc<dyn ResourceHandler<K>>>>,
}

impl<K> Default for HandlerChain<K> {
    fn default() -> Self {
        Self {
            stages: RwLock::new(Vec::new()),
        }
    }
}

impl<K> HandlerChain<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, stage: Arc<dyn ResourceHandler<K>>) {
        self.stages.write().push(stage);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }

    /// Runs every stage in registration order, stopping at the first error.
    pub fn run(&self, object: &K, event: EventKind) -> Result<(), HandlerError> {
        // Dispatch outside the lock so stages may register further stages.
        let stages = self.stages.read().clone();
        for stage in stages {
            match event {
                EventKind::Add => stage.on_add(object)?,
                EventKind::Update => stage.on_update(object)?,
                EventKind::Delete => stage.on_delete(object)?,
            }
        }
        Ok(())
    }
}

/// Adapts a closure into a stage that handles every event kind uniformly.
pub struct FnHandler<K, F> {
    f: F,
    _kind: PhantomData<fn(&K)>,
}

impl<K, F> FnHandler<K, F>
where
    F: Fn(&K, EventKind) -> Result<(), HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _kind: PhantomData,
        }
    }
}

impl<K, F> ResourceHandler<K> for FnHandler<K, F>
where
    F: Fn(&K, EventKind) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_add(&self, object: &K) -> Result<(), HandlerError> {
        (self.f)(object, EventKind::Add)
    }

    fn on_update(&self, object: &K) -> Result<(), HandlerError> {
        (self.f)(object, EventKind::Update)
    }

    fn on_delete(&self, object: &K) -> Result<(), HandlerError> {
        (self.f)(object, EventKind::Delete)
    }
}
