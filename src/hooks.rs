//! Adaptation entry points layered over the registry.
//!
//! [`AdaptationPipeline`] is the user-facing "give me this object as that
//! capability" call. It first checks whether the object already satisfies the
//! target, then consults an ordered list of pluggable [`AdaptStrategy`]
//! implementations. [`RegistryStrategy`] is the stock strategy backed by an
//! [`AdapterRegistry`] behind a lock, so one pipeline can serve callers that
//! also mutate the registry.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::AdaptError;
use crate::graph::{CapabilityGraph, NodeId};
use crate::registry::AdapterRegistry;

/// An object that knows which capability node it declares.
pub trait Declared {
    fn declaration(&self) -> NodeId;
}

/// A registered value that can manufacture an adapted view of an object.
///
/// Returning `None` declines the adaptation even though the registration
/// matched; the pipeline then falls through to the next strategy.
pub trait AdapterFactory<T> {
    fn adapt(&self, object: &Arc<T>) -> Option<Arc<T>>;
}

impl<T, F> AdapterFactory<T> for F
where
    F: Fn(&Arc<T>) -> Option<Arc<T>>,
{
    fn adapt(&self, object: &Arc<T>) -> Option<Arc<T>> {
        self(object)
    }
}

/// One pluggable way of producing an adapted object.
pub trait AdaptStrategy<T> {
    fn try_adapt(
        &self,
        graph: &mut CapabilityGraph,
        target: NodeId,
        object: &Arc<T>,
    ) -> Option<Arc<T>>;
}

/// Strategy that dispatches through an [`AdapterRegistry`] of factories.
pub struct RegistryStrategy<T, V> {
    registry: Arc<RwLock<AdapterRegistry<V>>>,
    _object: PhantomData<fn(T)>,
}

impl<T, V> RegistryStrategy<T, V> {
    pub fn new(registry: Arc<RwLock<AdapterRegistry<V>>>) -> Self {
        Self {
            registry,
            _object: PhantomData,
        }
    }
}

impl<T, V> AdaptStrategy<T> for RegistryStrategy<T, V>
where
    T: Declared,
    V: AdapterFactory<T>,
{
    fn try_adapt(
        &self,
        graph: &mut CapabilityGraph,
        target: NodeId,
        object: &Arc<T>,
    ) -> Option<Arc<T>> {
        self.registry.write().adapter_hook(graph, target, object)
    }
}

/// Ordered strategy chain with a self-satisfaction short circuit.
pub struct AdaptationPipeline<T> {
    strategies: Vec<Box<dyn AdaptStrategy<T>>>,
}

impl<T: Declared> AdaptationPipeline<T> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy; earlier strategies are consulted first.
    pub fn push(&mut self, strategy: Box<dyn AdaptStrategy<T>>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Adapt `object` to `target`.
    ///
    /// An object whose own declaration already implies `target` is returned
    /// unchanged without consulting any strategy. Otherwise strategies run in
    /// order and the first `Some` wins.
    pub fn adapt(
        &self,
        graph: &mut CapabilityGraph,
        target: NodeId,
        object: &Arc<T>,
    ) -> Option<Arc<T>> {
        let declaration = object.declaration();
        if graph.contains(declaration) && graph.is_or_extends(declaration, target) {
            log::trace!(
                "object already provides '{}', no adaptation needed",
                graph.name(target)
            );
            return Some(Arc::clone(object));
        }
        for strategy in &self.strategies {
            if let Some(adapted) = strategy.try_adapt(graph, target, object) {
                return Some(adapted);
            }
        }
        None
    }

    /// Like [`adapt`](Self::adapt) but falls back to `default` on a miss.
    pub fn adapt_or(
        &self,
        graph: &mut CapabilityGraph,
        target: NodeId,
        object: &Arc<T>,
        default: Arc<T>,
    ) -> Arc<T> {
        self.adapt(graph, target, object).unwrap_or(default)
    }

    /// Strict variant: a miss is an [`AdaptError`] naming both sides.
    pub fn adapt_strict(
        &self,
        graph: &mut CapabilityGraph,
        target: NodeId,
        object: &Arc<T>,
    ) -> Result<Arc<T>, AdaptError> {
        self.adapt(graph, target, object).ok_or_else(|| {
            let declaration = object.declaration();
            let describe = |node: NodeId| {
                if graph.contains(node) {
                    graph.name(node).to_string()
                } else {
                    format!("{node:?}")
                }
            };
            AdaptError::CouldNotAdapt {
                declaration: describe(declaration),
                target: describe(target),
            }
        })
    }
}

impl<T: Declared> Default for AdaptationPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}
