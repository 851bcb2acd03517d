//! Multi-key dispatch registry ("adapter registry").
//!
//! Registrations are keyed by an ordered tuple of required capabilities (with
//! `None` as a match-anything wildcard), a provided capability, and a
//! discriminator name. Queries find the single most specific registration
//! ([`AdapterRegistry::lookup`]), the best match per name
//! ([`AdapterRegistry::lookup_all`]), or every match at once for broadcast
//! semantics ([`AdapterRegistry::subscribers`]).
//!
//! A registry never owns the capability graph; every operation takes it
//! explicitly, and one graph can back any number of registries. Registered
//! values are held as `Arc<V>` and compared only by identity (`Arc::ptr_eq`),
//! never by a user-overridable equality.

mod lookup;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::graph::{CapabilityGraph, NodeId};
use crate::hooks::{AdapterFactory, Declared};

use lookup::{CacheKey, LookupCache};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Bucket key: registrations with the same provided node, name, and arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RegKey {
    provided: NodeId,
    name: String,
    arity: usize,
}

/// One stored registration. Provided node, name, and arity live in the
/// bucket key.
pub(crate) struct Registration<V> {
    /// Expected capability per argument position; `None` matches anything.
    required: Vec<Option<NodeId>>,
    /// `None` is a block entry: it wins like any other registration but the
    /// lookup then reports a miss, suppressing broader matches.
    value: Option<Arc<V>>,
    /// Recency stamp; ties in the rank tuple go to the highest serial.
    serial: u64,
}

/// The dispatch engine over a [`CapabilityGraph`].
pub struct AdapterRegistry<V> {
    buckets: HashMap<RegKey, Vec<Registration<V>>>,
    serial: u64,
    cache: LookupCache<V>,
}

impl<V> AdapterRegistry<V> {
    /// Create a registry working against the given graph. The registry's
    /// lookup cache registers itself as an external dependent of the graph.
    pub fn new(graph: &mut CapabilityGraph) -> Self {
        Self {
            buckets: HashMap::new(),
            serial: 0,
            cache: LookupCache::new(graph),
        }
    }

    // -- mutation -----------------------------------------------------------

    /// Store a registration.
    ///
    /// `value: None` records a block entry: an explicit "unregistered here"
    /// that shadows broader registrations for anything it matches best.
    pub fn register(
        &mut self,
        graph: &mut CapabilityGraph,
        required: &[Option<NodeId>],
        provided: NodeId,
        name: &str,
        value: Option<Arc<V>>,
    ) -> Result<(), RegistryError> {
        self.validate(graph, required, provided)?;
        self.cache.sync(graph);
        self.serial += 1;
        self.buckets
            .entry(RegKey {
                provided,
                name: name.to_string(),
                arity: required.len(),
            })
            .or_default()
            .push(Registration {
                required: required.to_vec(),
                value,
                serial: self.serial,
            });
        let touched = touched_nodes(required, provided);
        self.cache.evict_touching(graph, &touched);
        log::debug!(
            "registered adapter for '{}' (name {name:?}, arity {})",
            graph.name(provided),
            required.len()
        );
        Ok(())
    }

    /// Remove registrations at the exact `(required, provided, name)` key.
    ///
    /// With `value` given, only registrations holding that same allocation
    /// (identity, not equality) are removed; with `None`, any registration at
    /// the key goes, block entries included. Returns whether anything was
    /// removed. Emptied buckets are pruned eagerly.
    pub fn unregister(
        &mut self,
        graph: &mut CapabilityGraph,
        required: &[Option<NodeId>],
        provided: NodeId,
        name: &str,
        value: Option<&Arc<V>>,
    ) -> Result<bool, RegistryError> {
        self.validate(graph, required, provided)?;
        self.cache.sync(graph);
        let key = RegKey {
            provided,
            name: name.to_string(),
            arity: required.len(),
        };
        let (removed, emptied) = match self.buckets.get_mut(&key) {
            Some(regs) => {
                let before = regs.len();
                regs.retain(|reg| {
                    let key_match = reg.required == required;
                    let value_match = match value {
                        None => true,
                        Some(v) => reg
                            .value
                            .as_ref()
                            .map_or(false, |held| Arc::ptr_eq(held, v)),
                    };
                    !(key_match && value_match)
                });
                (before - regs.len(), regs.is_empty())
            }
            None => (0, false),
        };
        if emptied {
            self.buckets.remove(&key);
        }
        if removed > 0 {
            let touched = touched_nodes(required, provided);
            self.cache.evict_touching(graph, &touched);
            log::debug!(
                "unregistered {removed} adapter(s) for '{}' (name {name:?})",
                graph.name(provided)
            );
        }
        Ok(removed > 0)
    }

    // -- queries ------------------------------------------------------------

    /// The single best match for the declaration tuple, or `None`.
    ///
    /// Results (hits and misses both) are memoized; the memo is dropped when
    /// the graph changes under any node it has seen, or trimmed when
    /// registrations change.
    pub fn lookup(
        &mut self,
        graph: &mut CapabilityGraph,
        decls: &[NodeId],
        provided: NodeId,
        name: &str,
    ) -> Option<Arc<V>> {
        if !self.query_nodes_ok(graph, decls, provided) {
            return None;
        }
        self.cache.sync(graph);
        let key = CacheKey {
            decls: decls.to_vec(),
            provided,
            name: name.to_string(),
        };
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let result = lookup::find_best(&self.buckets, graph, decls, provided, name)
            .and_then(|reg| reg.value.clone());
        self.cache.insert(graph, key, result.clone());
        result
    }

    /// Convenience for the common one-argument adapter case.
    pub fn lookup1(
        &mut self,
        graph: &mut CapabilityGraph,
        decl: NodeId,
        provided: NodeId,
        name: &str,
    ) -> Option<Arc<V>> {
        self.lookup(graph, &[decl], provided, name)
    }

    /// Strict lookup: a miss is an error instead of `None`.
    pub fn get(
        &mut self,
        graph: &mut CapabilityGraph,
        decls: &[NodeId],
        provided: NodeId,
        name: &str,
    ) -> Result<Arc<V>, RegistryError> {
        let provided_name = if graph.contains(provided) {
            graph.name(provided).to_string()
        } else {
            format!("{provided:?}")
        };
        self.lookup(graph, decls, provided, name)
            .ok_or(RegistryError::NotFound {
                provided: provided_name,
                name: name.to_string(),
            })
    }

    /// Every `(name, value)` pair with a non-empty match, each name resolved
    /// to its own best match independently. Ordered by name.
    pub fn lookup_all(
        &mut self,
        graph: &mut CapabilityGraph,
        decls: &[NodeId],
        provided: NodeId,
    ) -> Vec<(String, Arc<V>)> {
        if !self.query_nodes_ok(graph, decls, provided) {
            return Vec::new();
        }
        let mut names: Vec<String> = self
            .buckets
            .keys()
            .filter(|key| key.arity == decls.len() && graph.rank(provided, key.provided).is_some())
            .map(|key| key.name.clone())
            .collect();
        names.sort();
        names.dedup();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            if let Some(value) = self.lookup(graph, decls, provided, &name) {
                results.push((name, value));
            }
        }
        results
    }

    /// Every matching non-block registration regardless of name, in
    /// registration order. No single-winner suppression: this is the fan-out
    /// query for broadcast-style notification.
    pub fn subscribers(
        &self,
        graph: &CapabilityGraph,
        decls: &[NodeId],
        provided: NodeId,
    ) -> Vec<Arc<V>> {
        if !self.query_nodes_ok(graph, decls, provided) {
            return Vec::new();
        }
        let mut hits: Vec<(u64, Arc<V>)> = Vec::new();
        for (key, regs) in &self.buckets {
            if key.arity != decls.len() || graph.rank(provided, key.provided).is_none() {
                continue;
            }
            for reg in regs {
                if lookup::rank_required(graph, decls, &reg.required).is_none() {
                    continue;
                }
                if let Some(value) = &reg.value {
                    hits.push((reg.serial, Arc::clone(value)));
                }
            }
        }
        hits.sort_by_key(|(serial, _)| *serial);
        hits.into_iter().map(|(_, value)| value).collect()
    }

    /// Adapt `object` to `provided`: return it unchanged when its own
    /// declaration already satisfies the target, otherwise run the best
    /// unnamed single-argument factory over it. `None` when nothing matched
    /// or the factory declined.
    pub fn adapter_hook<T>(
        &mut self,
        graph: &mut CapabilityGraph,
        provided: NodeId,
        object: &Arc<T>,
    ) -> Option<Arc<T>>
    where
        T: Declared,
        V: AdapterFactory<T>,
    {
        let declaration = object.declaration();
        if graph.contains(declaration) && graph.is_or_extends(declaration, provided) {
            return Some(Arc::clone(object));
        }
        let factory = self.lookup1(graph, declaration, provided, "")?;
        factory.adapt(object)
    }

    // -- introspection ------------------------------------------------------

    /// Total number of stored registrations, block entries included.
    pub fn registration_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Number of live index buckets. Unregistration prunes empty ones.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of memoized query results currently held.
    pub fn cached_lookup_count(&self) -> usize {
        self.cache.entry_count()
    }

    // -- internals ----------------------------------------------------------

    fn validate(
        &self,
        graph: &CapabilityGraph,
        required: &[Option<NodeId>],
        provided: NodeId,
    ) -> Result<(), RegistryError> {
        if !graph.contains(provided) {
            return Err(RegistryError::UnknownNode(provided));
        }
        for slot in required.iter().flatten() {
            if !graph.contains(*slot) {
                return Err(RegistryError::UnknownNode(*slot));
            }
        }
        Ok(())
    }

    /// Queries never raise: unknown ids in a query are a logged miss.
    fn query_nodes_ok(&self, graph: &CapabilityGraph, decls: &[NodeId], provided: NodeId) -> bool {
        let ok = graph.contains(provided) && decls.iter().all(|&d| graph.contains(d));
        if !ok {
            log::warn!("query references unknown node(s); treating as a miss");
        }
        ok
    }
}

fn touched_nodes(required: &[Option<NodeId>], provided: NodeId) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = required.iter().flatten().copied().collect();
    nodes.push(provided);
    nodes
}
