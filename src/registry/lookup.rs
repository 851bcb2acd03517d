//! Best-match selection and the memoizing lookup cache.
//!
//! Specificity is a rank tuple compared lexicographically: one rank per
//! argument position (the index of the required node within the declaration's
//! resolution order; a wildcard ranks as the order's length, worse than any
//! real ancestor), then the rank of the registration's provided node within
//! the requested provided's order. Identical tuples fall back to registration
//! recency, so later registrations deterministically override earlier ones.

use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::{CapabilityGraph, Dependent, ExternalId, NodeId};

use super::{RegKey, Registration};

/// Per-position ranks for a registration against a declaration tuple, or
/// `None` when some position does not match.
pub(crate) fn rank_required(
    graph: &CapabilityGraph,
    decls: &[NodeId],
    required: &[Option<NodeId>],
) -> Option<Vec<u32>> {
    let mut ranks = Vec::with_capacity(decls.len() + 1);
    for (i, slot) in required.iter().enumerate() {
        match slot {
            Some(node) => ranks.push(graph.rank(decls[i], *node)?),
            // Wildcard: matches anything, less specific than any ancestor.
            None => ranks.push(graph.order_len(decls[i])),
        }
    }
    Some(ranks)
}

/// The single most specific eligible registration, or `None`.
///
/// A bucket is eligible when its arity matches and its provided node is the
/// requested one or an ancestor of it (a registration may offer something
/// more general than asked, never more specific).
pub(crate) fn find_best<'a, V>(
    buckets: &'a HashMap<RegKey, Vec<Registration<V>>>,
    graph: &CapabilityGraph,
    decls: &[NodeId],
    provided: NodeId,
    name: &str,
) -> Option<&'a Registration<V>> {
    let mut best: Option<(Vec<u32>, u64, &Registration<V>)> = None;
    for (key, regs) in buckets {
        if key.arity != decls.len() || key.name != name {
            continue;
        }
        let provided_rank = match graph.rank(provided, key.provided) {
            Some(rank) => rank,
            None => continue,
        };
        for reg in regs {
            let mut ranks = match rank_required(graph, decls, &reg.required) {
                Some(ranks) => ranks,
                None => continue,
            };
            ranks.push(provided_rank);
            let better = match best.as_ref() {
                None => true,
                Some((best_ranks, best_serial, _)) => {
                    ranks < *best_ranks || (ranks == *best_ranks && reg.serial > *best_serial)
                }
            };
            if better {
                best = Some((ranks, reg.serial, reg));
            }
        }
    }
    best.map(|(_, _, reg)| reg)
}

// ---------------------------------------------------------------------------
// LookupCache
// ---------------------------------------------------------------------------

/// Exact query tuple a memoized result is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub decls: Vec<NodeId>,
    pub provided: NodeId,
    pub name: String,
}

impl CacheKey {
    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.decls.iter().copied().chain(std::iter::once(self.provided))
    }
}

/// Memoizes ranked lookups, cached misses included.
///
/// The cache registers itself with the graph as one external dependent and
/// subscribes that handle to every node appearing in a cached query. Graph
/// mutation reaching any of those nodes bumps the external's generation; the
/// next registry operation observes the bump and drops everything at once.
/// Registration churn evicts selectively instead.
pub(crate) struct LookupCache<V> {
    external: ExternalId,
    seen_generation: u64,
    entries: HashMap<CacheKey, Option<Arc<V>>>,
    /// Local mirror of the graph subscriptions, for symmetric unsubscribe.
    subscribed: HashMap<NodeId, usize>,
}

impl<V> LookupCache<V> {
    pub fn new(graph: &mut CapabilityGraph) -> Self {
        let external = graph.register_external();
        Self {
            external,
            seen_generation: graph.external_generation(external),
            entries: HashMap::new(),
            subscribed: HashMap::new(),
        }
    }

    /// Drop everything if the graph moved under us.
    pub fn sync(&mut self, graph: &mut CapabilityGraph) {
        let generation = graph.external_generation(self.external);
        if generation != self.seen_generation {
            log::trace!(
                "lookup cache cleared ({} entries): generation {} -> {}",
                self.entries.len(),
                self.seen_generation,
                generation
            );
            self.clear(graph);
            self.seen_generation = generation;
        }
    }

    pub fn clear(&mut self, graph: &mut CapabilityGraph) {
        for (node, count) in self.subscribed.drain() {
            for _ in 0..count {
                graph.unsubscribe(node, Dependent::External(self.external));
            }
        }
        self.entries.clear();
    }

    pub fn get(&self, key: &CacheKey) -> Option<&Option<Arc<V>>> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, graph: &mut CapabilityGraph, key: CacheKey, value: Option<Arc<V>>) {
        for node in key.nodes() {
            graph.subscribe(node, Dependent::External(self.external));
            *self.subscribed.entry(node).or_insert(0) += 1;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            // Replaced an entry we were already subscribed for.
            self.release(graph, &key);
        }
    }

    /// Evict entries whose stored nodes imply any of `targets`.
    pub fn evict_touching(&mut self, graph: &mut CapabilityGraph, targets: &[NodeId]) {
        let victims: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|key| {
                key.nodes()
                    .any(|d| targets.iter().any(|&t| graph.is_or_extends(d, t)))
            })
            .cloned()
            .collect();
        if victims.is_empty() {
            return;
        }
        log::trace!("evicting {} cached lookup(s)", victims.len());
        for key in victims {
            self.entries.remove(&key);
            self.release(graph, &key);
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn release(&mut self, graph: &mut CapabilityGraph, key: &CacheKey) {
        for node in key.nodes() {
            graph.unsubscribe(node, Dependent::External(self.external));
            let exhausted = match self.subscribed.get_mut(&node) {
                Some(count) => {
                    *count -= 1;
                    *count == 0
                }
                None => false,
            };
            if exhausted {
                self.subscribed.remove(&node);
            }
        }
    }
}
