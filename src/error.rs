//! Error types for the capability graph and adapter registry.
//!
//! Misses are not errors anywhere in this crate: `lookup` and friends return
//! `Option`/empty collections, because a failed lookup is routine. The types
//! here cover structural failures (contradictory hierarchies, stale node ids)
//! and the strict query variants that are documented to fail loudly.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised while mutating the capability specification graph.
///
/// Every variant is fatal to the `declare`/`set_bases` call that raised it;
/// the graph is left exactly as it was before the call.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// No valid linearization exists for the node's base list.
    #[error("inconsistent hierarchy for '{node}': no valid order among [{}]", candidates.join(", "))]
    Inconsistent {
        /// The node whose bases could not be linearized.
        node: String,
        /// The candidate heads that blocked the merge.
        candidates: Vec<String>,
    },

    /// A new base already extends the node being rewired.
    #[error("cycle: '{base}' already extends '{node}'")]
    Cycle {
        /// The node whose bases were being reassigned.
        node: String,
        /// The offending base.
        base: String,
    },

    /// A node id does not belong to this graph.
    #[error("unknown capability node {0:?}")]
    UnknownNode(NodeId),
}

/// Errors raised by the adapter registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A registration referenced a node id that does not belong to the graph
    /// the registry was asked to work against.
    #[error("registration references unknown capability node {0:?}")]
    UnknownNode(NodeId),

    /// Strict lookup (`get`) found nothing. The non-strict `lookup` variants
    /// return `None` instead.
    #[error("no adapter provides '{provided}' (name {name:?})")]
    NotFound {
        /// Name of the requested target capability.
        provided: String,
        /// The discriminator name the query was restricted to.
        name: String,
    },
}

/// Errors raised by the strict adaptation entry point.
#[derive(Debug, Error)]
pub enum AdaptError {
    /// No strategy in the pipeline produced a delegate.
    #[error("could not adapt object declaring '{declaration}' to '{target}'")]
    CouldNotAdapt {
        /// Name of the object's declared capability.
        declaration: String,
        /// Name of the requested target capability.
        target: String,
    },
}
