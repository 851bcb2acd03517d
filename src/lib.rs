//! # capgraph
//!
//! Capability specification graph with deterministic resolution orders and a
//! specificity-ranked multi-key adapter registry.
//!
//! Capabilities are declared as named nodes in a directed acyclic graph
//! ([`CapabilityGraph`]). Each node gets a deterministic linear resolution
//! order over its ancestors (a C3-style merge with the designated root forced
//! last), and that order is what gives "more specific" a precise meaning
//! everywhere else in the crate.
//!
//! On top of the graph, [`AdapterRegistry`] maps ordered tuples of required
//! capabilities, plus a provided capability and a discriminator name, to
//! registered values. Lookups pick the most specific eligible registration,
//! memoize the result, and stay correct across live rewiring of the graph
//! through a dependents-based invalidation protocol.
//!
//! [`AdaptationPipeline`] ties the two together into a "give me this object
//! as that capability" call with pluggable strategies.

pub mod error;
pub mod graph;
pub mod hooks;
pub mod registry;

pub use error::{AdaptError, HierarchyError, RegistryError};
pub use graph::{CapabilityGraph, Dependent, ExternalId, NodeId};
pub use hooks::{AdaptStrategy, AdaptationPipeline, AdapterFactory, Declared, RegistryStrategy};
pub use registry::AdapterRegistry;

/// Crate version, as baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
