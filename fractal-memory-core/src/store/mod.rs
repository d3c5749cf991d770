//! Adapter traits for the two storage tiers. Concrete implementations are
//! external collaborators (§1) living in sibling crates
//! (`fractal-memory-volatile-redb`, `fractal-memory-graph-turso`); this
//! module only pins the contract every backend must satisfy.

pub mod graph;
pub mod volatile;

pub use graph::GraphStore;
pub use volatile::VolatileStore;
