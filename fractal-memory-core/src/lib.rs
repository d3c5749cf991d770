//! Hierarchical memory core: a tiered L0→L1→L2→L3 consolidation pipeline,
//! hybrid vector/keyword/graph retrieval, and a reasoning bank of task
//! strategies, for a conversational agent to build durable memory on top
//! of.
//!
//! The core itself does not implement storage or model access: it defines
//! [`store::VolatileStore`] and [`store::GraphStore`] as the persistence
//! seams, and [`providers::EmbeddingProvider`] / [`providers::Summarizer`] /
//! [`providers::CompletionProvider`] as the model-backed seams, leaving
//! concrete adapters to sibling crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod providers;
pub mod reasoning;
pub mod retriever;
pub mod retry;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use memory::FractalMemory;
pub use providers::{BatchSummary, CompletionProvider, EmbeddingProvider, SummaryInput, Summarizer};
pub use reasoning::ReasoningBank;
pub use retriever::HybridRetriever;
pub use store::{GraphStore, VolatileStore};
pub use types::{
    ConsolidationCounters, Episode, Entity, Experience, GcCounters, MemoryStats, Outcome,
    Primitive, RecallResult, Scale, Strategy, Tier,
};
