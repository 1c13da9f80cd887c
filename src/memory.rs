//! Memory Store: durable per-category markdown files plus an append-only
//! JSONL action log, with an optional LanceDB semantic index layered on top
//! for `recall`. See [`store::MemoryStore`] for the full contract.

pub mod embedding;
pub mod lance;
pub mod store;
pub mod types;

pub use store::MemoryStore;
pub use types::{ActionLogEntry, Category, DeleteOutcome, MemoryEntry, RecallResult};
