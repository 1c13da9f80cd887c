//! Persisted conversation state: the Brain's rolling per-thread history.

pub mod history;
