//! Repository backends that are not tied to a single feature module.

pub mod memory;

pub use memory::MemoryStore;
