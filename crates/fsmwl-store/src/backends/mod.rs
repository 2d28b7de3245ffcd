mod memory;

pub use memory::{ConcurrencyControl, MemoryStore, StoreStats};
