//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track record count and size for flush triggers
//! - Ordered iteration for SSTable creation
//!
//! ## Data Structure Choice
//! An arena-backed skip list behind a `parking_lot::RwLock`. Link mutation
//! is not lock-free; writers take the exclusive side, lookups share.

mod skiplist;
mod table;

pub use skiplist::{Iter, SkipList};
pub use table::MemTable;
