//! Storage test binary

mod sstable_tests;
mod tree_tests;
