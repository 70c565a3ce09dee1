//! # TierKV
//!
//! An embedded, ordered key-value store built on a log-structured merge tree:
//! - Skip list memtable for recent writes
//! - Write-Ahead Logging (WAL) for durability and crash recovery
//! - Immutable SSTables with a sparse index, organized into levels
//! - Background flush and leveled compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Database (set / get / delete)              │
//! │                 (Single Writer / Multi Reader)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐      freeze      ┌─────────────┐
//!   │     WAL     │          │  MemTable   │ ───────────────► │   Frozen    │
//!   │  (Append)   │          │ (SkipList)  │                  │  MemTable   │
//!   └─────────────┘          └─────────────┘                  └──────┬──────┘
//!                                                                    │ flush
//!                                                                    ▼
//!                            ┌───────────────────────────────────────────────┐
//!                            │ TableTree   L0 ─► L1 ─► ... ─► Ln  (compaction)│
//!                            └───────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod record;
pub mod codec;

pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;
mod background;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use background::CompactionStatus;
pub use codec::{BincodeCodec, Collection, ValueCodec};
pub use config::{Config, WalSyncStrategy};
pub use engine::{Database, DatabaseStats};
pub use error::{Result, TierError};
pub use record::ValueRecord;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TierKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
