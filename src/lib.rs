//! # Tessera
//!
//! A block-oriented document store that keeps many named, byte-addressable
//! files inside a single backing file, with:
//! - Fixed-capacity blocks grown a page at a time
//! - A free list that is always drained before the store grows
//! - Random-access read, overwrite, insert and remove on every file
//! - A self-hosted directory persisted in its own block chain
//! - Memory-mapped or stream-based access to the backing file
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Engine / Commands                        │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Directory  │          │ FileHandle  │
//!   │ (SerialMap) │─────────►│ read/write/ │
//!   └─────────────┘          │ insert/rm   │
//!                            └──────┬──────┘
//!                                   │
//!                                   ▼
//!                    ┌──────────────────────────┐
//!                    │        BlockStore        │
//!                    │ allocator · free list ·  │
//!                    │ split/merge · header     │
//!                    └────────────┬─────────────┘
//!                                 │
//!                   ┌─────────────┴─────────────┐
//!                   ▼                           ▼
//!            ┌─────────────┐             ┌─────────────┐
//!            │ MappedMedium│             │ StreamMedium│
//!            │  (memmap2)  │             │ (seek + io) │
//!            └─────────────┘             └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod map;
pub mod file;
pub mod directory;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TesseraError};
pub use config::{Backend, Config, SyncStrategy};
pub use command::{Command, Output};
pub use directory::Location;
pub use engine::{CheckReport, Engine, StoreStats};
pub use file::{FileHandle, FileStream};
pub use map::SerialMap;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Tessera
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
