//! File Module
//!
//! A file is a named, doubly-linked chain of live blocks. Its byte content is
//! the concatenation of each block's used payload, in chain order; blocks may
//! be partially filled anywhere in the chain.
//!
//! ```text
//!   first                                         end
//!    │                                             │
//!    ▼                                             ▼
//!   [Hell] ◄──► [o, W] ◄──► [orld] ◄──► [] ◄──► [!]
//!    0..4        4..7        7..11      11..11   11..12
//! ```
//!
//! ## Responsibilities
//! - Track size, cursor position and the block the cursor is in
//! - Positional read, overwrite/extend, insert and remove
//! - Expose a `std::io` adapter over a file
//!
//! The first block of a file is fixed for its lifetime: inserts and removes
//! at offset 0 edit it in place rather than replacing it.

mod handle;
mod ops;
mod stream;

pub use handle::FileHandle;
pub use stream::FileStream;
