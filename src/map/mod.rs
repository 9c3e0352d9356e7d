//! Map Module
//!
//! Generic hash map with a self-describing binary encoding, used to persist
//! the directory inside a block chain.
//!
//! ## Encoding
//! ```text
//! ┌───────────────┬──────────────────┬──────────────────┬─────
//! │ Count u64 LE  │ Key 0 │ Value 0  │ Key 1 │ Value 1  │ ...
//! └───────────────┴──────────────────┴──────────────────┴─────
//! ```
//! Keys and values are written with bincode. Entry order is the map's
//! iteration order and carries no meaning.

mod serial_map;

pub use serial_map::SerialMap;
