//! Command definitions
//!
//! Name-addressed requests against an engine, for callers that do not want
//! to hold file handles (the CLI, scripted tests).

use crate::directory::Location;

/// A file-level request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open or create a file
    Open { name: String },

    /// Read `len` bytes at `offset`; `None` reads to the end
    Read {
        name: String,
        offset: u64,
        len: Option<u64>,
    },

    /// Overwrite at `offset`, creating the file if needed
    Write {
        name: String,
        offset: u64,
        data: Vec<u8>,
    },

    /// Write at the end of the file, creating it if needed
    Append { name: String, data: Vec<u8> },

    /// Splice bytes in at `offset`, creating the file if needed
    Insert {
        name: String,
        offset: u64,
        data: Vec<u8>,
    },

    /// Delete `len` bytes at `offset`
    Remove { name: String, offset: u64, len: u64 },

    /// Delete a whole file
    Delete { name: String },

    /// Rename a file
    Rename { from: String, to: String },

    /// List file names
    List,

    /// Look up where a file lives
    Stat { name: String },
}

impl Command {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Open { .. } => "open",
            Command::Read { .. } => "read",
            Command::Write { .. } => "write",
            Command::Append { .. } => "append",
            Command::Insert { .. } => "insert",
            Command::Remove { .. } => "remove",
            Command::Delete { .. } => "delete",
            Command::Rename { .. } => "rename",
            Command::List => "list",
            Command::Stat { .. } => "stat",
        }
    }

    /// Whether the command can change the store
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Command::Read { .. } | Command::List | Command::Stat { .. }
        )
    }
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Nothing to report
    Done,

    /// Bytes read
    Bytes(Vec<u8>),

    /// Bytes written, inserted or removed
    Count(u64),

    /// File names, sorted
    Names(Vec<String>),

    /// A file's location
    Location(Location),

    /// Whether a delete found its file
    Deleted(bool),
}
