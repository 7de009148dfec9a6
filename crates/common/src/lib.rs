//! Shared error definitions and the injected I/O capabilities used by every
//! skillet crate: subprocess execution, filesystem access and report sinks.

pub mod error;
pub mod fs;
pub mod output;
pub mod process;

pub use {
    error::{Error, FromMessage, Result},
    fs::{EntryKind, FileSystem, OsFileSystem},
    output::{BufferSink, LineSink, StdioSink},
    process::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner},
};
