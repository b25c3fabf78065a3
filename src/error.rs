use std::io;

use thiserror::Error;

/// Errors returned by [`EventSelectionSet`][crate::EventSelectionSet].
#[derive(Debug, Error)]
pub enum Error {
    /// The event name is unknown or cannot be measured on this machine.
    #[error("event type `{name}` is not supported: {reason}")]
    Resolution { name: String, reason: String },

    #[error("event type `{0}` appears more than once")]
    DuplicateEvent(String),

    /// A capability probe failed or the requested options are invalid for the kernel.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Configuration was attempted on a selection that already has opened counters.
    #[error("event selection {0} is already opened and its attributes are frozen")]
    AlreadyOpened(u32),

    #[error("no event selection with id {0}")]
    UnknownSelection(u32),

    #[error("cpu {0} is not online")]
    CpuNotOnline(i32),

    #[error("event files were already opened {0}, mixing open modes is not supported")]
    OpenModeMismatch(&'static str),

    #[error(
        "failed to open perf event file for `{event}` ({}) on cpu {cpu}: {source}",
        target(.tid)
    )]
    Open {
        event: String,
        tid: libc::pid_t,
        cpu: i32,
        source: io::Error,
    },

    #[error("failed to read counter of `{event}` for thread {tid} on cpu {cpu}: {source}")]
    Read {
        event: String,
        tid: libc::pid_t,
        cpu: i32,
        source: io::Error,
    },

    #[error("failed to mmap {pages} pages for perf event file: {source}")]
    Mmap { pages: usize, source: io::Error },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn target(tid: &libc::pid_t) -> String {
    match *tid {
        -1 => "all threads".to_string(),
        tid => format!("thread {}", tid),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
