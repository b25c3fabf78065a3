//! Counter handles: one opened perf event file per (event, thread, CPU).

use std::io::Result;
use std::os::fd::RawFd;

use crate::count::Counter;

mod perf;

pub use perf::PerfEventFd;

/// One opened performance counter.
///
/// Dropping the handle closes it, unmapping its ring-buffer first.
pub trait CounterHandle {
    /// Thread the counter is attached to, -1 for all threads.
    fn tid(&self) -> libc::pid_t;

    /// CPU the counter is attached to, -1 for any CPU.
    fn cpu(&self) -> i32;

    /// Descriptor to poll for ring-buffer readiness.
    fn raw_fd(&self) -> RawFd;

    /// Reads the aggregated counter value.
    fn read_counter(&self) -> Result<Counter>;

    /// Maps a ring-buffer of `pages` data pages (a power of two).
    fn mmap(&mut self, pages: usize) -> Result<()>;

    fn has_mapped_buffer(&self) -> bool;

    /// Appends all bytes currently available in the ring-buffer to `out`.
    fn drain(&mut self, out: &mut Vec<u8>) -> usize;

    fn unmap(&mut self);
}
