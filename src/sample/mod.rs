//! Ring-buffers of sampling counters and the records drained from them.

use std::fs::File;
use std::io::{Error, Result};
use std::ptr::addr_of_mut;
use std::sync::atomic::AtomicU64;

use arena::Arena;
use rb::Rb;

use crate::ffi::{Metadata, PAGE_SIZE};

mod arena;
mod rb;
pub mod record;

pub use record::{Record, RecordKind, SampleFields};

/// Memory-mapped ring-buffer of one perf event file.
///
/// The mapping is one metadata page followed by `pages` data pages.
pub struct MappedBuffer {
    arena: Arena,
}

impl MappedBuffer {
    /// Maps `pages` data pages, `pages` must be a power of two.
    pub fn new(perf: &File, pages: usize) -> Result<Self> {
        if !pages.is_power_of_two() {
            return Err(Error::other(format!("{} is not a power of two", pages)));
        }
        let Some(len) = pages
            .checked_add(1)
            .and_then(|n| n.checked_mul(*PAGE_SIZE))
        else {
            return Err(Error::other("allocation size overflow"));
        };
        let arena = Arena::new(perf, len, 0)?;
        Ok(Self { arena })
    }

    /// Copies out every byte the kernel has written since the last call.
    pub fn read_available(&mut self, out: &mut Vec<u8>) -> usize {
        let alloc = self.arena.as_slice();
        let metadata = self.arena.as_ptr() as *mut Metadata;
        // The metadata page lives as long as `arena`, the kernel only writes
        // `data_head` and we are the only writer of `data_tail`.
        let (tail, head) = unsafe {
            (
                AtomicU64::from_ptr(addr_of_mut!((*metadata).data_tail)),
                AtomicU64::from_ptr(addr_of_mut!((*metadata).data_head)),
            )
        };
        // https://github.com/torvalds/linux/blob/v6.13/kernel/events/core.c#L6212
        let rb = Rb::new(&alloc[*PAGE_SIZE..], tail, head);
        rb.read_available(out)
    }
}
