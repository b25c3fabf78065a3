use std::fs::File;
use std::io::{Error, Result};
use std::os::fd::{AsRawFd, RawFd};

use super::CounterHandle;
use crate::config::{attr, EventAttr};
use crate::count::Counter;
use crate::ffi::bindings as b;
use crate::ffi::syscall::{perf_event_open, read};
use crate::sample::MappedBuffer;

/// A perf event file opened with `perf_event_open(2)`.
pub struct PerfEventFd {
    tid: libc::pid_t,
    cpu: i32,
    read_format: u64,
    // Declared before `perf` so the buffer is unmapped before the file closes.
    buffer: Option<MappedBuffer>,
    perf: File,
}

impl PerfEventFd {
    /// Opens a counter for `tid` on `cpu`, as a member of the group led by
    /// `group_fd` if given.
    pub fn open(
        event_attr: &EventAttr,
        tid: libc::pid_t,
        cpu: i32,
        group_fd: Option<RawFd>,
    ) -> Result<Self> {
        let attr = attr::from(event_attr);
        let flags = b::PERF_FLAG_FD_CLOEXEC;
        let perf = perf_event_open(&attr, tid, cpu, group_fd.unwrap_or(-1), flags)?;

        Ok(Self {
            tid,
            cpu,
            read_format: attr.read_format,
            buffer: None,
            perf,
        })
    }
}

impl CounterHandle for PerfEventFd {
    fn tid(&self) -> libc::pid_t {
        self.tid
    }

    fn cpu(&self) -> i32 {
        self.cpu
    }

    fn raw_fd(&self) -> RawFd {
        self.perf.as_raw_fd()
    }

    fn read_counter(&self) -> Result<Counter> {
        let mut buf = [0_u8; 4 * size_of::<u64>()];
        let len = Counter::read_buf_size(self.read_format).min(buf.len());
        let bytes = read(&self.perf, &mut buf[..len])?;
        Counter::from_bytes(&buf[..bytes], self.read_format)
            .ok_or_else(|| Error::other(format!("short counter read of {} bytes", bytes)))
    }

    fn mmap(&mut self, pages: usize) -> Result<()> {
        self.buffer = Some(MappedBuffer::new(&self.perf, pages)?);
        Ok(())
    }

    fn has_mapped_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> usize {
        match &mut self.buffer {
            Some(buffer) => buffer.read_available(out),
            None => 0,
        }
    }

    fn unmap(&mut self) {
        self.buffer = None;
    }
}
