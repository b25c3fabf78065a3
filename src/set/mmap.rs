use std::io;
use std::os::fd::RawFd;

use log::{debug, warn};

use super::{EventFd, EventSelectionSet};
use crate::error::{Error, Result};
use crate::io_loop::{IoLoop, LoopCallback};
use crate::sample::record::split_records;
use crate::sample::Record;

impl EventSelectionSet {
    /// Maps a ring-buffer for every open counter.
    ///
    /// Buffers of `max_pages` data pages are tried first, halving down to
    /// `min_pages` while the kernel refuses. Both must be powers of two.
    pub fn mmap_event_files(&mut self, min_pages: usize, max_pages: usize) -> Result<()> {
        if !min_pages.is_power_of_two() || !max_pages.is_power_of_two() || min_pages > max_pages {
            return Err(Error::InvalidArgument(format!(
                "invalid mmap page range {}..={}",
                min_pages, max_pages
            )));
        }
        if self.record_callback.is_some() {
            return Err(Error::InvalidArgument(
                "mapped event files are being read".to_string(),
            ));
        }

        let mut pages = max_pages;
        loop {
            match self.map_all(pages) {
                Ok(()) => {
                    debug!("mapped event files with {} data pages each", pages);
                    self.mmap_pages = Some(pages);
                    return Ok(());
                }
                Err(source) => {
                    self.unmap_all();
                    if pages <= min_pages {
                        return Err(Error::Mmap { pages, source });
                    }
                    debug!("failed to mmap {} pages ({}), trying {}", pages, source, pages / 2);
                    pages /= 2;
                }
            }
        }
    }

    fn map_all(&mut self, pages: usize) -> io::Result<()> {
        for fd in self.event_fds_mut() {
            fd.handle.mmap(pages)?;
        }
        Ok(())
    }

    fn unmap_all(&mut self) {
        for fd in self.event_fds_mut() {
            fd.handle.unmap();
        }
        self.mmap_pages = None;
    }

    /// Registers every mapped counter with `lp`, `callback` is then called for
    /// every record drained while `lp` runs.
    ///
    /// The loop stops once `callback` returns `false`.
    pub fn prepare_to_read_mmap_event_data(
        &mut self,
        lp: &mut dyn IoLoop<Self>,
        callback: impl FnMut(&Record) -> bool + 'static,
    ) -> Result<()> {
        if self.mmap_pages.is_none() {
            return Err(Error::InvalidArgument(
                "event files are not mapped".to_string(),
            ));
        }
        self.record_callback = Some(Box::new(callback));
        if let Err(e) = self.register_mapped_fds(lp, None) {
            self.record_callback = None;
            return Err(e);
        }
        Ok(())
    }

    /// Delivers the records left in every ring-buffer, then removes the counters
    /// from `lp` and unmaps their buffers.
    pub fn finish_read_mmap_event_data(&mut self, lp: &mut dyn IoLoop<Self>) -> Result<()> {
        let mut callback = self.record_callback.take();
        let mut keep_going = true;
        let mut result = Ok(());

        for selection in self.selections_mut() {
            let selection_id = selection.selection_id;
            let sample_type = selection.event_attr.sample_type;
            for fd in &mut selection.event_fds {
                if !fd.handle.has_mapped_buffer() {
                    continue;
                }
                if let (Some(callback), true) = (&mut callback, keep_going) {
                    keep_going = drain_event_fd(fd, selection_id, sample_type, &mut **callback);
                }
                if let Some(event) = fd.loop_event.take() {
                    if let Err(e) = lp.del_event(event) {
                        let raw_fd = fd.handle.raw_fd();
                        warn!("failed to remove fd {} from the io loop: {}", raw_fd, e);
                        result = result.and(Err(e));
                    }
                }
                fd.handle.unmap();
            }
        }

        self.mmap_pages = None;
        Ok(result?)
    }

    /// Maps and registers the counters just opened on `cpu` if the event files are mapped.
    pub(super) fn create_mapped_buffer_for_cpu(
        &mut self,
        lp: &mut dyn IoLoop<Self>,
        cpu: i32,
    ) -> Result<()> {
        let Some(pages) = self.mmap_pages else {
            return Ok(());
        };
        for fd in self.event_fds_mut() {
            if fd.handle.cpu() == cpu && !fd.handle.has_mapped_buffer() {
                fd.handle
                    .mmap(pages)
                    .map_err(|source| Error::Mmap { pages, source })?;
            }
        }
        if self.record_callback.is_some() {
            self.register_mapped_fds(lp, Some(cpu))?;
        }
        Ok(())
    }

    // Registers the mapped counters of `cpu` (of every CPU if `None`) not registered yet.
    fn register_mapped_fds(&mut self, lp: &mut dyn IoLoop<Self>, cpu: Option<i32>) -> Result<()> {
        let mut result = Ok(());
        for fd in self.event_fds_mut() {
            let wanted = cpu.map_or(true, |cpu| fd.handle.cpu() == cpu);
            if !wanted || !fd.handle.has_mapped_buffer() || fd.loop_event.is_some() {
                continue;
            }
            let raw_fd = fd.handle.raw_fd();
            match lp.add_read_event(raw_fd, read_callback(raw_fd)) {
                Ok(event) => fd.loop_event = Some(event),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if result.is_err() {
            self.unregister_fds(lp, cpu);
        }
        Ok(result?)
    }

    pub(super) fn unregister_fds(&mut self, lp: &mut dyn IoLoop<Self>, cpu: Option<i32>) {
        for fd in self.event_fds_mut() {
            if cpu.is_some_and(|cpu| fd.handle.cpu() != cpu) {
                continue;
            }
            if let Some(event) = fd.loop_event.take() {
                if let Err(e) = lp.del_event(event) {
                    warn!("failed to remove fd {} from the io loop: {}", fd.handle.raw_fd(), e);
                }
            }
        }
    }

    /// Delivers the records available in the ring-buffer of `fd`.
    ///
    /// Returns `false` if the record callback asked to stop.
    fn read_mmap_event_data_for_fd(&mut self, fd: RawFd) -> bool {
        let Self {
            groups,
            record_callback,
            ..
        } = self;
        let Some(callback) = record_callback else {
            return true;
        };
        for selection in groups.iter_mut().flatten() {
            let selection_id = selection.selection_id;
            let sample_type = selection.event_attr.sample_type;
            if let Some(event_fd) = selection
                .event_fds
                .iter_mut()
                .find(|it| it.handle.raw_fd() == fd)
            {
                return drain_event_fd(event_fd, selection_id, sample_type, &mut **callback);
            }
        }
        true
    }
}

fn read_callback(fd: RawFd) -> LoopCallback<EventSelectionSet> {
    Box::new(
        move |set: &mut EventSelectionSet, _: &mut dyn IoLoop<EventSelectionSet>| {
            set.read_mmap_event_data_for_fd(fd)
        },
    )
}

/// Passes the records available in the ring-buffer of `fd` to `callback` in
/// write order, stopping at the first `false`.
pub(super) fn drain_event_fd(
    fd: &mut EventFd,
    selection_id: u32,
    sample_type: u64,
    callback: &mut dyn FnMut(&Record) -> bool,
) -> bool {
    let mut bytes = vec![];
    fd.handle.drain(&mut bytes);

    let (records, consumed) = split_records(&bytes, selection_id, sample_type);
    if consumed < bytes.len() {
        warn!(
            "dropped {} bytes of a malformed record from fd {}",
            bytes.len() - consumed,
            fd.handle.raw_fd()
        );
    }
    records.iter().all(|it| callback(it))
}
