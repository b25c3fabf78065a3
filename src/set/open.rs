use std::os::fd::RawFd;

use log::debug;

use super::{EventFd, EventSelectionGroup, EventSelectionSet, OpenMode};
use crate::config::EventAttr;
use crate::count::{CounterInfo, CountersInfo};
use crate::error::{Error, Result};
use crate::host::Host;

impl EventSelectionSet {
    /// Opens one counter per selection, monitored thread and CPU in `on_cpus`.
    ///
    /// An empty `on_cpus` means every online CPU, `[-1]` means any CPU (see
    /// [`open_event_files_for_threads`][Self::open_event_files_for_threads]).
    /// Processes are expanded to their current threads, no monitored target
    /// means the whole system. Threads a group is already counting on a CPU
    /// are not opened again.
    ///
    /// Either all counters are opened or none of them stays open.
    pub fn open_event_files(&mut self, on_cpus: &[i32]) -> Result<()> {
        let (mode, cpus) = match on_cpus {
            [-1] => (OpenMode::AnyCpu, vec![-1]),
            [] => (OpenMode::PerCpu, self.host.online_cpus()?),
            cpus => {
                let online = self.host.online_cpus()?;
                if let Some(&cpu) = cpus.iter().find(|it| !online.contains(it)) {
                    return Err(Error::CpuNotOnline(cpu));
                }
                (OpenMode::PerCpu, cpus.to_vec())
            }
        };
        if let Some(open_mode) = self.open_mode {
            if open_mode != mode {
                return Err(Error::OpenModeMismatch(open_mode.describe()));
            }
        }

        let tids = self.monitored_tids()?;
        if mode == OpenMode::AnyCpu && tids == [-1] {
            return Err(Error::InvalidArgument(
                "counting all threads on any cpu needs a monitored target".to_string(),
            ));
        }

        let snapshot = self.fd_snapshot();
        let Self { groups, host, .. } = self;
        let result = groups.iter_mut().try_for_each(|group| {
            let opened: Vec<(libc::pid_t, i32)> = group
                .first()
                .map(|leader| leader.targets().collect())
                .unwrap_or_default();
            for &tid in &tids {
                for &cpu in cpus.iter().filter(|&&cpu| !opened.contains(&(tid, cpu))) {
                    open_group(group, &mut **host, tid, cpu, false)?;
                }
            }
            Ok::<_, Error>(())
        });
        if let Err(e) = result {
            self.rollback_to(&snapshot);
            return Err(e);
        }

        self.open_mode = Some(mode);
        Ok(())
    }

    /// Opens the counters of every monitored thread, not bound to a CPU.
    pub fn open_event_files_for_threads(&mut self) -> Result<()> {
        self.open_event_files(&[-1])
    }

    /// Reads every selection: counters saved from offline CPUs first, then every open counter.
    pub fn read_counters(&self) -> Result<Vec<CountersInfo<'_>>> {
        let mut out = vec![];
        for selection in self.selections() {
            let mut counters = selection.hotplugged_counters.clone();
            for fd in &selection.event_fds {
                let (tid, cpu) = (fd.handle.tid(), fd.handle.cpu());
                let counter = fd.handle.read_counter().map_err(|source| Error::Read {
                    event: selection.event_type_modifier.name.clone(),
                    tid,
                    cpu,
                    source,
                })?;
                counters.push(CounterInfo { tid, cpu, counter });
            }
            out.push(CountersInfo {
                selection,
                counters,
            });
        }
        Ok(out)
    }
}

/// Opens the counters of `group` for `tid` on `cpu`, leader first.
///
/// Counters reopened after a CPU came back online count right away, the
/// monitored threads are past their `exec` by then.
pub(super) fn open_group(
    group: &mut EventSelectionGroup,
    host: &mut dyn Host,
    tid: libc::pid_t,
    cpu: i32,
    hotplugged: bool,
) -> Result<()> {
    let mut leader: Option<RawFd> = None;
    for selection in group.iter_mut() {
        let reopened;
        let attr = match hotplugged {
            true => {
                reopened = EventAttr {
                    enable_on_exec: false,
                    disabled: false,
                    ..selection.event_attr.clone()
                };
                &reopened
            }
            false => &selection.event_attr,
        };

        let handle = host
            .open_counter(attr, tid, cpu, leader)
            .map_err(|source| Error::Open {
                event: selection.event_type_modifier.name.clone(),
                tid,
                cpu,
                source,
            })?;
        debug!(
            "opened `{}` for tid {} on cpu {}, fd {}",
            selection.event_type_modifier.name,
            tid,
            cpu,
            handle.raw_fd()
        );

        leader.get_or_insert(handle.raw_fd());
        selection.event_fds.push(EventFd::new(handle));
        selection.opened = true;
    }
    Ok(())
}
