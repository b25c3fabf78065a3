//! The machine the counters are opened on: counter creation, CPU topology,
//! thread discovery and kernel capability probes.

#[cfg(test)]
mod test;

mod cpu;

use std::fs;
use std::io::{Error, ErrorKind, Result};
use std::os::fd::RawFd;
use std::path::PathBuf;

pub use cpu::parse_cpu_list;

use crate::config::{EventAttr, SampleOn};
use crate::ffi::bindings as b;
use crate::handle::{CounterHandle, PerfEventFd};

/// Stack bytes dumped per sample when probing Dwarf call chain support.
const PROBE_STACK_SIZE: u32 = 8192;

/// Everything the event selection set needs from the machine.
pub trait Host {
    /// Opens one counter for `tid` on `cpu`, joining the group of `group_fd` if given.
    fn open_counter(
        &mut self,
        attr: &EventAttr,
        tid: libc::pid_t,
        cpu: i32,
        group_fd: Option<RawFd>,
    ) -> Result<Box<dyn CounterHandle>>;

    /// CPUs currently online, sorted.
    fn online_cpus(&self) -> Result<Vec<i32>>;

    /// Threads currently alive in process `pid`.
    fn threads_of_process(&self, pid: libc::pid_t) -> Result<Vec<libc::pid_t>>;

    /// Whether the kernel accepts `attr` at all.
    fn is_event_attr_supported(&self, attr: &EventAttr) -> bool;

    fn is_branch_sampling_supported(&self) -> bool;

    fn is_dwarf_call_chain_sampling_supported(&self) -> bool;
}

/// The running Linux kernel.
#[derive(Clone, Debug)]
pub struct LinuxHost {
    cpu_online_path: PathBuf,
    proc_root: PathBuf,
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self {
            cpu_online_path: PathBuf::from("/sys/devices/system/cpu/online"),
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl LinuxHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads topology from other sysfs/procfs locations, e.g. a container mount.
    pub fn with_paths(cpu_online_path: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            cpu_online_path: cpu_online_path.into(),
            proc_root: proc_root.into(),
        }
    }
}

impl Host for LinuxHost {
    fn open_counter(
        &mut self,
        attr: &EventAttr,
        tid: libc::pid_t,
        cpu: i32,
        group_fd: Option<RawFd>,
    ) -> Result<Box<dyn CounterHandle>> {
        let fd = PerfEventFd::open(attr, tid, cpu, group_fd)?;
        Ok(Box::new(fd))
    }

    fn online_cpus(&self) -> Result<Vec<i32>> {
        let text = fs::read_to_string(&self.cpu_online_path)?;
        parse_cpu_list(&text)
    }

    fn threads_of_process(&self, pid: libc::pid_t) -> Result<Vec<libc::pid_t>> {
        let task_dir = self.proc_root.join(pid.to_string()).join("task");
        let mut tids = vec![];
        for entry in fs::read_dir(task_dir)? {
            let name = entry?.file_name();
            if let Some(tid) = name.to_str().and_then(|it| it.parse().ok()) {
                tids.push(tid);
            }
        }
        if tids.is_empty() {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("process {} has no threads", pid),
            ));
        }
        tids.sort_unstable();
        Ok(tids)
    }

    fn is_event_attr_supported(&self, attr: &EventAttr) -> bool {
        is_event_attr_supported(attr)
    }

    fn is_branch_sampling_supported(&self) -> bool {
        is_branch_sampling_supported()
    }

    fn is_dwarf_call_chain_sampling_supported(&self) -> bool {
        is_dwarf_call_chain_sampling_supported()
    }
}

/// Tries to open `attr` on the current process.
pub fn is_event_attr_supported(attr: &EventAttr) -> bool {
    let attr = EventAttr {
        // The probe must not wait for an exec that never comes.
        enable_on_exec: false,
        ..attr.clone()
    };
    PerfEventFd::open(&attr, 0, -1, None).is_ok()
}

/// Whether the hardware and kernel can record branch stacks.
pub fn is_branch_sampling_supported() -> bool {
    let attr = EventAttr {
        ty: b::PERF_TYPE_HARDWARE,
        config: b::PERF_COUNT_HW_CPU_CYCLES,
        sample_on: SampleOn::Period(1),
        sample_type: b::PERF_SAMPLE_BRANCH_STACK,
        branch_sample_type: b::PERF_SAMPLE_BRANCH_ANY,
        ..Default::default()
    };
    is_event_attr_supported(&attr)
}

/// Whether the kernel can dump user registers and stack in samples.
pub fn is_dwarf_call_chain_sampling_supported() -> bool {
    let attr = EventAttr {
        ty: b::PERF_TYPE_SOFTWARE,
        config: b::PERF_COUNT_SW_CPU_CLOCK,
        sample_on: SampleOn::Period(1),
        sample_type: b::PERF_SAMPLE_CALLCHAIN
            | b::PERF_SAMPLE_REGS_USER
            | b::PERF_SAMPLE_STACK_USER,
        exclude_callchain_user: true,
        sample_regs_user: supported_reg_mask(),
        sample_stack_user: PROBE_STACK_SIZE,
        ..Default::default()
    };
    is_event_attr_supported(&attr)
}

/// `PERF_SAMPLE_REGS_USER` mask of all general purpose registers of the build arch.
// arch/*/include/uapi/asm/perf_regs.h
pub fn supported_reg_mask() -> u64 {
    if cfg!(target_arch = "x86_64") {
        // PERF_REG_X86_64_MAX without the segment registers DS, ES, FS, GS.
        ((1 << 24) - 1) & !(0b1111 << 12)
    } else if cfg!(target_arch = "x86") {
        ((1 << 16) - 1) & !(0b1111 << 12)
    } else if cfg!(target_arch = "aarch64") {
        (1 << 33) - 1
    } else if cfg!(target_arch = "arm") {
        (1 << 16) - 1
    } else {
        0
    }
}
