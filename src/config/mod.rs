use std::time::Duration;

use crate::event::EventTypeAndModifier;
use crate::ffi::bindings as b;

pub(crate) mod attr;

/// Default period between two checks for CPU hotplug events.
pub const DEFAULT_HOTPLUG_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Options of an [`EventSelectionSet`][crate::EventSelectionSet].
#[derive(Clone, Debug)]
pub struct Opts {
    /// The set only counts events (`stat`-like usage) and never maps ring-buffers.
    ///
    /// Some kernels can't count `cpu-clock` and `task-clock` for a single
    /// privilege level, so the `u` and `k` modifiers are rejected for them.
    pub for_stat_cmd: bool,

    /// Period of the CPU hotplug timer registered by
    /// [`handle_cpu_hotplug_events`][crate::EventSelectionSet::handle_cpu_hotplug_events]
    /// when no explicit interval is given.
    pub hotplug_check_interval: Duration,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            for_stat_cmd: false,
            hotplug_check_interval: DEFAULT_HOTPLUG_CHECK_INTERVAL,
        }
    }
}

/// Controls when to generate a sample record.
///
/// Frequency and period are mutually exclusive: setting one replaces the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleOn {
    /// Sample on frequency (Hz), the kernel adjusts the period to reach it.
    Freq(u64),

    /// Sample on every N event counts.
    ///
    /// `Period(0)` never generates sample records, it is the default for counting.
    Period(u64),
}

impl Default for SampleOn {
    fn default() -> Self {
        Self::Period(0)
    }
}

/// Kernel-facing configuration of one event selection.
///
/// It is built incrementally by the configuration calls of the set and
/// copied into a `perf_event_attr` every time a counter is opened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventAttr {
    pub ty: u32,
    pub config: u64,

    pub sample_on: SampleOn,
    /// `PERF_SAMPLE_*` bits of the sample record layout.
    pub sample_type: u64,
    /// `PERF_FORMAT_*` bits of the counter read layout.
    pub read_format: u64,

    pub disabled: bool,
    pub inherit: bool,
    pub enable_on_exec: bool,
    pub sample_id_all: bool,

    pub exclude_user: bool,
    pub exclude_kernel: bool,
    pub exclude_hv: bool,
    pub exclude_host: bool,
    pub exclude_guest: bool,
    pub exclude_callchain_user: bool,
    pub precise_ip: u8,

    /// Generate `PERF_RECORD_MMAP` records.
    pub mmap: bool,
    /// Generate `PERF_RECORD_COMM` records.
    pub comm: bool,

    /// Wake up the reader every N records, 0 means the kernel default.
    pub wakeup_events: u32,

    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
}

impl EventAttr {
    /// The attribute every selection starts with.
    pub fn from_event(event: &EventTypeAndModifier) -> Self {
        let event_type = &event.event_type;

        let mut sample_type = b::PERF_SAMPLE_IP
            | b::PERF_SAMPLE_TID
            | b::PERF_SAMPLE_TIME
            | b::PERF_SAMPLE_PERIOD
            | b::PERF_SAMPLE_CPU
            | b::PERF_SAMPLE_ID;
        if event_type.is_tracepoint() {
            // Tracepoint fields travel in the raw data of samples.
            sample_type |= b::PERF_SAMPLE_RAW;
        }

        Self {
            ty: event_type.ty,
            config: event_type.config,
            sample_type,
            // `Counter` relies on this layout.
            read_format: b::PERF_FORMAT_TOTAL_TIME_ENABLED
                | b::PERF_FORMAT_TOTAL_TIME_RUNNING
                | b::PERF_FORMAT_ID,
            exclude_user: event.exclude_user,
            exclude_kernel: event.exclude_kernel,
            exclude_hv: event.exclude_hv,
            exclude_host: event.exclude_host,
            exclude_guest: event.exclude_guest,
            precise_ip: event.precise_ip,
            mmap: true,
            comm: true,
            ..Default::default()
        }
    }
}
