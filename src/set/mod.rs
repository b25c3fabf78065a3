//! The event selection set: groups of configured events and the counters
//! opened for them across every monitored thread and CPU.

#[cfg(test)]
mod fake;

mod hotplug;
mod mmap;
mod open;

use std::collections::BTreeSet;
use std::fmt;

use crate::config::{EventAttr, Opts, SampleOn};
use crate::count::CounterInfo;
use crate::error::{Error, Result};
use crate::event::{BuiltinResolver, EventResolver, EventTypeAndModifier};
use crate::ffi::bindings as b;
use crate::handle::CounterHandle;
use crate::host::{supported_reg_mask, Host, LinuxHost};
use crate::io_loop::EventRef;
use crate::sample::Record;

/// Largest user stack dump the kernel accepts per sample (`u16::MAX` rounded down to 8).
pub const MAX_DUMP_STACK_SIZE: u32 = 65528;

/// Branch filters of which at least one must be requested.
const BRANCH_SAMPLE_TYPE_MASK: u64 = b::PERF_SAMPLE_BRANCH_ANY
    | b::PERF_SAMPLE_BRANCH_ANY_CALL
    | b::PERF_SAMPLE_BRANCH_ANY_RETURN
    | b::PERF_SAMPLE_BRANCH_IND_CALL;

/// Ordered selections scheduled together by the kernel, the first one leads.
pub type EventSelectionGroup = Vec<EventSelection>;

type RecordCallback = Box<dyn FnMut(&Record) -> bool>;

/// An opened counter together with its registration in the I/O loop.
struct EventFd {
    handle: Box<dyn CounterHandle>,
    loop_event: Option<EventRef>,
}

impl EventFd {
    fn new(handle: Box<dyn CounterHandle>) -> Self {
        Self {
            handle,
            loop_event: None,
        }
    }
}

/// One configured event and the counters opened for it.
pub struct EventSelection {
    group_id: usize,
    selection_id: u32,
    event_type_modifier: EventTypeAndModifier,
    event_attr: EventAttr,
    // Index `i` refers to the same (tid, cpu) in every selection of a group.
    event_fds: Vec<EventFd>,
    hotplugged_counters: Vec<CounterInfo>,
    opened: bool,
}

impl EventSelection {
    /// Position of the owning group in [`EventSelectionSet::groups`].
    pub fn group_id(&self) -> usize {
        self.group_id
    }

    /// Identifier unique in the set, never reused.
    pub fn selection_id(&self) -> u32 {
        self.selection_id
    }

    pub fn event_type_modifier(&self) -> &EventTypeAndModifier {
        &self.event_type_modifier
    }

    pub fn event_attr(&self) -> &EventAttr {
        &self.event_attr
    }

    /// Whether counters were ever opened for this selection, which freezes its attribute.
    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// `(tid, cpu)` of every counter currently open, in open order.
    pub fn targets(&self) -> impl Iterator<Item = (libc::pid_t, i32)> + '_ {
        self.event_fds
            .iter()
            .map(|it| (it.handle.tid(), it.handle.cpu()))
    }

    /// Counters saved from CPUs that went offline.
    pub fn hotplugged_counters(&self) -> &[CounterInfo] {
        &self.hotplugged_counters
    }
}

impl fmt::Debug for EventSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSelection")
            .field("group_id", &self.group_id)
            .field("selection_id", &self.selection_id)
            .field("name", &self.event_type_modifier.name)
            .field("event_fds", &self.event_fds.len())
            .field("hotplugged_counters", &self.hotplugged_counters.len())
            .field("opened", &self.opened)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpenMode {
    PerCpu,
    AnyCpu,
}

impl OpenMode {
    fn describe(self) -> &'static str {
        match self {
            Self::PerCpu => "per cpu",
            Self::AnyCpu => "for any cpu",
        }
    }
}

struct Hotplug {
    // Empty means every CPU.
    monitored_cpus: Vec<i32>,
    online_cpus: Vec<i32>,
    timer: EventRef,
}

/// Owns every event selection of a monitoring session and the counters opened for them.
///
/// The set is driven from a single thread: counters are opened and read by direct
/// calls, ring-buffers are drained and CPU hotplug is handled inside callbacks of
/// an [`IoLoop`][crate::io_loop::IoLoop] whose context is the set itself.
///
/// # Examples
///
/// ```no_run
/// use perf_event_set::config::Opts;
/// use perf_event_set::io_loop::EpollLoop;
/// use perf_event_set::EventSelectionSet;
///
/// let mut set = EventSelectionSet::new(Opts::default());
/// set.add_event_type("cpu-cycles").unwrap();
/// set.set_sample_period(0, 1_000_000).unwrap();
/// set.add_monitored_processes([std::process::id() as i32]);
/// set.open_event_files(&[]).unwrap();
/// set.mmap_event_files(1, 16).unwrap();
///
/// let mut lp = EpollLoop::new().unwrap();
/// set.prepare_to_read_mmap_event_data(&mut lp, |record| {
///     println!("{:?}", record.sample());
///     true
/// })
/// .unwrap();
/// set.handle_cpu_hotplug_events(&mut lp, &[], None).unwrap();
/// lp.run(&mut set).unwrap();
/// ```
pub struct EventSelectionSet {
    opts: Opts,
    host: Box<dyn Host>,
    resolver: Box<dyn EventResolver>,
    groups: Vec<EventSelectionGroup>,
    next_selection_id: u32,
    processes: BTreeSet<libc::pid_t>,
    threads: BTreeSet<libc::pid_t>,
    open_mode: Option<OpenMode>,
    // Data pages per ring-buffer while the event files are mapped.
    mmap_pages: Option<usize>,
    record_callback: Option<RecordCallback>,
    hotplug: Option<Hotplug>,
}

impl EventSelectionSet {
    /// A set measuring on the running kernel.
    pub fn new(opts: Opts) -> Self {
        Self::with_host(opts, LinuxHost::new(), BuiltinResolver::new())
    }

    pub fn with_host(
        opts: Opts,
        host: impl Host + 'static,
        resolver: impl EventResolver + 'static,
    ) -> Self {
        Self {
            opts,
            host: Box::new(host),
            resolver: Box::new(resolver),
            groups: vec![],
            next_selection_id: 0,
            processes: BTreeSet::new(),
            threads: BTreeSet::new(),
            open_mode: None,
            mmap_pages: None,
            record_callback: None,
            hotplug: None,
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn groups(&self) -> &[EventSelectionGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn selection(&self, selection_id: u32) -> Option<&EventSelection> {
        self.selections().find(|it| it.selection_id == selection_id)
    }

    fn selections(&self) -> impl Iterator<Item = &EventSelection> {
        self.groups.iter().flatten()
    }

    fn selections_mut(&mut self) -> impl Iterator<Item = &mut EventSelection> {
        self.groups.iter_mut().flatten()
    }

    fn event_fds_mut(&mut self) -> impl Iterator<Item = &mut EventFd> {
        self.selections_mut().flat_map(|it| it.event_fds.iter_mut())
    }

    // Adding events:

    /// Adds `name` as a group of its own.
    pub fn add_event_type(&mut self, name: &str) -> Result<u32> {
        let ids = self.add_event_group(&[name])?;
        Ok(ids[0])
    }

    /// Adds `names` as one group led by the first name, returns the selection ids.
    ///
    /// Nothing is added if any name fails.
    pub fn add_event_group<S: AsRef<str>>(&mut self, names: &[S]) -> Result<Vec<u32>> {
        if names.is_empty() {
            return Err(Error::InvalidArgument("empty event group".to_string()));
        }

        let group_id = self.groups.len();
        let mut group = EventSelectionGroup::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let name = name.as_ref();
            if group
                .iter()
                .any(|it: &EventSelection| it.event_type_modifier.name == name)
            {
                return Err(Error::DuplicateEvent(name.to_string()));
            }
            let selection_id = self.next_selection_id + i as u32;
            group.push(self.build_and_check_event_selection(name, group_id, selection_id)?);
        }

        self.next_selection_id += group.len() as u32;
        let ids = group.iter().map(|it| it.selection_id).collect();
        self.groups.push(group);
        self.union_sample_type(group_id);
        Ok(ids)
    }

    fn build_and_check_event_selection(
        &self,
        name: &str,
        group_id: usize,
        selection_id: u32,
    ) -> Result<EventSelection> {
        let event = self.resolver.resolve(name)?;

        if self.opts.for_stat_cmd
            && matches!(event.event_type.name.as_str(), "cpu-clock" | "task-clock")
            && (event.exclude_user || event.exclude_kernel)
        {
            return Err(Error::Resolution {
                name: name.to_string(),
                reason: "modifiers `u` and `k` are ignored by the kernel for cpu-clock and \
                         task-clock when counting"
                    .to_string(),
            });
        }

        let event_attr = EventAttr::from_event(&event);
        if !self.host.is_event_attr_supported(&event_attr) {
            return Err(Error::Resolution {
                name: name.to_string(),
                reason: "the kernel refused to open it".to_string(),
            });
        }

        if self.selections().any(|it| it.event_type_modifier.name == name) {
            return Err(Error::DuplicateEvent(name.to_string()));
        }

        Ok(EventSelection {
            group_id,
            selection_id,
            event_type_modifier: event,
            event_attr,
            event_fds: vec![],
            hotplugged_counters: vec![],
            opened: false,
        })
    }

    // Grouped counters share one record layout, so every member samples the union.
    fn union_sample_type(&mut self, group_id: usize) {
        let group = &mut self.groups[group_id];
        if group.iter().any(|it| it.opened) {
            return;
        }
        let sample_type = group
            .iter()
            .fold(0, |acc, it| acc | it.event_attr.sample_type);
        for selection in group {
            selection.event_attr.sample_type = sample_type;
        }
    }

    // Configuration:

    // Applies `f` to every selection, or to none if any of them is opened.
    fn update_attrs(&mut self, mut f: impl FnMut(&mut EventAttr)) -> Result<()> {
        if let Some(opened) = self.selections().find(|it| it.opened) {
            return Err(Error::AlreadyOpened(opened.selection_id));
        }
        for selection in self.selections_mut() {
            f(&mut selection.event_attr);
        }
        Ok(())
    }

    fn update_attr(&mut self, selection_id: u32, f: impl FnOnce(&mut EventAttr)) -> Result<()> {
        let selection = self
            .selections_mut()
            .find(|it| it.selection_id == selection_id)
            .ok_or(Error::UnknownSelection(selection_id))?;
        if selection.opened {
            return Err(Error::AlreadyOpened(selection_id));
        }
        f(&mut selection.event_attr);
        Ok(())
    }

    /// Starts counting on the next `exec` of the monitored targets.
    ///
    /// Counters enabled on exec start disabled.
    pub fn set_enable_on_exec(&mut self, enable: bool) -> Result<()> {
        self.update_attrs(|attr| {
            attr.enable_on_exec = enable;
            attr.disabled = enable;
        })
    }

    /// Whether every selection is enabled on exec.
    pub fn enable_on_exec(&self) -> bool {
        !self.is_empty() && self.selections().all(|it| it.event_attr.enable_on_exec)
    }

    /// Adds pid, tid, time and cpu to every non-sample record.
    pub fn sample_id_all(&mut self) -> Result<()> {
        self.update_attrs(|attr| attr.sample_id_all = true)
    }

    /// Samples `selection_id` at `freq` Hz, replacing any sample period.
    pub fn set_sample_freq(&mut self, selection_id: u32, freq: u64) -> Result<()> {
        self.update_attr(selection_id, |attr| attr.sample_on = SampleOn::Freq(freq))
    }

    /// Samples `selection_id` every `period` events, replacing any sample frequency.
    pub fn set_sample_period(&mut self, selection_id: u32, period: u64) -> Result<()> {
        self.update_attr(selection_id, |attr| attr.sample_on = SampleOn::Period(period))
    }

    /// Records the taken branches matching `branch_sample_type` (`PERF_SAMPLE_BRANCH_*`).
    ///
    /// Zero leaves the configuration untouched.
    pub fn set_branch_sampling(&mut self, branch_sample_type: u64) -> Result<()> {
        if branch_sample_type == 0 {
            return Ok(());
        }
        if branch_sample_type & BRANCH_SAMPLE_TYPE_MASK == 0 {
            return Err(Error::UnsupportedConfiguration(format!(
                "branch sample type {:#x} selects no branch kind",
                branch_sample_type
            )));
        }
        if !self.host.is_branch_sampling_supported() {
            return Err(Error::UnsupportedConfiguration(
                "branch sampling is not supported on this machine".to_string(),
            ));
        }
        self.update_attrs(|attr| {
            attr.sample_type |= b::PERF_SAMPLE_BRANCH_STACK;
            attr.branch_sample_type = branch_sample_type;
        })
    }

    /// Samples call chains by walking frame pointers.
    pub fn enable_fp_call_chain_sampling(&mut self) -> Result<()> {
        self.update_attrs(|attr| {
            attr.sample_type |= b::PERF_SAMPLE_CALLCHAIN;
            attr.sample_type &= !(b::PERF_SAMPLE_REGS_USER | b::PERF_SAMPLE_STACK_USER);
            attr.exclude_callchain_user = false;
            attr.sample_regs_user = 0;
            attr.sample_stack_user = 0;
        })
    }

    /// Samples user registers and `dump_stack_size` bytes of user stack for
    /// offline Dwarf unwinding, kernel call chains are still walked by the kernel.
    pub fn enable_dwarf_call_chain_sampling(&mut self, dump_stack_size: u32) -> Result<()> {
        if dump_stack_size == 0
            || dump_stack_size % 8 != 0
            || dump_stack_size > MAX_DUMP_STACK_SIZE
        {
            return Err(Error::InvalidArgument(format!(
                "stack dump size {} must be a non-zero multiple of 8 not above {}",
                dump_stack_size, MAX_DUMP_STACK_SIZE
            )));
        }
        if !self.host.is_dwarf_call_chain_sampling_supported() {
            return Err(Error::UnsupportedConfiguration(
                "dwarf call chain sampling is not supported on this machine".to_string(),
            ));
        }
        let reg_mask = supported_reg_mask();
        self.update_attrs(|attr| {
            attr.sample_type |=
                b::PERF_SAMPLE_CALLCHAIN | b::PERF_SAMPLE_REGS_USER | b::PERF_SAMPLE_STACK_USER;
            attr.exclude_callchain_user = true;
            attr.sample_regs_user = reg_mask;
            attr.sample_stack_user = dump_stack_size;
        })
    }

    /// Lets threads created after open inherit the counters.
    pub fn set_inherit(&mut self, enable: bool) -> Result<()> {
        self.update_attrs(|attr| attr.inherit = enable)
    }

    /// Wakes the I/O loop up on every record.
    pub fn set_low_watermark(&mut self) -> Result<()> {
        self.update_attrs(|attr| attr.wakeup_events = 1)
    }

    // Targets:

    /// Monitors every thread of `pids`, expanded when the event files are opened.
    pub fn add_monitored_processes(&mut self, pids: impl IntoIterator<Item = libc::pid_t>) {
        self.processes.extend(pids);
    }

    pub fn add_monitored_threads(&mut self, tids: impl IntoIterator<Item = libc::pid_t>) {
        self.threads.extend(tids);
    }

    pub fn monitored_processes(&self) -> &BTreeSet<libc::pid_t> {
        &self.processes
    }

    pub fn monitored_threads(&self) -> &BTreeSet<libc::pid_t> {
        &self.threads
    }

    /// Without a monitored target the counters measure the whole system.
    pub fn has_monitored_target(&self) -> bool {
        !self.processes.is_empty() || !self.threads.is_empty()
    }

    // Current threads of all targets, or `[-1]` (all threads) without targets.
    fn monitored_tids(&self) -> Result<Vec<libc::pid_t>> {
        if !self.has_monitored_target() {
            return Ok(vec![-1]);
        }
        let mut tids = vec![];
        for &pid in &self.processes {
            for tid in self.host.threads_of_process(pid)? {
                if !tids.contains(&tid) {
                    tids.push(tid);
                }
            }
        }
        for &tid in &self.threads {
            if !tids.contains(&tid) {
                tids.push(tid);
            }
        }
        Ok(tids)
    }

    // Number of counters and opened flag of every selection.
    fn fd_snapshot(&self) -> Vec<(usize, bool)> {
        self.selections()
            .map(|it| (it.event_fds.len(), it.opened))
            .collect()
    }

    // Closes every counter opened after `snapshot` was taken.
    fn rollback_to(&mut self, snapshot: &[(usize, bool)]) {
        for (selection, &(len, opened)) in self.selections_mut().zip(snapshot) {
            selection.event_fds.truncate(len);
            selection.opened = opened;
        }
    }
}
