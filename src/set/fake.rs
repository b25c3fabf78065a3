//! In-memory machine and loop to drive an [`EventSelectionSet`] in tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Error, ErrorKind, Result};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use super::EventSelectionSet;
use crate::config::{EventAttr, Opts};
use crate::count::Counter;
use crate::event::tp::Tracefs;
use crate::event::BuiltinResolver;
use crate::handle::CounterHandle;
use crate::host::Host;
use crate::io_loop::{EventRef, IoLoop, LoopCallback};

#[derive(Default)]
pub struct Buffer {
    pub counter: Counter,
    pub mapped_pages: Option<usize>,
    pub pending: Vec<u8>,
}

/// A counter the fake host opened.
pub struct Opened {
    pub attr: EventAttr,
    pub tid: libc::pid_t,
    pub cpu: i32,
    pub group_fd: Option<RawFd>,
    pub fd: RawFd,
}

#[derive(Default)]
pub struct Machine {
    pub online_cpus: Vec<i32>,
    pub threads: BTreeMap<libc::pid_t, Vec<libc::pid_t>>,
    /// Opening a counter for this (tid, cpu) fails.
    pub fail_open: Option<(libc::pid_t, i32)>,
    /// Mapping more data pages than this fails.
    pub max_mmap_pages: usize,
    pub branch_sampling: bool,
    pub dwarf_call_chain: bool,
    /// (type, config) pairs the kernel refuses.
    pub unsupported: Vec<(u32, u64)>,
    pub opened: Vec<Opened>,
    /// Buffers of the counters not closed yet.
    pub live: BTreeMap<RawFd, Rc<RefCell<Buffer>>>,
    next_fd: RawFd,
}

/// A [`Host`] whose state stays reachable from the test after it is moved into the set.
#[derive(Clone)]
pub struct FakeHost(pub Rc<RefCell<Machine>>);

impl FakeHost {
    pub fn new(online_cpus: &[i32]) -> Self {
        let machine = Machine {
            online_cpus: online_cpus.to_vec(),
            max_mmap_pages: usize::MAX,
            branch_sampling: true,
            dwarf_call_chain: true,
            next_fd: 100,
            ..Default::default()
        };
        Self(Rc::new(RefCell::new(machine)))
    }

    pub fn set_online_cpus(&self, cpus: &[i32]) {
        self.0.borrow_mut().online_cpus = cpus.to_vec();
    }

    /// Number of counters currently open.
    pub fn live(&self) -> usize {
        self.0.borrow().live.len()
    }

    /// Descriptors of the open counters on `cpu`.
    pub fn fds_on(&self, cpu: i32) -> Vec<RawFd> {
        let machine = self.0.borrow();
        machine
            .opened
            .iter()
            .filter(|it| it.cpu == cpu && machine.live.contains_key(&it.fd))
            .map(|it| it.fd)
            .collect()
    }

    pub fn buffer(&self, fd: RawFd) -> Rc<RefCell<Buffer>> {
        self.0.borrow().live[&fd].clone()
    }

    /// Makes the kernel write `bytes` into the ring-buffer of `fd`.
    pub fn write(&self, fd: RawFd, bytes: &[u8]) {
        self.buffer(fd).borrow_mut().pending.extend(bytes);
    }
}

impl Host for FakeHost {
    fn open_counter(
        &mut self,
        attr: &EventAttr,
        tid: libc::pid_t,
        cpu: i32,
        group_fd: Option<RawFd>,
    ) -> Result<Box<dyn CounterHandle>> {
        let mut machine = self.0.borrow_mut();
        if machine.fail_open == Some((tid, cpu)) {
            return Err(Error::from_raw_os_error(libc::EMFILE));
        }

        let fd = machine.next_fd;
        machine.next_fd += 1;
        let buffer = Rc::new(RefCell::new(Buffer::default()));
        machine.live.insert(fd, buffer.clone());
        machine.opened.push(Opened {
            attr: attr.clone(),
            tid,
            cpu,
            group_fd,
            fd,
        });

        Ok(Box::new(FakeHandle {
            tid,
            cpu,
            fd,
            buffer,
            machine: self.0.clone(),
        }))
    }

    fn online_cpus(&self) -> Result<Vec<i32>> {
        Ok(self.0.borrow().online_cpus.clone())
    }

    fn threads_of_process(&self, pid: libc::pid_t) -> Result<Vec<libc::pid_t>> {
        self.0
            .borrow()
            .threads
            .get(&pid)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such process"))
    }

    fn is_event_attr_supported(&self, attr: &EventAttr) -> bool {
        !self.0.borrow().unsupported.contains(&(attr.ty, attr.config))
    }

    fn is_branch_sampling_supported(&self) -> bool {
        self.0.borrow().branch_sampling
    }

    fn is_dwarf_call_chain_sampling_supported(&self) -> bool {
        self.0.borrow().dwarf_call_chain
    }
}

pub struct FakeHandle {
    tid: libc::pid_t,
    cpu: i32,
    fd: RawFd,
    buffer: Rc<RefCell<Buffer>>,
    machine: Rc<RefCell<Machine>>,
}

impl CounterHandle for FakeHandle {
    fn tid(&self) -> libc::pid_t {
        self.tid
    }

    fn cpu(&self) -> i32 {
        self.cpu
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn read_counter(&self) -> Result<Counter> {
        Ok(self.buffer.borrow().counter)
    }

    fn mmap(&mut self, pages: usize) -> Result<()> {
        if pages > self.machine.borrow().max_mmap_pages {
            return Err(Error::from_raw_os_error(libc::ENOMEM));
        }
        self.buffer.borrow_mut().mapped_pages = Some(pages);
        Ok(())
    }

    fn has_mapped_buffer(&self) -> bool {
        self.buffer.borrow().mapped_pages.is_some()
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> usize {
        let mut buffer = self.buffer.borrow_mut();
        if buffer.mapped_pages.is_none() {
            return 0;
        }
        let len = buffer.pending.len();
        out.append(&mut buffer.pending);
        len
    }

    fn unmap(&mut self) {
        self.buffer.borrow_mut().mapped_pages = None;
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.machine.borrow_mut().live.remove(&self.fd);
    }
}

enum Trigger {
    Read(RawFd),
    Periodic(Duration),
}

/// An [`IoLoop`] whose events fire only when the test says so.
pub struct ManualLoop<C> {
    events: BTreeMap<u64, (Trigger, Option<LoopCallback<C>>)>,
    next_token: u64,
}

impl<C> ManualLoop<C> {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_token: 0,
        }
    }

    /// Descriptors registered for readiness.
    pub fn read_fds(&self) -> Vec<RawFd> {
        self.events
            .values()
            .filter_map(|(trigger, _)| match trigger {
                Trigger::Read(fd) => Some(*fd),
                Trigger::Periodic(_) => None,
            })
            .collect()
    }

    pub fn intervals(&self) -> Vec<Duration> {
        self.events
            .values()
            .filter_map(|(trigger, _)| match trigger {
                Trigger::Periodic(interval) => Some(*interval),
                Trigger::Read(_) => None,
            })
            .collect()
    }

    /// Reports `fd` readable, returns what its callback returned.
    pub fn ready(&mut self, ctx: &mut C, fd: RawFd) -> bool {
        let token = self
            .events
            .iter()
            .find(|(_, (trigger, _))| matches!(trigger, Trigger::Read(it) if *it == fd))
            .map(|(token, _)| *token);
        match token {
            Some(token) => self.dispatch(token, ctx),
            None => panic!("fd {} is not registered", fd),
        }
    }

    /// Fires every periodic event once.
    pub fn tick(&mut self, ctx: &mut C) -> bool {
        let tokens: Vec<u64> = self
            .events
            .iter()
            .filter(|(_, (trigger, _))| matches!(trigger, Trigger::Periodic(_)))
            .map(|(token, _)| *token)
            .collect();
        tokens
            .into_iter()
            .fold(true, |acc, token| self.dispatch(token, ctx) && acc)
    }

    fn dispatch(&mut self, token: u64, ctx: &mut C) -> bool {
        let Some(mut callback) = self.events.get_mut(&token).and_then(|it| it.1.take()) else {
            return true;
        };
        let keep_going = callback(ctx, self);
        if let Some(entry) = self.events.get_mut(&token) {
            entry.1 = Some(callback);
        }
        keep_going
    }

    fn add(&mut self, trigger: Trigger, callback: LoopCallback<C>) -> EventRef {
        let token = self.next_token;
        self.next_token += 1;
        self.events.insert(token, (trigger, Some(callback)));
        EventRef(token)
    }
}

impl<C> IoLoop<C> for ManualLoop<C> {
    fn add_read_event(&mut self, fd: RawFd, callback: LoopCallback<C>) -> Result<EventRef> {
        Ok(self.add(Trigger::Read(fd), callback))
    }

    fn add_periodic_event(
        &mut self,
        interval: Duration,
        callback: LoopCallback<C>,
    ) -> Result<EventRef> {
        Ok(self.add(Trigger::Periodic(interval), callback))
    }

    fn del_event(&mut self, event: EventRef) -> Result<()> {
        self.events.remove(&event.0);
        Ok(())
    }
}

/// A set on a fake machine with `online_cpus`.
pub fn new_set(opts: Opts, online_cpus: &[i32]) -> (EventSelectionSet, FakeHost) {
    let host = FakeHost::new(online_cpus);
    // Tracepoints are never found.
    let resolver = BuiltinResolver::with_tracefs(Tracefs::at("/nonexistent"));
    let set = EventSelectionSet::with_host(opts, host.clone(), resolver);
    (set, host)
}
