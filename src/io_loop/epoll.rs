use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Error, ErrorKind, Result};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use log::warn;

use super::{EventRef, IoLoop, LoopCallback};
use crate::ffi::syscall::{
    epoll_create1, epoll_ctl, epoll_wait, read, timerfd_create, timerfd_settime_periodic,
};

const MAX_EVENTS_PER_WAIT: usize = 64;

struct Entry<C> {
    fd: RawFd,
    // Owned timer descriptor of a periodic event.
    timer: Option<File>,
    // Taken out while the callback runs.
    callback: Option<LoopCallback<C>>,
}

/// An [`IoLoop`] backed by `epoll(7)` and `timerfd_create(2)`.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use perf_event_set::io_loop::{EpollLoop, IoLoop};
///
/// let mut ticks = 0;
/// let mut lp = EpollLoop::new().unwrap();
/// lp.add_periodic_event(
///     Duration::from_millis(10),
///     Box::new(|ticks: &mut i32, _: &mut dyn IoLoop<i32>| {
///         *ticks += 1;
///         *ticks < 3
///     }),
/// )
/// .unwrap();
/// lp.run(&mut ticks).unwrap();
/// assert_eq!(ticks, 3);
/// ```
pub struct EpollLoop<C> {
    epoll: File,
    events: BTreeMap<u64, Entry<C>>,
    next_token: u64,
    exit: bool,
}

impl<C> EpollLoop<C> {
    pub fn new() -> Result<Self> {
        Ok(Self {
            epoll: epoll_create1(libc::EPOLL_CLOEXEC)?,
            events: BTreeMap::new(),
            next_token: 0,
            exit: false,
        })
    }

    /// Dispatches events until a callback returns `false`, [`exit_loop`][Self::exit_loop]
    /// is called, or no event is left.
    pub fn run(&mut self, ctx: &mut C) -> Result<()> {
        self.exit = false;
        let mut ready = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS_PER_WAIT];

        while !self.exit && !self.events.is_empty() {
            let tokens: Vec<u64> = match epoll_wait(&self.epoll, &mut ready, -1) {
                Ok(events) => events.iter().map(|it| it.u64).collect(),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            for token in tokens {
                if self.exit {
                    break;
                }
                self.dispatch(token, ctx);
            }
        }
        Ok(())
    }

    /// Stops [`run`][Self::run] after the current dispatch.
    pub fn exit_loop(&mut self) {
        self.exit = true;
    }

    fn dispatch(&mut self, token: u64, ctx: &mut C) {
        // The event may have been removed by an earlier callback of the same wait.
        let Some(entry) = self.events.get_mut(&token) else {
            return;
        };
        if let Some(timer) = &entry.timer {
            // Acknowledge the expirations, the count itself is not needed.
            let mut expirations = [0; 8];
            match read(timer, &mut expirations) {
                Err(e) if e.kind() != ErrorKind::WouldBlock => {
                    warn!("failed to acknowledge timer fd {}: {}", entry.fd, e)
                }
                _ => {}
            }
        }
        let Some(mut callback) = entry.callback.take() else {
            return;
        };

        let keep_going = callback(ctx, self);

        if let Some(entry) = self.events.get_mut(&token) {
            entry.callback = Some(callback);
        }
        if !keep_going {
            self.exit = true;
        }
    }

    fn register(
        &mut self,
        fd: RawFd,
        timer: Option<File>,
        callback: LoopCallback<C>,
    ) -> Result<EventRef> {
        let token = self.next_token;
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as _,
            u64: token,
        };
        epoll_ctl(&self.epoll, libc::EPOLL_CTL_ADD, fd, &mut event)?;

        self.next_token += 1;
        let entry = Entry {
            fd,
            timer,
            callback: Some(callback),
        };
        self.events.insert(token, entry);
        Ok(EventRef(token))
    }
}

impl<C> IoLoop<C> for EpollLoop<C> {
    fn add_read_event(&mut self, fd: RawFd, callback: LoopCallback<C>) -> Result<EventRef> {
        self.register(fd, None, callback)
    }

    fn add_periodic_event(
        &mut self,
        interval: Duration,
        callback: LoopCallback<C>,
    ) -> Result<EventRef> {
        if interval.is_zero() {
            // A zero interval would disarm the timer.
            return Err(Error::new(ErrorKind::InvalidInput, "zero timer interval"));
        }
        let timer = timerfd_create(libc::TFD_NONBLOCK | libc::TFD_CLOEXEC)?;
        timerfd_settime_periodic(&timer, interval)?;
        let fd = timer.as_raw_fd();
        self.register(fd, Some(timer), callback)
    }

    fn del_event(&mut self, event: EventRef) -> Result<()> {
        let Some(entry) = self.events.remove(&event.0) else {
            return Ok(());
        };
        let mut unused = libc::epoll_event { events: 0, u64: 0 };
        match epoll_ctl(&self.epoll, libc::EPOLL_CTL_DEL, entry.fd, &mut unused) {
            // A closed descriptor has already left the epoll set, its number may be reused.
            Err(e) if matches!(e.raw_os_error(), Some(libc::EBADF | libc::ENOENT)) => Ok(()),
            result => result,
        }
    }
}
