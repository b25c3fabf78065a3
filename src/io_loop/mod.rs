//! The single-threaded event loop the event selection set plugs into.
//!
//! The set never blocks and never spawns threads: it registers ring-buffer
//! descriptors and a hotplug timer with an [`IoLoop`] and does its work inside
//! the callbacks, on the thread driving the loop.

use std::io::Result;
use std::os::fd::RawFd;
use std::time::Duration;

mod epoll;

pub use epoll::EpollLoop;

/// Callback invoked by the loop with the loop context and the loop itself,
/// so that it can add or remove events while being dispatched.
///
/// Returning `false` asks the loop to stop.
pub type LoopCallback<C> = Box<dyn FnMut(&mut C, &mut dyn IoLoop<C>) -> bool>;

/// Handle of a registered event, used to remove it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventRef(pub u64);

pub trait IoLoop<C> {
    /// Calls `callback` every time `fd` becomes readable.
    fn add_read_event(&mut self, fd: RawFd, callback: LoopCallback<C>) -> Result<EventRef>;

    /// Calls `callback` every `interval`.
    fn add_periodic_event(&mut self, interval: Duration, callback: LoopCallback<C>)
        -> Result<EventRef>;

    /// Removes an event; its callback is never called again.
    fn del_event(&mut self, event: EventRef) -> Result<()>;
}
