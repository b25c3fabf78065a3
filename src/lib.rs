//! Event selection and counter lifecycle on top of the `perf_event_open` system call.
//!
//! An [`EventSelectionSet`] owns groups of configured events, opens one counter per
//! event, monitored thread and CPU, reads them back, drains their ring-buffers inside
//! a single-threaded I/O loop and follows CPUs going offline and online.
//!
//! ## Example
//!
//! Count cycles and instructions as one group on every online CPU, system-wide.
//!
//! ```no_run
//! use perf_event_set::config::Opts;
//! use perf_event_set::EventSelectionSet;
//!
//! let mut set = EventSelectionSet::new(Opts {
//!     for_stat_cmd: true,
//!     ..Default::default()
//! });
//! set.add_event_group(&["cpu-cycles", "instructions"]).unwrap();
//! set.open_event_files(&[]).unwrap();
//!
//! std::thread::sleep(std::time::Duration::from_secs(1));
//!
//! for info in set.read_counters().unwrap() {
//!     let name = &info.selection.event_type_modifier().name;
//!     println!("{}: {}", name, info.scaled_sum());
//! }
//! ```
//!
//! ## Collaborators
//!
//! The set reaches the machine through the [`host::Host`] trait, resolves event names
//! with an [`event::EventResolver`] and plugs into an [`io_loop::IoLoop`]. Each comes
//! with a Linux implementation: [`host::LinuxHost`], [`event::BuiltinResolver`] and
//! [`io_loop::EpollLoop`].

pub mod config;
pub mod count;
mod error;
pub mod event;
mod ffi;
pub mod handle;
pub mod host;
pub mod io_loop;
pub mod sample;
mod set;

pub use error::{Error, Result};
pub use host::{is_branch_sampling_supported, is_dwarf_call_chain_sampling_supported};
pub use set::{EventSelection, EventSelectionGroup, EventSelectionSet, MAX_DUMP_STACK_SIZE};
