//! Event name resolution.
//!
//! An event is spelled as `<name>[:<modifiers>]`, e.g. `cpu-cycles`,
//! `instructions:u` or `sched:sched_switch`. The name part is looked up by an
//! [`EventResolver`], the modifiers are parsed here.

#[cfg(test)]
mod test;

pub mod hw;
pub mod raw;
pub mod sw;
pub mod tp;

use crate::error::{Error, Result};
use crate::ffi::bindings as b;

/// A resolved event: the kernel event type and config.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventType {
    pub name: String,
    pub ty: u32,
    pub config: u64,
}

impl EventType {
    pub fn new(name: impl Into<String>, ty: u32, config: u64) -> Self {
        Self {
            name: name.into(),
            ty,
            config,
        }
    }

    pub fn is_tracepoint(&self) -> bool {
        self.ty == b::PERF_TYPE_TRACEPOINT
    }
}

/// An event type together with the modifiers it was requested with.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventTypeAndModifier {
    /// The name as it was requested, modifiers included.
    pub name: String,
    pub event_type: EventType,
    pub exclude_user: bool,
    pub exclude_kernel: bool,
    pub exclude_hv: bool,
    pub exclude_host: bool,
    pub exclude_guest: bool,
    pub precise_ip: u8,
}

impl EventTypeAndModifier {
    fn unmodified(name: &str, event_type: EventType) -> Self {
        Self {
            name: name.to_string(),
            event_type,
            exclude_user: false,
            exclude_kernel: false,
            exclude_hv: false,
            exclude_host: false,
            exclude_guest: false,
            precise_ip: 0,
        }
    }

    // Same semantics as `perf`: any of `u`, `k`, `h` restricts counting to the
    // listed privilege levels, `G`/`H` exclude host/guest, each `p` raises
    // the precise ip level.
    fn apply_modifiers(&mut self, modifiers: &str) -> Result<()> {
        if modifiers.contains(['u', 'k', 'h']) {
            self.exclude_user = !modifiers.contains('u');
            self.exclude_kernel = !modifiers.contains('k');
            self.exclude_hv = !modifiers.contains('h');
        }
        for c in modifiers.chars() {
            match c {
                'u' | 'k' | 'h' => (),
                'G' => self.exclude_host = true,
                'H' => self.exclude_guest = true,
                'p' if self.precise_ip < 3 => self.precise_ip += 1,
                'p' => return Err(invalid(&self.name, "precise level is at most 3 (`ppp`)")),
                c => return Err(invalid(&self.name, &format!("unknown modifier `{}`", c))),
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::Resolution {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Maps event names to event types.
pub trait EventResolver {
    /// Looks up an event by its bare name (no modifiers).
    fn find_event_type(&self, name: &str) -> Option<EventType>;

    /// Resolves a full event spelling, modifiers included.
    fn resolve(&self, name: &str) -> Result<EventTypeAndModifier> {
        // Tracepoint names contain ':' too, so the whole name wins.
        if let Some(event_type) = self.find_event_type(name) {
            return Ok(EventTypeAndModifier::unmodified(name, event_type));
        }
        let Some((bare, modifiers)) = name.rsplit_once(':') else {
            return Err(invalid(name, "unknown event type"));
        };
        let Some(event_type) = self.find_event_type(bare) else {
            return Err(invalid(name, "unknown event type"));
        };
        let mut resolved = EventTypeAndModifier::unmodified(name, event_type);
        resolved.apply_modifiers(modifiers)?;
        Ok(resolved)
    }
}

/// Resolves hardware, cache, software, raw (`r<hex>`) and tracepoint events.
#[derive(Clone, Debug, Default)]
pub struct BuiltinResolver {
    tracefs: tp::Tracefs,
}

impl BuiltinResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `tracefs` as the tracing filesystem root for tracepoint ids.
    pub fn with_tracefs(tracefs: tp::Tracefs) -> Self {
        Self { tracefs }
    }
}

impl EventResolver for BuiltinResolver {
    fn find_event_type(&self, name: &str) -> Option<EventType> {
        hw::find(name)
            .or_else(|| hw::find_cache(name))
            .or_else(|| sw::find(name))
            .or_else(|| raw::parse(name))
            .or_else(|| self.tracefs.find(name))
    }
}
