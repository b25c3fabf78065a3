use std::fs;
use std::path::{Path, PathBuf};

use super::EventType;
use crate::ffi::bindings as b;

const TRACEFS_ROOTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Tracing filesystem used to look up tracepoint ids.
#[derive(Clone, Debug, Default)]
pub struct Tracefs {
    root: Option<PathBuf>,
}

impl Tracefs {
    /// Uses `root` instead of probing the usual mount points.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Looks up `<system>:<event>`, e.g. `sched:sched_switch`.
    pub fn find(&self, name: &str) -> Option<EventType> {
        let (system, event) = name.split_once(':')?;
        if system.is_empty() || event.is_empty() || event.contains(':') {
            return None;
        }
        let id = match &self.root {
            Some(root) => read_id(root, system, event),
            None => TRACEFS_ROOTS
                .iter()
                .find_map(|root| read_id(Path::new(root), system, event)),
        }?;
        Some(EventType::new(name, b::PERF_TYPE_TRACEPOINT, id))
    }
}

fn read_id(root: &Path, system: &str, event: &str) -> Option<u64> {
    let path = root.join("events").join(system).join(event).join("id");
    let text = fs::read_to_string(path).ok()?;
    text.trim().parse().ok()
}
