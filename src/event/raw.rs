use super::EventType;
use crate::ffi::bindings as b;

/// Parses a raw implementation-specific event spelled `r<hex config>`, e.g. `r1b0`.
pub(super) fn parse(name: &str) -> Option<EventType> {
    let hex = name.strip_prefix('r')?;
    if hex.is_empty() || hex.len() > 16 {
        return None;
    }
    let config = u64::from_str_radix(hex, 16).ok()?;
    Some(EventType::new(name, b::PERF_TYPE_RAW, config))
}
