use super::EventType;
use crate::ffi::bindings as b;

#[rustfmt::skip]
const HARDWARE: [(&str, u64); 10] = [
    ("cpu-cycles",              b::PERF_COUNT_HW_CPU_CYCLES),
    ("instructions",            b::PERF_COUNT_HW_INSTRUCTIONS),
    ("cache-references",        b::PERF_COUNT_HW_CACHE_REFERENCES),
    ("cache-misses",            b::PERF_COUNT_HW_CACHE_MISSES),
    ("branch-instructions",     b::PERF_COUNT_HW_BRANCH_INSTRUCTIONS),
    ("branch-misses",           b::PERF_COUNT_HW_BRANCH_MISSES),
    ("bus-cycles",              b::PERF_COUNT_HW_BUS_CYCLES),
    ("stalled-cycles-frontend", b::PERF_COUNT_HW_STALLED_CYCLES_FRONTEND),
    ("stalled-cycles-backend",  b::PERF_COUNT_HW_STALLED_CYCLES_BACKEND),
    ("ref-cpu-cycles",          b::PERF_COUNT_HW_REF_CPU_CYCLES),
];

#[rustfmt::skip]
const CACHE: [(&str, u64); 7] = [
    ("L1-dcache", b::PERF_COUNT_HW_CACHE_L1D),
    ("L1-icache", b::PERF_COUNT_HW_CACHE_L1I),
    ("LLC",       b::PERF_COUNT_HW_CACHE_LL),
    ("dTLB",      b::PERF_COUNT_HW_CACHE_DTLB),
    ("iTLB",      b::PERF_COUNT_HW_CACHE_ITLB),
    ("branch",    b::PERF_COUNT_HW_CACHE_BPU),
    ("node",      b::PERF_COUNT_HW_CACHE_NODE),
];

#[rustfmt::skip]
const CACHE_OP: [(&str, u64); 3] = [
    ("load",     b::PERF_COUNT_HW_CACHE_OP_READ),
    ("store",    b::PERF_COUNT_HW_CACHE_OP_WRITE),
    ("prefetch", b::PERF_COUNT_HW_CACHE_OP_PREFETCH),
];

pub(super) fn find(name: &str) -> Option<EventType> {
    HARDWARE
        .iter()
        .find(|(it, _)| *it == name)
        .map(|&(name, config)| EventType::new(name, b::PERF_TYPE_HARDWARE, config))
}

// Cache events are spelled like `perf list` does: `L1-dcache-loads`,
// `LLC-store-misses`, `dTLB-prefetches`.
pub(super) fn find_cache(name: &str) -> Option<EventType> {
    let (id, rest) = CACHE.iter().find_map(|&(cache, id)| {
        let rest = name.strip_prefix(cache)?.strip_prefix('-')?;
        Some((id, rest))
    })?;

    let (op, result) = CACHE_OP.iter().find_map(|&(op, op_id)| {
        let rest = rest.strip_prefix(op)?;
        match rest {
            "s" | "es" => Some((op_id, b::PERF_COUNT_HW_CACHE_RESULT_ACCESS)),
            "-misses" => Some((op_id, b::PERF_COUNT_HW_CACHE_RESULT_MISS)),
            _ => None,
        }
    })?;

    let config = id | (op << 8) | (result << 16);
    Some(EventType::new(name, b::PERF_TYPE_HW_CACHE, config))
}
