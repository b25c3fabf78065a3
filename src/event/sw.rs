use super::EventType;
use crate::ffi::bindings as b;

#[rustfmt::skip]
const SOFTWARE: [(&str, u64); 10] = [
    ("cpu-clock",        b::PERF_COUNT_SW_CPU_CLOCK),
    ("task-clock",       b::PERF_COUNT_SW_TASK_CLOCK),
    ("page-faults",      b::PERF_COUNT_SW_PAGE_FAULTS),
    ("context-switches", b::PERF_COUNT_SW_CONTEXT_SWITCHES),
    ("cpu-migrations",   b::PERF_COUNT_SW_CPU_MIGRATIONS),
    ("minor-faults",     b::PERF_COUNT_SW_PAGE_FAULTS_MIN),
    ("major-faults",     b::PERF_COUNT_SW_PAGE_FAULTS_MAJ),
    ("alignment-faults", b::PERF_COUNT_SW_ALIGNMENT_FAULTS),
    ("emulation-faults", b::PERF_COUNT_SW_EMULATION_FAULTS),
    ("dummy",            b::PERF_COUNT_SW_DUMMY),
];

pub(super) fn find(name: &str) -> Option<EventType> {
    SOFTWARE
        .iter()
        .find(|(it, _)| *it == name)
        .map(|&(name, config)| EventType::new(name, b::PERF_TYPE_SOFTWARE, config))
}
