use crate::set::EventSelection;

mod stat;

pub use stat::*;

/// Aggregated counter value attributed to one thread on one CPU.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterInfo {
    /// Thread id, -1 for all threads.
    pub tid: libc::pid_t,
    /// CPU, -1 for any CPU.
    pub cpu: i32,
    pub counter: Counter,
}

/// Counters read from one event selection.
#[derive(Clone, Debug)]
pub struct CountersInfo<'a> {
    /// The selection the counters were read from.
    pub selection: &'a EventSelection,
    pub counters: Vec<CounterInfo>,
}

impl CountersInfo<'_> {
    /// Sum of all counter values, scaled by `time_enabled / time_running`
    /// when the counters were multiplexed.
    pub fn scaled_sum(&self) -> u64 {
        self.counters
            .iter()
            .map(|it| it.counter.scaled_value())
            .sum()
    }
}
