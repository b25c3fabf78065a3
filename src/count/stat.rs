use crate::ffi::bindings as b;

/// Aggregated value of one counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Counter {
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub id: u64,
}

impl Counter {
    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
    // struct read_format {
    //     u64 value;
    //     { u64 time_enabled; } && PERF_FORMAT_TOTAL_TIME_ENABLED
    //     { u64 time_running; } && PERF_FORMAT_TOTAL_TIME_RUNNING
    //     { u64 id;           } && PERF_FORMAT_ID
    // } && !PERF_FORMAT_GROUP
    /// Parses the bytes returned by `read(2)` on a perf event file.
    ///
    /// Returns `None` if `buf` is shorter than `read_format` requires.
    pub fn from_bytes(buf: &[u8], read_format: u64) -> Option<Self> {
        let mut words = buf
            .chunks_exact(size_of::<u64>())
            .map(|it| u64::from_ne_bytes(it.try_into().unwrap_or_default()));

        macro_rules! when {
            ($flag:ident) => {
                match read_format & b::$flag > 0 {
                    true => words.next()?,
                    false => 0,
                }
            };
        }

        let value = words.next()?;
        let time_enabled = when!(PERF_FORMAT_TOTAL_TIME_ENABLED);
        let time_running = when!(PERF_FORMAT_TOTAL_TIME_RUNNING);
        let id = when!(PERF_FORMAT_ID);

        Some(Self {
            value,
            time_enabled,
            time_running,
            id,
        })
    }

    /// Size of the `read(2)` buffer for `read_format`.
    pub fn read_buf_size(read_format: u64) -> usize {
        let flags = [
            b::PERF_FORMAT_TOTAL_TIME_ENABLED,
            b::PERF_FORMAT_TOTAL_TIME_RUNNING,
            b::PERF_FORMAT_ID,
        ];
        let extra = flags.iter().filter(|&&it| read_format & it > 0).count();
        (1 + extra) * size_of::<u64>()
    }

    /// The value extrapolated to the whole enabled time.
    pub fn scaled_value(&self) -> u64 {
        if self.time_running == 0 || self.time_running >= self.time_enabled {
            return self.value;
        }
        let scaled = self.value as u128 * self.time_enabled as u128 / self.time_running as u128;
        scaled.min(u64::MAX as u128) as u64
    }
}
