use std::sync::atomic::{AtomicU64, Ordering};

/// View over the data area of a perf ring-buffer.
///
/// `head` and `tail` are free-running byte offsets, the data area size is a
/// power of two so they are reduced modulo its length.
pub(crate) struct Rb<'a> {
    data: &'a [u8],
    tail: &'a AtomicU64,
    head: &'a AtomicU64,
}

impl<'a> Rb<'a> {
    pub fn new(data: &'a [u8], tail: &'a AtomicU64, head: &'a AtomicU64) -> Self {
        Self { data, tail, head }
    }

    /// Appends every byte written since the last call to `out` and releases
    /// the space to the kernel. Returns the number of bytes copied.
    pub fn read_available(&self, out: &mut Vec<u8>) -> usize {
        let size = self.data.len() as u64;
        if size == 0 {
            return 0;
        }

        // Only the reader moves the tail.
        let tail = self.tail.load(Ordering::Relaxed);
        // About acquire:
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L720
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return 0;
        }

        let len = head.wrapping_sub(tail).min(size) as usize;
        let start = (tail % size) as usize;
        let end = start + len;
        if end <= self.data.len() {
            out.extend_from_slice(&self.data[start..end]);
        } else {
            out.extend_from_slice(&self.data[start..]);
            out.extend_from_slice(&self.data[..end - self.data.len()]);
        }

        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L723
        self.tail.store(head, Ordering::Release);
        len
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::Rb;

    #[test]
    fn test_read_contiguous() {
        let data: Vec<u8> = (0..16).collect();
        let tail = AtomicU64::new(2);
        let head = AtomicU64::new(6);
        let rb = Rb::new(&data, &tail, &head);

        let mut out = vec![];
        assert_eq!(rb.read_available(&mut out), 4);
        assert_eq!(out, [2, 3, 4, 5]);
        assert_eq!(tail.load(Ordering::Relaxed), 6);

        assert_eq!(rb.read_available(&mut out), 0);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_read_wrapped() {
        let data: Vec<u8> = (0..8).collect();
        // Free-running offsets: tail at 14 (index 6), head at 19 (index 3).
        let tail = AtomicU64::new(14);
        let head = AtomicU64::new(19);
        let rb = Rb::new(&data, &tail, &head);

        let mut out = vec![];
        assert_eq!(rb.read_available(&mut out), 5);
        assert_eq!(out, [6, 7, 0, 1, 2]);
        assert_eq!(tail.load(Ordering::Relaxed), 19);
    }
}
