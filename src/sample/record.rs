use crate::ffi::bindings as b;

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L824
// struct perf_event_header {
//     u32 type; # 4 bytes
//     u16 misc; # 2 bytes
//     u16 size; # 2 bytes
// };
pub(crate) const HEADER_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Mmap,
    Lost,
    Comm,
    Exit,
    Throttle,
    Unthrottle,
    Fork,
    Read,
    Sample,
    Mmap2,
    Other(u32),
}

impl From<u32> for RecordKind {
    fn from(value: u32) -> Self {
        match value {
            b::PERF_RECORD_MMAP => Self::Mmap,
            b::PERF_RECORD_LOST => Self::Lost,
            b::PERF_RECORD_COMM => Self::Comm,
            b::PERF_RECORD_EXIT => Self::Exit,
            b::PERF_RECORD_THROTTLE => Self::Throttle,
            b::PERF_RECORD_UNTHROTTLE => Self::Unthrottle,
            b::PERF_RECORD_FORK => Self::Fork,
            b::PERF_RECORD_READ => Self::Read,
            b::PERF_RECORD_SAMPLE => Self::Sample,
            b::PERF_RECORD_MMAP2 => Self::Mmap2,
            other => Self::Other(other),
        }
    }
}

/// One record drained from a ring-buffer.
///
/// The body is kept undecoded, only the leading fields of sample records
/// are exposed by [`Record::sample`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Selection whose counter produced the record.
    pub selection_id: u32,
    /// Sample type of that selection, describes the body layout.
    pub sample_type: u64,
    pub kind: RecordKind,
    pub misc: u16,
    /// Record body without the header.
    pub body: Vec<u8>,
}

/// Fixed leading fields of a `PERF_RECORD_SAMPLE` body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleFields {
    pub identifier: Option<u64>,
    pub ip: Option<u64>,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub time: Option<u64>,
    pub addr: Option<u64>,
    pub id: Option<u64>,
    pub stream_id: Option<u64>,
    pub cpu: Option<u32>,
    pub period: Option<u64>,
}

impl Record {
    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L957
    // struct {
    //     struct perf_event_header header;
    //     { u64 id;        } && PERF_SAMPLE_IDENTIFIER
    //     { u64 ip;        } && PERF_SAMPLE_IP
    //     { u32 pid, tid;  } && PERF_SAMPLE_TID
    //     { u64 time;      } && PERF_SAMPLE_TIME
    //     { u64 addr;      } && PERF_SAMPLE_ADDR
    //     { u64 id;        } && PERF_SAMPLE_ID
    //     { u64 stream_id; } && PERF_SAMPLE_STREAM_ID
    //     { u32 cpu, res;  } && PERF_SAMPLE_CPU
    //     { u64 period;    } && PERF_SAMPLE_PERIOD
    //     ...
    // };
    /// Decodes the fixed leading fields of a sample record.
    ///
    /// Returns `None` for other record kinds or a truncated body.
    pub fn sample(&self) -> Option<SampleFields> {
        if self.kind != RecordKind::Sample {
            return None;
        }

        let mut cursor = Cursor(&self.body);
        let sample_type = self.sample_type;
        macro_rules! when {
            ($flag:ident, $then:expr) => {
                match sample_type & b::$flag > 0 {
                    true => Some($then),
                    false => None,
                }
            };
        }

        let identifier = when!(PERF_SAMPLE_IDENTIFIER, cursor.u64()?);
        let ip = when!(PERF_SAMPLE_IP, cursor.u64()?);
        let task = when!(PERF_SAMPLE_TID, (cursor.u32()?, cursor.u32()?));
        let time = when!(PERF_SAMPLE_TIME, cursor.u64()?);
        let addr = when!(PERF_SAMPLE_ADDR, cursor.u64()?);
        let id = when!(PERF_SAMPLE_ID, cursor.u64()?);
        let stream_id = when!(PERF_SAMPLE_STREAM_ID, cursor.u64()?);
        let cpu = when!(PERF_SAMPLE_CPU, {
            let cpu = cursor.u32()?;
            cursor.u32()?; // res
            cpu
        });
        let period = when!(PERF_SAMPLE_PERIOD, cursor.u64()?);

        Some(SampleFields {
            identifier,
            ip,
            pid: task.map(|(pid, _)| pid),
            tid: task.map(|(_, tid)| tid),
            time,
            addr,
            id,
            stream_id,
            cpu,
            period,
        })
    }
}

struct Cursor<'a>(&'a [u8]);

impl Cursor<'_> {
    fn u64(&mut self) -> Option<u64> {
        let (head, rest) = self.0.split_first_chunk::<8>()?;
        self.0 = rest;
        Some(u64::from_ne_bytes(*head))
    }

    fn u32(&mut self) -> Option<u32> {
        let (head, rest) = self.0.split_first_chunk::<4>()?;
        self.0 = rest;
        Some(u32::from_ne_bytes(*head))
    }
}

/// Splits raw ring-buffer bytes into records, in the order they were written.
///
/// Returns the records and the number of bytes consumed; bytes after a
/// malformed header are not consumed.
pub(crate) fn split_records(
    bytes: &[u8],
    selection_id: u32,
    sample_type: u64,
) -> (Vec<Record>, usize) {
    let mut records = vec![];
    let mut offset = 0;

    while let Some(header) = bytes[offset..].first_chunk::<HEADER_SIZE>() {
        let kind = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let misc = u16::from_ne_bytes([header[4], header[5]]);
        let size = u16::from_ne_bytes([header[6], header[7]]) as usize;

        if size < HEADER_SIZE || offset + size > bytes.len() {
            break;
        }

        records.push(Record {
            selection_id,
            sample_type,
            kind: kind.into(),
            misc,
            body: bytes[offset + HEADER_SIZE..offset + size].to_vec(),
        });
        offset += size;
    }

    (records, offset)
}

/// Encodes a record the way the kernel writes it into a ring-buffer.
#[cfg(test)]
pub(crate) fn encode(kind: u32, misc: u16, body: &[u8]) -> Vec<u8> {
    let size = (HEADER_SIZE + body.len()) as u16;
    let mut bytes = Vec::with_capacity(size as usize);
    bytes.extend(kind.to_ne_bytes());
    bytes.extend(misc.to_ne_bytes());
    bytes.extend(size.to_ne_bytes());
    bytes.extend(body);
    bytes
}
