use super::{EventAttr, SampleOn};
use crate::ffi::{bindings as b, Attr};

pub(crate) fn from(event_attr: &EventAttr) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        ..Default::default()
    };

    // event config:

    attr.type_ = event_attr.ty;
    attr.config = event_attr.config;

    // count config:

    macro_rules! when {
        ($bool:ident, $flag:ident) => {
            attr.set_flag(b::$flag, event_attr.$bool);
        };
    }
    when!(disabled, ATTR_FLAG_DISABLED);
    when!(inherit, ATTR_FLAG_INHERIT);
    when!(enable_on_exec, ATTR_FLAG_ENABLE_ON_EXEC);
    when!(exclude_user, ATTR_FLAG_EXCLUDE_USER);
    when!(exclude_kernel, ATTR_FLAG_EXCLUDE_KERNEL);
    when!(exclude_hv, ATTR_FLAG_EXCLUDE_HV);
    when!(exclude_host, ATTR_FLAG_EXCLUDE_HOST);
    when!(exclude_guest, ATTR_FLAG_EXCLUDE_GUEST);
    when!(exclude_callchain_user, ATTR_FLAG_EXCLUDE_CALLCHAIN_USER);
    when!(mmap, ATTR_FLAG_MMAP);
    when!(comm, ATTR_FLAG_COMM);
    when!(sample_id_all, ATTR_FLAG_SAMPLE_ID_ALL);

    attr.read_format = event_attr.read_format;

    // sample config:

    match event_attr.sample_on {
        SampleOn::Freq(val) => {
            attr.set_flag(b::ATTR_FLAG_FREQ, true);
            attr.sample_period_or_freq = val;
        }
        SampleOn::Period(val) => {
            attr.sample_period_or_freq = val;
        }
    }

    attr.flags |= (event_attr.precise_ip.min(3) as u64) << b::ATTR_FLAG_PRECISE_IP;
    attr.sample_type = event_attr.sample_type;
    attr.wakeup_events_or_watermark = event_attr.wakeup_events;
    attr.branch_sample_type = event_attr.branch_sample_type;
    attr.sample_regs_user = event_attr.sample_regs_user;
    attr.sample_stack_user = event_attr.sample_stack_user;

    attr
}
