use std::fs;

use super::tp::Tracefs;
use super::{BuiltinResolver, EventResolver};
use crate::error::Error;
use crate::ffi::bindings as b;

#[test]
fn test_resolve_hardware() {
    let ev = BuiltinResolver::new().resolve("instructions").unwrap();
    assert_eq!(ev.name, "instructions");
    assert_eq!(ev.event_type.ty, b::PERF_TYPE_HARDWARE);
    assert_eq!(ev.event_type.config, b::PERF_COUNT_HW_INSTRUCTIONS);
    assert!(!ev.exclude_user && !ev.exclude_kernel && !ev.exclude_hv);
}

#[test]
fn test_resolve_cache() {
    let resolver = BuiltinResolver::new();

    let ev = resolver.resolve("L1-dcache-load-misses").unwrap();
    assert_eq!(ev.event_type.ty, b::PERF_TYPE_HW_CACHE);
    let expected = b::PERF_COUNT_HW_CACHE_L1D
        | (b::PERF_COUNT_HW_CACHE_OP_READ << 8)
        | (b::PERF_COUNT_HW_CACHE_RESULT_MISS << 16);
    assert_eq!(ev.event_type.config, expected);

    let ev = resolver.resolve("dTLB-prefetches").unwrap();
    let expected = b::PERF_COUNT_HW_CACHE_DTLB
        | (b::PERF_COUNT_HW_CACHE_OP_PREFETCH << 8)
        | (b::PERF_COUNT_HW_CACHE_RESULT_ACCESS << 16);
    assert_eq!(ev.event_type.config, expected);

    assert!(resolver.resolve("LLC-loadz").is_err());
}

#[test]
fn test_resolve_modifiers() {
    let resolver = BuiltinResolver::new();

    let ev = resolver.resolve("cpu-cycles:u").unwrap();
    assert_eq!(ev.name, "cpu-cycles:u");
    assert_eq!(ev.event_type.name, "cpu-cycles");
    assert!(!ev.exclude_user);
    assert!(ev.exclude_kernel);
    assert!(ev.exclude_hv);

    let ev = resolver.resolve("task-clock:kpp").unwrap();
    assert!(ev.exclude_user);
    assert!(!ev.exclude_kernel);
    assert_eq!(ev.precise_ip, 2);

    let ev = resolver.resolve("cpu-cycles:GH").unwrap();
    assert!(ev.exclude_host && ev.exclude_guest);
    assert!(!ev.exclude_user && !ev.exclude_kernel);

    assert!(matches!(
        resolver.resolve("cpu-cycles:x"),
        Err(Error::Resolution { .. })
    ));
    assert!(resolver.resolve("cpu-cycles:pppp").is_err());
}

#[test]
fn test_resolve_raw() {
    let ev = BuiltinResolver::new().resolve("r1b0").unwrap();
    assert_eq!(ev.event_type.ty, b::PERF_TYPE_RAW);
    assert_eq!(ev.event_type.config, 0x1b0);
}

#[test]
fn test_resolve_unknown() {
    let resolver = BuiltinResolver::new();
    assert!(matches!(
        resolver.resolve("no-such-event"),
        Err(Error::Resolution { .. })
    ));
    assert!(resolver.resolve("no-such-event:u").is_err());
}

#[test]
fn test_resolve_tracepoint() {
    let dir = tempfile::tempdir().unwrap();
    let event_dir = dir.path().join("events/sched/sched_switch");
    fs::create_dir_all(&event_dir).unwrap();
    fs::write(event_dir.join("id"), "316\n").unwrap();

    let resolver = BuiltinResolver::with_tracefs(Tracefs::at(dir.path()));

    let ev = resolver.resolve("sched:sched_switch").unwrap();
    assert!(ev.event_type.is_tracepoint());
    assert_eq!(ev.event_type.config, 316);

    let ev = resolver.resolve("sched:sched_switch:k").unwrap();
    assert!(ev.exclude_user);
    assert_eq!(ev.event_type.name, "sched:sched_switch");

    assert!(resolver.resolve("sched:sched_wakeup").is_err());
}
