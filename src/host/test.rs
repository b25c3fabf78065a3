use std::fs;

use super::{Host, LinuxHost};

#[test]
fn test_online_cpus_from_sysfs() {
    let dir = tempfile::tempdir().unwrap();
    let online = dir.path().join("online");
    fs::write(&online, "0-2,6\n").unwrap();

    let host = LinuxHost::with_paths(&online, dir.path());
    assert_eq!(host.online_cpus().unwrap(), [0, 1, 2, 6]);

    fs::write(&online, "0,6\n").unwrap();
    assert_eq!(host.online_cpus().unwrap(), [0, 6]);
}

#[test]
fn test_threads_of_process() {
    let dir = tempfile::tempdir().unwrap();
    for tid in ["100", "102", "101"] {
        fs::create_dir_all(dir.path().join("100/task").join(tid)).unwrap();
    }

    let host = LinuxHost::with_paths(dir.path().join("online"), dir.path());
    assert_eq!(host.threads_of_process(100).unwrap(), [100, 101, 102]);
    assert!(host.threads_of_process(200).is_err());
}
