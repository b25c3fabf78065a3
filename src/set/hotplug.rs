use std::time::Duration;

use log::{debug, info, warn};

use super::mmap::drain_event_fd;
use super::open::open_group;
use super::{EventSelectionSet, Hotplug, OpenMode};
use crate::count::CounterInfo;
use crate::error::{Error, Result};
use crate::io_loop::IoLoop;

impl EventSelectionSet {
    /// Follows CPUs going offline and online while `lp` runs.
    ///
    /// Only CPUs in `monitored_cpus` are followed, all of them if it is empty.
    /// The online CPUs are checked every `check_interval`, or every
    /// [`Opts::hotplug_check_interval`][crate::config::Opts::hotplug_check_interval]
    /// if `None`. A zero interval is rejected.
    pub fn handle_cpu_hotplug_events(
        &mut self,
        lp: &mut dyn IoLoop<Self>,
        monitored_cpus: &[i32],
        check_interval: Option<Duration>,
    ) -> Result<()> {
        if self.open_mode != Some(OpenMode::PerCpu) {
            return Err(Error::InvalidArgument(
                "cpu hotplug needs event files opened per cpu".to_string(),
            ));
        }
        let interval = check_interval.unwrap_or(self.opts.hotplug_check_interval);
        if interval.is_zero() {
            return Err(Error::InvalidArgument(
                "cpu hotplug check interval must not be zero".to_string(),
            ));
        }
        if let Some(hotplug) = self.hotplug.take() {
            lp.del_event(hotplug.timer)?;
        }

        let online_cpus = self.host.online_cpus()?;
        let timer = lp.add_periodic_event(
            interval,
            Box::new(|set: &mut Self, lp: &mut dyn IoLoop<Self>| {
                set.detect_cpu_hotplug_events(lp)
            }),
        )?;
        debug!("checking cpu hotplug every {:?}", interval);

        self.hotplug = Some(Hotplug {
            monitored_cpus: monitored_cpus.to_vec(),
            online_cpus,
            timer,
        });
        Ok(())
    }

    /// Compares the online CPUs with the last check and reacts to the changes,
    /// CPUs gone offline first.
    ///
    /// Returns `false` if the record callback asked to stop while draining.
    pub(super) fn detect_cpu_hotplug_events(&mut self, lp: &mut dyn IoLoop<Self>) -> bool {
        let online_cpus = match self.host.online_cpus() {
            Ok(cpus) => cpus,
            Err(e) => {
                warn!("failed to read online cpus: {}", e);
                return true;
            }
        };
        let Some(hotplug) = &mut self.hotplug else {
            return true;
        };

        let monitored = |cpu: &i32| {
            hotplug.monitored_cpus.is_empty() || hotplug.monitored_cpus.contains(cpu)
        };
        let gone: Vec<i32> = hotplug
            .online_cpus
            .iter()
            .filter(|&it| !online_cpus.contains(it) && monitored(it))
            .copied()
            .collect();
        let back: Vec<i32> = online_cpus
            .iter()
            .filter(|&it| !hotplug.online_cpus.contains(it) && monitored(it))
            .copied()
            .collect();
        hotplug.online_cpus = online_cpus;

        let mut keep_going = true;
        for cpu in gone {
            info!("cpu {} went offline", cpu);
            keep_going &= self.handle_cpu_offline_event(lp, cpu);
        }
        for cpu in back {
            info!("cpu {} came online", cpu);
            self.handle_cpu_online_event(lp, cpu);
        }
        keep_going
    }

    /// Drains, saves and closes every counter on `cpu`.
    ///
    /// Returns `false` if the record callback asked to stop while draining.
    pub(super) fn handle_cpu_offline_event(
        &mut self,
        lp: &mut dyn IoLoop<Self>,
        cpu: i32,
    ) -> bool {
        let Self {
            groups,
            record_callback,
            ..
        } = self;
        let mut keep_going = true;

        for selection in groups.iter_mut().flatten() {
            let selection_id = selection.selection_id;
            let sample_type = selection.event_attr.sample_type;
            let (mut gone, kept) = std::mem::take(&mut selection.event_fds)
                .into_iter()
                .partition::<Vec<_>, _>(|it| it.handle.cpu() == cpu);
            selection.event_fds = kept;

            for fd in &mut gone {
                if let (Some(callback), true) = (record_callback.as_mut(), keep_going) {
                    if fd.handle.has_mapped_buffer() {
                        keep_going =
                            drain_event_fd(fd, selection_id, sample_type, &mut **callback);
                    }
                }

                let tid = fd.handle.tid();
                match fd.handle.read_counter() {
                    Ok(counter) => selection
                        .hotplugged_counters
                        .push(CounterInfo { tid, cpu, counter }),
                    Err(e) => warn!(
                        "failed to read `{}` for tid {} on offline cpu {}: {}",
                        selection.event_type_modifier.name, tid, cpu, e
                    ),
                }

                if let Some(event) = fd.loop_event.take() {
                    if let Err(e) = lp.del_event(event) {
                        let raw_fd = fd.handle.raw_fd();
                        warn!("failed to remove fd {} from the io loop: {}", raw_fd, e);
                    }
                }
            }
            debug!(
                "closed {} counters of `{}` on cpu {}",
                gone.len(),
                selection.event_type_modifier.name,
                cpu
            );
        }
        keep_going
    }

    /// Opens counters for every group and monitored thread on `cpu`, mapped and
    /// registered with `lp` if the event files are mapped.
    ///
    /// On failure the CPU stays unmonitored.
    pub(super) fn handle_cpu_online_event(&mut self, lp: &mut dyn IoLoop<Self>, cpu: i32) {
        if self
            .selections()
            .any(|it| it.targets().any(|(_, fd_cpu)| fd_cpu == cpu))
        {
            return;
        }

        let snapshot = self.fd_snapshot();
        if let Err(e) = self.open_cpu(lp, cpu) {
            warn!("failed to monitor cpu {} after it came online: {}", cpu, e);
            self.unregister_fds(lp, Some(cpu));
            self.rollback_to(&snapshot);
        }
    }

    fn open_cpu(&mut self, lp: &mut dyn IoLoop<Self>, cpu: i32) -> Result<()> {
        let tids = self.monitored_tids()?;
        let Self { groups, host, .. } = self;
        for group in groups.iter_mut() {
            for &tid in &tids {
                open_group(group, &mut **host, tid, cpu, true)?;
            }
        }
        self.create_mapped_buffer_for_cpu(lp, cpu)
    }
}
