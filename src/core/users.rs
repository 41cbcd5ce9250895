use super::device::Device;
use super::error::{FreeGpusError, Result};
use std::collections::{BTreeMap, BTreeSet};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};

/// Maps a process id to the name of the user that owns it.
#[cfg_attr(test, mockall::automock)]
pub trait UserResolver {
    fn username(&self, pid: u32) -> Result<String>;
}

/// Resolves process owners from the operating system's process table.
///
/// Only the processes passed to [`SystemUsers::for_pids`] are inspected, and
/// they are sampled once, so a process that exits after the snapshot still
/// resolves while one that exited before it does not.
pub struct SystemUsers {
    system: System,
    users: Users,
}

impl SystemUsers {
    pub fn for_pids(pids: &[u32]) -> Self {
        let pids: Vec<Pid> = pids.iter().map(|&pid| Pid::from_u32(pid)).collect();
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing().with_user(UpdateKind::Always),
        );
        Self {
            system,
            users: Users::new_with_refreshed_list(),
        }
    }
}

impl UserResolver for SystemUsers {
    fn username(&self, pid: u32) -> Result<String> {
        let lookup_error = |reason: &str| FreeGpusError::UserLookup {
            pid,
            reason: reason.to_string(),
        };

        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or_else(|| lookup_error("no such process"))?;
        let uid = process
            .user_id()
            .ok_or_else(|| lookup_error("process owner is unknown"))?;

        // Fall back to the numeric uid when it has no passwd entry, as in containers
        Ok(self
            .users
            .get_user_by_id(uid)
            .map(|user| user.name().to_string())
            .unwrap_or_else(|| (**uid).to_string()))
    }
}

/// All process ids attached to any device, each listed once.
pub fn occupying_pids(devices: &[Device]) -> Vec<u32> {
    devices
        .iter()
        .flat_map(|d| d.pids.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Group occupied devices by the users owning their processes.
///
/// Any pid that cannot be resolved aborts the whole lookup.
pub fn resolve_gpu_users(
    devices: &[Device],
    resolver: &dyn UserResolver,
) -> Result<BTreeMap<String, BTreeSet<u32>>> {
    let mut gpu_users: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();

    for device in devices.iter().filter(|d| !d.is_free()) {
        for &pid in &device.pids {
            let user = resolver.username(pid)?;
            tracing::debug!(gpu = device.index, pid, user = %user, "Resolved process owner");
            gpu_users.entry(user).or_default().insert(device.index);
        }
    }

    Ok(gpu_users)
}
