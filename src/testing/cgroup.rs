/// In-memory cgroup hierarchy
use super::lock;
use crate::config::types::{HostError, Result};
use crate::kernel::cgroup::backend::CgroupBackend;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct Group {
    files: BTreeMap<String, String>,
    procs: Vec<u32>,
}

#[derive(Default)]
struct State {
    groups: BTreeMap<String, Group>,
    subtree_control: Option<String>,
    root_procs: Vec<u32>,
}

/// Mirrors cgroupfs semantics closely enough for enforcer tests:
/// limit writes land in per-group files, and removal of a group that
/// still has members fails like rmdir does.
pub struct MemoryCgroup {
    root: PathBuf,
    state: Mutex<State>,
    failing_files: BTreeSet<String>,
    fail_create: bool,
}

impl Default for MemoryCgroup {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCgroup {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/sys/fs/cgroup"),
            state: Mutex::new(State::default()),
            failing_files: BTreeSet::new(),
            fail_create: false,
        }
    }

    /// Make every write to `file` fail
    pub fn fail_on(mut self, file: &str) -> Self {
        self.failing_files.insert(file.to_string());
        self
    }

    /// Make group creation fail
    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn groups(&self) -> Vec<String> {
        lock(&self.state).groups.keys().cloned().collect()
    }

    pub fn file(&self, group: &str, name: &str) -> Option<String> {
        lock(&self.state)
            .groups
            .get(group)
            .and_then(|g| g.files.get(name).cloned())
    }

    /// Seed a counter such as memory.current; creates the group if needed
    pub fn set_file(&self, group: &str, name: &str, value: &str) {
        lock(&self.state)
            .groups
            .entry(group.to_string())
            .or_default()
            .files
            .insert(name.to_string(), value.to_string());
    }

    pub fn procs(&self, group: &str) -> Vec<u32> {
        lock(&self.state)
            .groups
            .get(group)
            .map(|g| g.procs.clone())
            .unwrap_or_default()
    }

    pub fn root_procs(&self) -> Vec<u32> {
        lock(&self.state).root_procs.clone()
    }

    pub fn subtree_control(&self) -> Option<String> {
        lock(&self.state).subtree_control.clone()
    }

    fn write(&self, group: &str, name: &str, value: String) -> Result<()> {
        if self.failing_files.contains(name) {
            return Err(HostError::Cgroup(format!(
                "Failed to write {}/{}: Permission denied",
                group, name
            )));
        }
        let mut state = lock(&self.state);
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| HostError::Cgroup(format!("no such cgroup: {}", group)))?;
        entry.files.insert(name.to_string(), value);
        Ok(())
    }

    fn read_u64(&self, group: &str, name: &str) -> Result<u64> {
        self.file(group, name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| HostError::Cgroup(format!("Failed to read {}/{}", group, name)))
    }
}

impl CgroupBackend for MemoryCgroup {
    fn backend_name(&self) -> &str {
        "memory"
    }

    fn enable_controllers(&self, controllers: &[&str]) -> Result<()> {
        if self.failing_files.contains("cgroup.subtree_control") {
            return Err(HostError::Cgroup(
                "Failed to enable cgroup controllers: Device or resource busy".to_string(),
            ));
        }
        let value = controllers
            .iter()
            .map(|c| format!("+{}", c))
            .collect::<Vec<_>>()
            .join(" ");
        lock(&self.state).subtree_control = Some(value);
        Ok(())
    }

    fn exists(&self, group: &str) -> bool {
        lock(&self.state).groups.contains_key(group)
    }

    fn create(&self, group: &str) -> Result<()> {
        if self.fail_create {
            return Err(HostError::Cgroup(
                "Failed to create cgroup: Permission denied".to_string(),
            ));
        }
        lock(&self.state)
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    fn remove(&self, group: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(entry) = state.groups.get(group) {
            if !entry.procs.is_empty() {
                return Err(HostError::Cgroup(format!(
                    "Failed to remove cgroup: {} still has members",
                    group
                )));
            }
            state.groups.remove(group);
        }
        Ok(())
    }

    fn attach_process(&self, group: &str, pid: u32) -> Result<()> {
        let mut state = lock(&self.state);
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| HostError::Cgroup(format!("no such cgroup: {}", group)))?;
        entry.procs.push(pid);
        Ok(())
    }

    fn list_processes(&self, group: &str) -> Result<Vec<u32>> {
        Ok(self.procs(group))
    }

    fn release_process(&self, pid: u32) -> Result<()> {
        let mut state = lock(&self.state);
        for entry in state.groups.values_mut() {
            entry.procs.retain(|p| *p != pid);
        }
        state.root_procs.push(pid);
        Ok(())
    }

    fn set_memory_limit(&self, group: &str, limit_bytes: u64) -> Result<()> {
        self.write(group, "memory.max", limit_bytes.to_string())
    }

    fn set_process_limit(&self, group: &str, limit: u32) -> Result<()> {
        self.write(group, "pids.max", limit.to_string())
    }

    fn set_cpu_max(&self, group: &str, quota_usec: u64, period_usec: u64) -> Result<()> {
        self.write(group, "cpu.max", format!("{} {}", quota_usec, period_usec))
    }

    fn memory_current(&self, group: &str) -> Result<u64> {
        self.read_u64(group, "memory.current")
    }

    fn cpu_usage_usec(&self, group: &str) -> Result<u64> {
        self.file(group, "cpu.stat")
            .and_then(|stat| crate::kernel::cgroup::v2::parse_cpu_usage(&stat))
            .ok_or_else(|| HostError::Cgroup(format!("Failed to read {}/cpu.stat", group)))
    }

    fn process_count(&self, group: &str) -> Result<u32> {
        match self.read_u64(group, "pids.current") {
            Ok(count) => Ok(count as u32),
            Err(_) if self.exists(group) => Ok(self.procs(group).len() as u32),
            Err(e) => Err(e),
        }
    }

    fn get_cgroup_path(&self, group: &str) -> PathBuf {
        Path::new(&self.root).join(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_refuses_populated_group() {
        let cgroups = MemoryCgroup::new();
        cgroups.create("g").unwrap();
        cgroups.attach_process("g", 7).unwrap();
        assert!(cgroups.remove("g").is_err());

        cgroups.release_process(7).unwrap();
        cgroups.remove("g").unwrap();
        assert!(cgroups.groups().is_empty());
        assert_eq!(cgroups.root_procs(), vec![7]);
    }

    #[test]
    fn test_failing_file() {
        let cgroups = MemoryCgroup::new().fail_on("memory.max");
        cgroups.create("g").unwrap();
        assert!(cgroups.set_memory_limit("g", 1).is_err());
        cgroups.set_process_limit("g", 5).unwrap();
        assert_eq!(cgroups.file("g", "pids.max").as_deref(), Some("5"));
    }
}
