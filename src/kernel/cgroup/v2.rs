/// Cgroup v2 backend implementation
/// Tenant groups live directly under the unified hierarchy root.

use crate::config::types::{HostError, Result};
use crate::kernel::cgroup::backend::CgroupBackend;
use std::fs;
use std::path::{Path, PathBuf};

/// Cgroup v2 backend
pub struct CgroupV2 {
    root: PathBuf,
}

impl CgroupV2 {
    /// Create new cgroup v2 backend rooted at `root` (normally /sys/fs/cgroup)
    pub fn new(root: &Path) -> Self {
        CgroupV2 {
            root: root.to_path_buf(),
        }
    }

    /// Get cgroup path for a tenant group
    fn group_path(&self, group: &str) -> PathBuf {
        self.root.join(group)
    }

    fn write_control(&self, group: &str, file: &str, value: &str) -> Result<()> {
        let path = self.group_path(group).join(file);
        fs::write(&path, value)
            .map_err(|e| HostError::Cgroup(format!("Failed to write {}: {}", path.display(), e)))
    }

    fn read_control(&self, group: &str, file: &str) -> Result<String> {
        let path = self.group_path(group).join(file);
        fs::read_to_string(&path)
            .map_err(|e| HostError::Cgroup(format!("Failed to read {}: {}", path.display(), e)))
    }

    fn read_u64(&self, group: &str, file: &str) -> Result<u64> {
        let content = self.read_control(group, file)?;
        content
            .trim()
            .parse::<u64>()
            .map_err(|e| HostError::Cgroup(format!("Failed to parse {}: {}", file, e)))
    }
}

/// Extract `usage_usec` from cpu.stat
pub fn parse_cpu_usage(cpu_stat: &str) -> Option<u64> {
    cpu_stat.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("usage_usec"), Some(value)) => value.parse::<u64>().ok(),
            _ => None,
        }
    })
}

/// Parse the newline-separated pid list of cgroup.procs
pub fn parse_procs(procs: &str) -> Vec<u32> {
    procs
        .split_whitespace()
        .filter_map(|pid| pid.parse::<u32>().ok())
        .collect()
}

impl CgroupBackend for CgroupV2 {
    fn backend_name(&self) -> &str {
        "cgroup_v2"
    }

    fn enable_controllers(&self, controllers: &[&str]) -> Result<()> {
        let value = controllers
            .iter()
            .map(|c| format!("+{}", c))
            .collect::<Vec<_>>()
            .join(" ");
        let path = self.root.join("cgroup.subtree_control");
        fs::write(&path, value).map_err(|e| {
            HostError::Cgroup(format!("Failed to enable cgroup controllers: {}", e))
        })
    }

    fn exists(&self, group: &str) -> bool {
        self.group_path(group).is_dir()
    }

    fn create(&self, group: &str) -> Result<()> {
        let path = self.group_path(group);
        fs::create_dir_all(&path)
            .map_err(|e| HostError::Cgroup(format!("Failed to create cgroup: {}", e)))
    }

    fn remove(&self, group: &str) -> Result<()> {
        let path = self.group_path(group);

        // cgroupfs only allows rmdir; interface files vanish with the directory
        if path.exists() {
            fs::remove_dir(&path)
                .map_err(|e| HostError::Cgroup(format!("Failed to remove cgroup: {}", e)))?;
        }

        Ok(())
    }

    fn attach_process(&self, group: &str, pid: u32) -> Result<()> {
        self.write_control(group, "cgroup.procs", &pid.to_string())
    }

    fn list_processes(&self, group: &str) -> Result<Vec<u32>> {
        let procs = self.read_control(group, "cgroup.procs")?;
        Ok(parse_procs(&procs))
    }

    fn release_process(&self, pid: u32) -> Result<()> {
        let path = self.root.join("cgroup.procs");
        fs::write(&path, pid.to_string()).map_err(|e| {
            HostError::Cgroup(format!("Failed to move pid {} to root cgroup: {}", pid, e))
        })
    }

    fn set_memory_limit(&self, group: &str, limit_bytes: u64) -> Result<()> {
        self.write_control(group, "memory.max", &limit_bytes.to_string())
    }

    fn set_process_limit(&self, group: &str, limit: u32) -> Result<()> {
        self.write_control(group, "pids.max", &limit.to_string())
    }

    fn set_cpu_max(&self, group: &str, quota_usec: u64, period_usec: u64) -> Result<()> {
        // cpu.max format: "$MAX $PERIOD"
        self.write_control(group, "cpu.max", &format!("{} {}", quota_usec, period_usec))
    }

    fn memory_current(&self, group: &str) -> Result<u64> {
        self.read_u64(group, "memory.current")
    }

    fn cpu_usage_usec(&self, group: &str) -> Result<u64> {
        let stat = self.read_control(group, "cpu.stat")?;
        parse_cpu_usage(&stat)
            .ok_or_else(|| HostError::Cgroup("cpu.stat has no usage_usec line".to_string()))
    }

    fn process_count(&self, group: &str) -> Result<u32> {
        let count = self.read_u64(group, "pids.current")?;
        Ok(count as u32)
    }

    fn get_cgroup_path(&self, group: &str) -> PathBuf {
        self.group_path(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, CgroupV2) {
        let dir = tempfile::tempdir().unwrap();
        let backend = CgroupV2::new(dir.path());
        (dir, backend)
    }

    #[test]
    fn test_group_path() {
        let backend = CgroupV2::new(Path::new("/sys/fs/cgroup"));
        assert_eq!(
            backend.get_cgroup_path("hostbox-alice"),
            PathBuf::from("/sys/fs/cgroup/hostbox-alice")
        );
    }

    #[test]
    fn test_limit_files_use_kernel_formats() {
        let (dir, backend) = scratch();
        backend.create("hostbox-alice").unwrap();
        assert!(backend.exists("hostbox-alice"));

        backend.set_cpu_max("hostbox-alice", 50_000, 100_000).unwrap();
        backend.set_memory_limit("hostbox-alice", 512 * 1024 * 1024).unwrap();
        backend.set_process_limit("hostbox-alice", 64).unwrap();

        let group = dir.path().join("hostbox-alice");
        assert_eq!(fs::read_to_string(group.join("cpu.max")).unwrap(), "50000 100000");
        assert_eq!(fs::read_to_string(group.join("memory.max")).unwrap(), "536870912");
        assert_eq!(fs::read_to_string(group.join("pids.max")).unwrap(), "64");
    }

    #[test]
    fn test_counters_are_parsed() {
        let (dir, backend) = scratch();
        backend.create("g").unwrap();
        let group = dir.path().join("g");
        fs::write(group.join("memory.current"), "10485760\n").unwrap();
        fs::write(
            group.join("cpu.stat"),
            "usage_usec 123456\nuser_usec 100000\nsystem_usec 23456\n",
        )
        .unwrap();
        fs::write(group.join("pids.current"), "3\n").unwrap();
        fs::write(group.join("cgroup.procs"), "101\n202\n").unwrap();

        assert_eq!(backend.memory_current("g").unwrap(), 10 * 1024 * 1024);
        assert_eq!(backend.cpu_usage_usec("g").unwrap(), 123_456);
        assert_eq!(backend.process_count("g").unwrap(), 3);
        assert_eq!(backend.list_processes("g").unwrap(), vec![101, 202]);
    }

    #[test]
    fn test_enable_controllers_and_release() {
        let (dir, backend) = scratch();
        backend.enable_controllers(&["cpu", "memory", "pids"]).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("cgroup.subtree_control")).unwrap(),
            "+cpu +memory +pids"
        );

        backend.release_process(4242).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("cgroup.procs")).unwrap(), "4242");
    }

    #[test]
    fn test_remove_empty_group_and_missing_group() {
        let (_dir, backend) = scratch();
        backend.create("g").unwrap();
        backend.remove("g").unwrap();
        assert!(!backend.exists("g"));
        backend.remove("never-created").unwrap();
    }

    #[test]
    fn test_missing_counter_is_an_error() {
        let (_dir, backend) = scratch();
        backend.create("g").unwrap();
        assert!(backend.memory_current("g").is_err());
        assert_eq!(parse_cpu_usage("user_usec 5\n"), None);
    }
}
