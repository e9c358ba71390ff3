/// Scripted host for exercising OS-facing logic
use super::lock;
use crate::config::types::Result;
use crate::kernel::host::{Account, CommandOutput, HostOps};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Records every action instead of performing it.
///
/// Programs are absent unless registered with [`FakeHost::with_program`];
/// registered programs succeed with empty output unless scripted.
pub struct FakeHost {
    linux: bool,
    accounts: BTreeMap<String, Account>,
    programs: BTreeSet<String>,
    outputs: BTreeMap<String, CommandOutput>,
    commands: Mutex<Vec<String>>,
    chowns: Mutex<Vec<(PathBuf, u32, u32)>>,
    modes: Mutex<Vec<(PathBuf, u32)>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            linux: true,
            accounts: BTreeMap::new(),
            programs: BTreeSet::new(),
            outputs: BTreeMap::new(),
            commands: Mutex::new(Vec::new()),
            chowns: Mutex::new(Vec::new()),
            modes: Mutex::new(Vec::new()),
        }
    }

    /// Pretend to be a host without Linux isolation primitives
    pub fn non_linux() -> Self {
        Self {
            linux: false,
            ..Self::new()
        }
    }

    pub fn with_account(mut self, name: &str, uid: u32, gid: u32) -> Self {
        self.accounts.insert(
            name.to_string(),
            Account {
                name: name.to_string(),
                uid,
                gid,
            },
        );
        self
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_string());
        self
    }

    /// Script the result of every invocation of `program`
    pub fn with_output(mut self, program: &str, output: CommandOutput) -> Self {
        self.programs.insert(program.to_string());
        self.outputs.insert(program.to_string(), output);
        self
    }

    /// Invoked command lines, program and arguments joined by spaces
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    pub fn chowns(&self) -> Vec<(PathBuf, u32, u32)> {
        lock(&self.chowns).clone()
    }

    pub fn modes(&self) -> Vec<(PathBuf, u32)> {
        lock(&self.modes).clone()
    }
}

impl HostOps for FakeHost {
    fn is_linux(&self) -> bool {
        self.linux
    }

    fn lookup_account(&self, owner: &str) -> Option<Account> {
        if let Some(account) = self.accounts.get(owner) {
            return Some(account.clone());
        }
        let uid = owner.parse::<u32>().ok()?;
        self.accounts.values().find(|a| a.uid == uid).cloned()
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        lock(&self.chowns).push((path.to_path_buf(), uid, gid));
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        lock(&self.modes).push((path.to_path_buf(), mode));
        Ok(())
    }

    fn has_program(&self, program: &str) -> bool {
        self.programs.contains(program)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        lock(&self.commands).push(line);

        Ok(self
            .outputs
            .get(program)
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounts_resolve_by_name_and_uid() {
        let host = FakeHost::new().with_account("alice", 1001, 1002);
        assert_eq!(host.lookup_account("alice").unwrap().gid, 1002);
        assert_eq!(host.lookup_account("1001").unwrap().name, "alice");
        assert!(host.lookup_account("bob").is_none());
    }

    #[test]
    fn test_runs_are_recorded() {
        let host = FakeHost::new().with_output("df", CommandOutput::ok("x\ny\n"));
        assert!(host.has_program("df"));
        let out = host.run("df", &["-P", "/var/www"]).unwrap();
        assert_eq!(out.stdout, "x\ny\n");
        assert_eq!(host.commands(), vec!["df -P /var/www"]);
    }
}
