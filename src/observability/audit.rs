/// Audit trail for control-plane mutations
/// Every registry mutation and enforcement outcome is written as one JSON line
/// and mirrored to the `log` facade at a level derived from its severity.
use crate::config::types::{HostError, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Audit event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

/// Types of events we track
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SiteCreated,
    SiteUpdated,
    SiteDeleted,
    SiteSuspended,
    SiteUnsuspended,
    LimitsSet,
    LimitsApplied,
    LimitsRemoved,
    /// Some isolation controls could not be applied
    EnforcementDegraded,
    ConfigRendered,
    /// Artifacts could not be regenerated after a mutation
    RenderFailed,
}

impl AuditEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::EnforcementDegraded | AuditEventType::RenderFailed => {
                AuditSeverity::High
            }
            AuditEventType::SiteDeleted
            | AuditEventType::SiteSuspended
            | AuditEventType::LimitsRemoved => AuditSeverity::Medium,
            _ => AuditSeverity::Low,
        }
    }
}

/// Individual audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub process_id: u32,
}

impl AuditEvent {
    /// Create a new event with default severity
    pub fn new(event_type: AuditEventType, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            severity: event_type.default_severity(),
            details: details.into(),
            site_id: None,
            owner_id: None,
            process_id: std::process::id(),
        }
    }

    pub fn with_site(mut self, site_id: &str) -> Self {
        self.site_id = Some(site_id.to_string());
        self
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        if !owner_id.is_empty() {
            self.owner_id = Some(owner_id.to_string());
        }
        self
    }
}

/// Audit logger handed explicitly to whoever mutates state.
/// Without a file it only mirrors events to the log facade.
pub struct AuditLog {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open (append) the audit file, creating its directory
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HostError::Config(format!("Failed to create audit log directory: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HostError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            file: Some(Mutex::new(file)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Audit log that only writes to the log facade
    pub fn disabled() -> Self {
        Self {
            file: None,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self, event: AuditEvent) {
        let subject = match (&event.site_id, &event.owner_id) {
            (Some(site), _) => format!(" [site {}]", site),
            (None, Some(owner)) => format!(" [owner {}]", owner),
            (None, None) => String::new(),
        };

        match event.severity {
            AuditSeverity::High => {
                error!("AUDIT {:?}{}: {}", event.event_type, subject, event.details)
            }
            AuditSeverity::Medium => {
                warn!("AUDIT {:?}{}: {}", event.event_type, subject, event.details)
            }
            AuditSeverity::Low => {
                info!("AUDIT {:?}{}: {}", event.event_type, subject, event.details)
            }
        }

        let Some(file) = &self.file else {
            return;
        };

        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            error!("Failed to write to audit log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/audit.log");
        let audit = AuditLog::open(&path).unwrap();

        audit.record(AuditEvent::new(AuditEventType::SiteCreated, "a.test").with_site("s1"));
        audit.record(
            AuditEvent::new(AuditEventType::EnforcementDegraded, "memory: denied")
                .with_owner("alice"),
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "site_created");
        assert_eq!(lines[0]["site_id"], "s1");
        assert_eq!(lines[1]["severity"], "high");
        assert_eq!(lines[1]["owner_id"], "alice");
        assert!(lines[0].get("owner_id").is_none());
    }

    #[test]
    fn test_disabled_log_has_no_path() {
        let audit = AuditLog::disabled();
        assert!(audit.path().is_none());
        audit.record(AuditEvent::new(AuditEventType::LimitsSet, "noop"));
    }
}
