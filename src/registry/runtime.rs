/// Read-only view of the runtime instance table
use crate::config::loader::HostboxConfig;
use crate::config::types::RuntimeInstance;
use std::collections::BTreeMap;

/// Supplied by whatever manages runtime instance lifecycles
pub trait RuntimeCatalog: Send + Sync {
    /// Every known instance, ordered by version
    fn instances(&self) -> Vec<RuntimeInstance>;

    fn get(&self, version: &str) -> Option<RuntimeInstance> {
        self.instances().into_iter().find(|r| r.version == version)
    }

    fn is_enabled(&self, version: &str) -> bool {
        self.get(version).map_or(false, |r| r.enabled)
    }

    fn enabled(&self) -> Vec<RuntimeInstance> {
        self.instances().into_iter().filter(|r| r.enabled).collect()
    }
}

impl RuntimeCatalog for Vec<RuntimeInstance> {
    fn instances(&self) -> Vec<RuntimeInstance> {
        let mut instances = self.clone();
        instances.sort_by(|a, b| a.version.cmp(&b.version));
        instances
    }
}

/// Runtime table loaded from configuration, keyed by version
#[derive(Debug, Default)]
pub struct RuntimeTable {
    instances: BTreeMap<String, RuntimeInstance>,
}

impl RuntimeTable {
    /// Later entries for the same version replace earlier ones
    pub fn new(instances: Vec<RuntimeInstance>) -> Self {
        Self {
            instances: instances
                .into_iter()
                .map(|r| (r.version.clone(), r))
                .collect(),
        }
    }

    pub fn from_config(config: &HostboxConfig) -> Self {
        Self::new(config.runtimes.clone())
    }
}

impl RuntimeCatalog for RuntimeTable {
    fn instances(&self) -> Vec<RuntimeInstance> {
        self.instances.values().cloned().collect()
    }

    fn get(&self, version: &str) -> Option<RuntimeInstance> {
        self.instances.get(version).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_orders_by_version() {
        let table = RuntimeTable::new(vec![
            RuntimeInstance::new("8.3", 9083, 2083),
            RuntimeInstance {
                enabled: false,
                ..RuntimeInstance::new("8.2", 9082, 2082)
            },
            RuntimeInstance::new("8.2", 9182, 2182),
        ]);
        let versions: Vec<_> = table.instances().into_iter().map(|r| r.version).collect();
        assert_eq!(versions, vec!["8.2", "8.3"]);

        assert_eq!(table.get("8.2").unwrap().port, 9182);
        assert!(table.is_enabled("8.2"));
        assert_eq!(table.enabled().len(), 2);
        assert!(!table.is_enabled("7.4"));
    }

    #[test]
    fn test_vec_catalog() {
        let runtimes = vec![RuntimeInstance::new("8.3", 9001, 2001)];
        assert_eq!(RuntimeCatalog::get(&runtimes, "8.3").unwrap().port, 9001);
        assert!(RuntimeCatalog::get(&runtimes, "8.4").is_none());
        assert!(runtimes.is_enabled("8.3"));
    }
}
