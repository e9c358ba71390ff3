/// Persists generated documents where the proxy processes read them
use crate::config::loader::HostboxConfig;
use crate::config::types::Result;
use crate::config::validator::validate_runtime_version;
use crate::proxy::generator::RenderedConfig;
use crate::safety::atomic_write;
use std::path::{Path, PathBuf};

pub const FRONT_DOOR_FILE: &str = "Caddyfile.proxy";

pub fn instance_file_name(version: &str) -> String {
    format!("Caddyfile.php-{}", version)
}

/// Writes every document with temp-file, fsync and rename, so a reader
/// sees either the previous or the new document, never a torn one.
#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn from_config(config: &HostboxConfig) -> Self {
        Self::new(&config.output_dir)
    }

    pub fn front_door_path(&self) -> PathBuf {
        self.output_dir.join(FRONT_DOOR_FILE)
    }

    pub fn instance_path(&self, version: &str) -> Result<PathBuf> {
        validate_runtime_version(version)?;
        Ok(self.output_dir.join(instance_file_name(version)))
    }

    pub fn write_front_door(&self, content: &str) -> Result<PathBuf> {
        let path = self.front_door_path();
        atomic_write(&path, content.as_bytes())?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }

    pub fn write_instance(&self, version: &str, content: &str) -> Result<PathBuf> {
        let path = self.instance_path(version)?;
        atomic_write(&path, content.as_bytes())?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Write the front door and every instance document, in version order
    pub fn write_all(&self, rendered: &RenderedConfig) -> Result<Vec<PathBuf>> {
        let mut written = vec![self.write_front_door(&rendered.front_door)?];
        for (version, content) in &rendered.instances {
            written.push(self.write_instance(version, content)?);
        }
        log::info!(
            "Wrote {} proxy documents to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }
}
