use crate::config::types::Result;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Atomically replace a file: write to temp → fsync → rename → fsync parent dir.
/// A crash at any point leaves either the old or the new document, never a torn one.
/// Parent directories are created as needed.
pub fn atomic_write(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent dir"))?;

    fs::create_dir_all(parent)?;

    // Same directory as the target so the rename never crosses filesystems
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        target.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    let written = (|| {
        let mut f = fs::File::create(&temp_path)?;
        f.write_all(content)?;
        f.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    // ext4/xfs can lose a rename without the parent fsync
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Serialize `value` as pretty JSON and replace `target` atomically
pub fn atomic_write_json<T: Serialize + ?Sized>(target: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    atomic_write(target, &data)?;
    Ok(())
}
