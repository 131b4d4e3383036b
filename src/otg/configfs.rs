//! ConfigFS file operations for USB Gadget

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, Result};

/// ConfigFS base path for USB gadgets on Android
pub const CONFIGFS_PATH: &str = "/config/usb_gadget";

/// Name of the file holding the bound UDC
pub const UDC_FILE: &str = "UDC";

/// Check if ConfigFS is available
pub fn is_configfs_available(root: &Path) -> bool {
    root.is_dir()
}

/// Find available UDC (USB Device Controller)
pub fn find_udc(class_dir: &Path) -> Option<String> {
    let mut names: Vec<String> = fs::read_dir(class_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Write string content to a file
///
/// A newline is appended and the whole buffer goes out in a single write()
/// syscall; configfs attributes only look at the first write.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| AppError::GadgetStep(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut data = Vec::with_capacity(content.len() + 1);
    data.extend_from_slice(content.as_bytes());
    if !content.ends_with('\n') {
        data.push(b'\n');
    }

    file.write_all(&data).map_err(|e| {
        AppError::GadgetStep(format!("Failed to write to {}: {}", path.display(), e))
    })?;
    file.sync_all().ok();

    Ok(())
}

/// Write binary content to a file
pub fn write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        AppError::GadgetStep(format!("Failed to create {}: {}", path.display(), e))
    })?;

    file.write_all(data).map_err(|e| {
        AppError::GadgetStep(format!("Failed to write to {}: {}", path.display(), e))
    })
}

/// Read string content from a file
pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| AppError::GadgetStep(format!("Failed to read {}: {}", path.display(), e)))
}

/// Create directory and parents if missing
pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        AppError::GadgetStep(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ))
    })
}

/// Remove an empty directory (configfs function dirs count as empty)
pub fn remove_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir(path).map_err(|e| {
            AppError::GadgetStep(format!(
                "Failed to remove directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Whether `path` itself is a symlink, dangling or not
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Remove a file or symlink if present
pub fn remove_file(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path).map_err(|e| {
            AppError::GadgetStep(format!("Failed to remove {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

/// Create symlink `dest` pointing at `src`
pub fn create_symlink(src: &Path, dest: &Path) -> Result<()> {
    std::os::unix::fs::symlink(src, dest).map_err(|e| {
        AppError::GadgetStep(format!(
            "Failed to create symlink {} -> {}: {}",
            dest.display(),
            src.display(),
            e
        ))
    })
}

/// Symlinks in `dir` paired with their fully resolved targets
///
/// Relative targets do not survive being recreated inside configfs, so links
/// are captured by their canonical path. Links that fail to resolve are skipped.
pub fn list_symlinks(dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppError::GadgetStep(format!("Failed to list {}: {}", dir.display(), e))
    })?;

    let mut links: Vec<(PathBuf, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| is_symlink(p))
        .filter_map(|link| match fs::canonicalize(&link) {
            Ok(target) => Some((link, target)),
            Err(e) => {
                debug!("Skipping unresolvable link {}: {}", link.display(), e);
                None
            }
        })
        .collect();
    links.sort();
    Ok(links)
}

/// Sorted directory entries of `dir`
pub fn list_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppError::GadgetStep(format!("Failed to list {}: {}", dir.display(), e))
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_file_appends_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("protocol");

        // Attributes are never created by writing them
        assert!(write_file(&path, "1").is_err());
        assert!(!path.exists());

        fs::write(&path, b"").unwrap();
        write_file(&path, "1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1\n");
        assert_eq!(read_file(&path).unwrap(), "1");

        write_file(&path, "\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "\n");
    }

    #[test]
    fn test_list_symlinks_resolves_targets() {
        let dir = tempdir().unwrap();
        let functions = dir.path().join("functions");
        let config = dir.path().join("configs/b.1");
        create_dir(&functions.join("ffs.adb")).unwrap();
        create_dir(&config).unwrap();

        // Relative target
        create_symlink(Path::new("../../functions/ffs.adb"), &config.join("f1")).unwrap();
        // Dangling link
        create_symlink(&dir.path().join("nowhere"), &config.join("f2")).unwrap();
        fs::write(config.join("strings"), b"").unwrap();

        let links = list_symlinks(&config).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, config.join("f1"));
        assert_eq!(links[0].1, fs::canonicalize(functions.join("ffs.adb")).unwrap());

        assert!(is_symlink(&config.join("f2")));
        remove_file(&config.join("f2")).unwrap();
        assert!(!is_symlink(&config.join("f2")));
    }

    #[test]
    fn test_find_udc() {
        let dir = tempdir().unwrap();
        assert_eq!(find_udc(&dir.path().join("missing")), None);

        create_dir(&dir.path().join("musb-hdrc.0")).unwrap();
        assert_eq!(find_udc(dir.path()).as_deref(), Some("musb-hdrc.0"));
    }
}
