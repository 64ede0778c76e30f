//! The log-writer addon loaded into the engine.
//!
//! It ships inside the binary. When no `--addon` path is configured, each session writes it
//! into a fresh private temp directory (random name, owner-only on unix) that is removed when
//! the session drops its `AddonScript`.
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

pub const CAPTURE_ADDON_SOURCE: &str = include_str!("../assets/capture_addon.py");

const ADDON_FILE_NAME: &str = "capture_addon.py";

/// Addon script handed to the engine for one session. Keep it alive until the engine stopped.
#[derive(Debug)]
pub struct AddonScript {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl AddonScript {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when this is the embedded addon in a session-owned directory.
    pub fn is_embedded(&self) -> bool {
        self.dir.is_some()
    }
}

fn write_into(dir: TempDir) -> io::Result<AddonScript> {
    let path = dir.path().join(ADDON_FILE_NAME);
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    f.write_all(CAPTURE_ADDON_SOURCE.as_bytes())?;
    f.sync_all()?;
    debug!(path = %path.display(), "materialized capture addon");
    Ok(AddonScript {
        path,
        dir: Some(dir),
    })
}

/// Write the embedded addon into a new private directory below `base`.
pub fn materialize_in(base: &Path) -> io::Result<AddonScript> {
    let dir = tempfile::Builder::new()
        .prefix("agent-battler-addon-")
        .tempdir_in(base)?;
    write_into(dir)
}

pub fn materialize() -> io::Result<AddonScript> {
    let dir = tempfile::Builder::new()
        .prefix("agent-battler-addon-")
        .tempdir()?;
    write_into(dir)
}

/// The configured addon, or a session copy of the embedded one.
pub fn resolve_addon(configured: Option<&Path>) -> io::Result<AddonScript> {
    match configured {
        Some(p) => Ok(AddonScript {
            path: p.to_path_buf(),
            dir: None,
        }),
        None => materialize(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_addon_registers_logfile_option() {
        assert!(CAPTURE_ADDON_SOURCE.contains("\"logfile\""));
        assert!(CAPTURE_ADDON_SOURCE.contains("addons = ["));
    }

    #[test]
    fn test_each_session_gets_its_own_copy() {
        let td = tempfile::tempdir().expect("tmpdir");
        let a = materialize_in(td.path()).expect("first");
        let b = materialize_in(td.path()).expect("second");
        assert_ne!(a.path(), b.path());
        assert!(a.is_embedded());
        assert_eq!(fs::read_to_string(a.path()).expect("read"), CAPTURE_ADDON_SOURCE);
        assert_eq!(fs::read_to_string(b.path()).expect("read"), CAPTURE_ADDON_SOURCE);
    }

    #[cfg(unix)]
    #[test]
    fn test_session_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let td = tempfile::tempdir().expect("tmpdir");
        let addon = materialize_in(td.path()).expect("materialize");
        let dir = addon.path().parent().expect("parent");
        let mode = fs::metadata(dir).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o077, 0, "dir mode {mode:o}");
    }

    #[test]
    fn test_drop_removes_session_copy() {
        let td = tempfile::tempdir().expect("tmpdir");
        let addon = materialize_in(td.path()).expect("materialize");
        let path = addon.path().to_path_buf();
        assert!(path.is_file());
        drop(addon);
        assert!(!path.exists());
        assert!(path.parent().is_some_and(|d| !d.exists()));
    }

    #[test]
    fn test_configured_path_wins() {
        let p = Path::new("/opt/custom_addon.py");
        let addon = resolve_addon(Some(p)).expect("resolve");
        assert_eq!(addon.path(), p);
        assert!(!addon.is_embedded());
    }
}
