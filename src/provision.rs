//! Directory skeleton, seeded files, and device nodes
//!
//! Every step here is idempotent: re-running against a partially built
//! jail only fills in whatever is still missing.

use crate::config::{COPY_FILES, NEW_DIRS, TEMP_DIRS};
use crate::error::{Error, Result};
use crate::ops::SysOps;
use log::debug;
use std::fs;
use std::io;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};

/// Shared scratch directory mode: sticky bit, world rwx
const STICKY_WORLD_RWX: u32 = 0o1777;

/// Character device nodes created under `dev/`
const DEVICE_NODES: &[(&str, u64, u64, u32)] = &[
    ("null", 1, 3, 0o666),
    ("zero", 1, 5, 0o666),
    ("random", 1, 9, 0o444),
    ("urandom", 1, 9, 0o444),
];

/// Create `path` and all missing ancestors
///
/// Walks the path component by component rather than recursing, and
/// treats an already existing `path` of any type as success.
pub fn ensure_directory(path: &Path) -> Result<()> {
    let mut cur = PathBuf::new();
    for comp in path.components() {
        cur.push(comp);
        if cur.symlink_metadata().is_ok() {
            continue;
        }
        match fs::create_dir(&cur) {
            Ok(()) => {}
            // lost the race with another component creating it
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(Error::fs("mkdir", &cur, e)),
        }
    }
    Ok(())
}

/// Build the directory skeleton under the jail root
///
/// Creates `NEW_DIRS` and `TEMP_DIRS`, forces the sticky
/// world-writable mode onto the temp directories (mkdir modes do not
/// guarantee the sticky bit), and links `var/lock` to `../run/lock`.
pub fn create_skeleton(root: &Path) -> Result<()> {
    for dir in NEW_DIRS {
        ensure_directory(&root.join(dir))?;
    }
    for dir in TEMP_DIRS {
        let path = root.join(dir);
        ensure_directory(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(STICKY_WORLD_RWX))
            .map_err(|e| Error::fs("chmod", &path, e))?;
    }

    let var_lock = root.join("var/lock");
    if var_lock.symlink_metadata().is_err() {
        symlink("../run/lock", &var_lock).map_err(|e| Error::fs("symlink", &var_lock, e))?;
    }
    Ok(())
}

/// Seed identity and resolver files from the host
///
/// Files already present in the jail are treated as caller-customized
/// and never overwritten.
pub fn seed_files(root: &Path, ops: &dyn SysOps) -> Result<()> {
    for rel in COPY_FILES {
        let jail = root.join(rel);
        if jail.symlink_metadata().is_ok() {
            debug!("seed: {} already present, keeping", jail.display());
            continue;
        }
        let host = Path::new("/").join(rel);
        ops.copy_file(&host, &jail)?;
    }
    Ok(())
}

/// Create the minimal character device nodes under `dev/`
pub fn create_device_nodes(root: &Path, ops: &dyn SysOps) -> Result<()> {
    let dev = root.join("dev");
    ensure_directory(&dev)?;
    for (name, major, minor, mode) in DEVICE_NODES {
        let path = dev.join(name);
        if path.symlink_metadata().is_ok() {
            debug!("device node {} already present", path.display());
            continue;
        }
        ops.make_device_node(&path, *major, *minor, *mode)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::recording::{Call, RecordingOps};
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directory_deep() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a/b/c/d");
        ensure_directory(&deep).unwrap();
        assert!(deep.is_dir());
        // second run is a no-op success
        ensure_directory(&deep).unwrap();
    }

    #[test]
    fn test_ensure_directory_existing_file_is_noop() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("occupied");
        fs::write(&file, b"x").unwrap();
        ensure_directory(&file).unwrap();
        assert!(file.is_file());
    }

    #[test]
    fn test_skeleton_layout() {
        let tmp = TempDir::new().unwrap();
        create_skeleton(tmp.path()).unwrap();

        for dir in NEW_DIRS.iter().chain(TEMP_DIRS) {
            assert!(tmp.path().join(dir).is_dir(), "missing {dir}");
        }
        for dir in TEMP_DIRS {
            let mode = tmp.path().join(dir).metadata().unwrap().mode();
            assert_eq!(mode & 0o7777, STICKY_WORLD_RWX, "wrong mode on {dir}");
        }

        let lock = tmp.path().join("var/lock");
        assert!(lock.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&lock).unwrap(), PathBuf::from("../run/lock"));

        // idempotent re-run
        create_skeleton(tmp.path()).unwrap();
    }

    #[test]
    fn test_seed_skips_existing() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("etc")).unwrap();
        fs::write(tmp.path().join("etc/passwd"), b"custom").unwrap();

        let ops = RecordingOps::new();
        seed_files(tmp.path(), &ops).unwrap();

        let calls = ops.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| match c {
            Call::CopyFile { dest, .. } => !dest.ends_with("etc/passwd"),
            _ => false,
        }));
        assert_eq!(
            fs::read(tmp.path().join("etc/passwd")).unwrap(),
            b"custom".to_vec()
        );
    }

    #[test]
    fn test_device_nodes_created_once() {
        let tmp = TempDir::new().unwrap();
        // stand-in for an already provisioned node
        fs::create_dir_all(tmp.path().join("dev")).unwrap();
        fs::write(tmp.path().join("dev/null"), b"").unwrap();

        let ops = RecordingOps::new();
        create_device_nodes(tmp.path(), &ops).unwrap();

        let calls = ops.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.contains(&Call::MakeDeviceNode {
            path: tmp.path().join("dev/zero"),
            major: 1,
            minor: 5,
            mode: 0o666,
        }));
        assert!(calls.contains(&Call::MakeDeviceNode {
            path: tmp.path().join("dev/random"),
            major: 1,
            minor: 9,
            mode: 0o444,
        }));
        assert!(calls.contains(&Call::MakeDeviceNode {
            path: tmp.path().join("dev/urandom"),
            major: 1,
            minor: 9,
            mode: 0o444,
        }));
    }
}
