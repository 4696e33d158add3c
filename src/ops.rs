//! Side-effecting system operations behind a trait
//!
//! The build and teardown pipelines only ever touch mounts, device
//! nodes, and file copies through [`SysOps`]. The production
//! implementation issues the syscalls directly; tests substitute a
//! recording implementation that never touches the filesystem.

use crate::error::{Error, Result};
use log::debug;
use nix::mount::{MsFlags, mount, umount};
use nix::sys::stat::{Mode, SFlag, makedev, mknod};
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Mount, copy, and device-node primitives used by the pipelines
pub trait SysOps {
    /// Bind-mount `source` onto `target`
    fn bind_mount(&self, source: &Path, target: &Path) -> Result<()>;

    /// Remount an existing bind mount read-only
    fn remount_read_only(&self, target: &Path) -> Result<()>;

    /// Unmount the filesystem mounted at `target`
    fn unmount(&self, target: &Path) -> Result<()>;

    /// Copy a file preserving mode and modification time
    fn copy_file(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Create a character device node
    fn make_device_node(&self, path: &Path, major: u64, minor: u64, mode: u32) -> Result<()>;

    /// Create an empty marker file
    fn create_marker_file(&self, path: &Path) -> Result<()>;
}

/// Production implementation issuing the underlying syscalls
pub struct RealOps;

impl SysOps for RealOps {
    fn bind_mount(&self, source: &Path, target: &Path) -> Result<()> {
        debug!("bind mount {} -> {}", source.display(), target.display());
        mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| Error::Mount {
            op: "bind mount",
            path: target.to_path_buf(),
            source: e,
        })
    }

    fn remount_read_only(&self, target: &Path) -> Result<()> {
        debug!("remount read-only {}", target.display());
        mount(
            None::<&str>,
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .map_err(|e| Error::Mount {
            op: "read-only remount",
            path: target.to_path_buf(),
            source: e,
        })
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        debug!("unmount {}", target.display());
        umount(target).map_err(|e| Error::Mount {
            op: "unmount",
            path: target.to_path_buf(),
            source: e,
        })
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<()> {
        debug!("copy {} -> {}", source.display(), dest.display());
        // fs::copy carries the permission bits; timestamps need a
        // separate utimensat call.
        let meta = fs::metadata(source).map_err(|e| Error::CopyFailed {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: e,
        })?;
        fs::copy(source, dest).map_err(|e| Error::CopyFailed {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: e,
        })?;

        let times = [
            libc::timespec {
                tv_sec: meta.atime(),
                tv_nsec: meta.atime_nsec(),
            },
            libc::timespec {
                tv_sec: meta.mtime(),
                tv_nsec: meta.mtime_nsec(),
            },
        ];
        let cpath = CString::new(dest.as_os_str().as_bytes()).map_err(|_| Error::CopyFailed {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: std::io::Error::other("path contains interior nul"),
        })?;
        let rc = unsafe { libc::utimensat(libc::AT_FDCWD, cpath.as_ptr(), times.as_ptr(), 0) };
        if rc != 0 {
            return Err(Error::CopyFailed {
                from: source.to_path_buf(),
                to: dest.to_path_buf(),
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn make_device_node(&self, path: &Path, major: u64, minor: u64, mode: u32) -> Result<()> {
        debug!("mknod {} c {}:{} {:o}", path.display(), major, minor, mode);
        mknod(
            path,
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(mode),
            makedev(major, minor),
        )
        .map_err(|e| Error::DeviceNode {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn create_marker_file(&self, path: &Path) -> Result<()> {
        debug!("marker file {}", path.display());
        fs::File::create(path).map_err(|e| Error::fs("create marker", path, e))?;
        Ok(())
    }
}
