//! Bind-mount mirroring and the unmount reconciler
//!
//! Host system directories are mirrored into the jail either as
//! read-only bind mounts or, when the host path is itself a symlink,
//! as an equivalent symlink. "Destination directory is empty" is the
//! idempotency heuristic deciding whether a mount is still needed; a
//! non-empty destination is assumed already mounted and left alone.

use crate::config::{self, BindSpec};
use crate::error::{Error, Result};
use crate::ops::SysOps;
use crate::provision::ensure_directory;
use log::debug;
use std::fs;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

/// Dropped into an empty custom-bind source before mounting, so the
/// emptiness heuristic keeps treating a deliberately mounted empty
/// source the same way on later runs.
const MARKER_FILE: &str = ".brig-bind";

/// Kernel mount table, locale-independent by construction
const MOUNT_TABLE: &str = "/proc/mounts";

fn dir_is_empty(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path).map_err(|e| Error::fs("read dir", path, e))?;
    Ok(entries.next().is_none())
}

/// Mirror one host directory into the jail
fn mirror_dir(root: &Path, host: &Path, ops: &dyn SysOps) -> Result<()> {
    let rel = host.strip_prefix("/").unwrap_or(host);
    let jail = root.join(rel);

    let meta = host
        .symlink_metadata()
        .map_err(|e| Error::fs("stat", host, e))?;

    if meta.file_type().is_symlink() {
        let already_linked = jail
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if already_linked {
            debug!("mirror: {} already a symlink", jail.display());
            return Ok(());
        }
        let target = fs::read_link(host).map_err(|e| Error::fs("readlink", host, e))?;
        if let Some(parent) = jail.parent() {
            ensure_directory(parent)?;
        }
        symlink(&target, &jail).map_err(|e| Error::fs("symlink", &jail, e))?;
        return Ok(());
    }

    ensure_directory(&jail)?;
    if dir_is_empty(&jail)? {
        ops.bind_mount(host, &jail)?;
        ops.remount_read_only(&jail)?;
    } else {
        debug!("mirror: {} not empty, assuming mounted", jail.display());
    }
    Ok(())
}

fn mirror_all<'a, I>(root: &Path, hosts: I, ops: &dyn SysOps) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    for host in hosts {
        mirror_dir(root, host, ops)?;
    }
    Ok(())
}

/// Mirror every host system directory that exists into the jail
pub fn mirror_system_dirs(root: &Path, ops: &dyn SysOps) -> Result<()> {
    mirror_all(root, config::existing_bind_dirs(), ops)
}

/// Apply caller-specified bind mounts
///
/// Unlike the system mirrors these stay read-write. An empty source
/// directory gets a marker file first (see `MARKER_FILE`).
pub fn apply_custom_binds(root: &Path, binds: &[BindSpec], ops: &dyn SysOps) -> Result<()> {
    for spec in binds {
        if spec.source.is_dir() && dir_is_empty(&spec.source)? {
            ops.create_marker_file(&spec.source.join(MARKER_FILE))?;
        }

        let dest = root.join(&spec.dest);
        ensure_directory(&dest)?;
        if dir_is_empty(&dest)? {
            ops.bind_mount(&spec.source, &dest)?;
        } else {
            debug!("bind: {} not empty, assuming mounted", dest.display());
        }
    }
    Ok(())
}

/// One line of the mount table; only the mount point matters here
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_point: PathBuf,
}

/// A point-in-time snapshot of the mount table
#[derive(Debug)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Snapshot the mount table of the current process
    pub fn current() -> Result<Self> {
        let path = Path::new(MOUNT_TABLE);
        let contents = fs::read_to_string(path).map_err(|e| Error::fs("open", path, e))?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, origin: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        for (lino, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            // lines like:
            // /dev/sda1 /mnt/point ext4 rw,relatime 0 0
            // where whitespace in the mount point is octal-escaped
            let mount_point = line.split_ascii_whitespace().nth(1).ok_or_else(|| {
                Error::MountTableParse {
                    path: origin.to_path_buf(),
                    msg: format!("line {lino}: missing mount point field"),
                }
            })?;
            entries.push(MountEntry {
                mount_point: unescape_octal(mount_point),
            });
        }
        Ok(MountTable { entries })
    }

    /// Mount points strictly below `root`, in table order
    pub fn under<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = &'a MountEntry> {
        self.entries
            .iter()
            .filter(move |e| e.mount_point.starts_with(root) && e.mount_point != root)
    }
}

/// Decode the `\040`-style octal escapes used in /proc/mounts
fn unescape_octal(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            // expect exactly three octal digits
            if let Some(oct) = bytes.get(i + 1..i + 4) {
                if oct.iter().all(|b| (b'0'..=b'7').contains(b)) {
                    let val =
                        (oct[0] - b'0') as u32 * 64 + (oct[1] - b'0') as u32 * 8 + (oct[2] - b'0') as u32;
                    out.push(val as u8);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(std::ffi::OsString::from_vec(out))
}

/// Unmount everything mounted below the jail root
///
/// Refuses to run when the root does not exist. Unmount order follows
/// table enumeration order, which is not guaranteed deepest-first;
/// nested binds can fail on a still-occupied parent.
pub fn teardown(root: &Path, ops: &dyn SysOps) -> Result<()> {
    if root.symlink_metadata().is_err() {
        return Err(Error::JailMissing(root.to_path_buf()));
    }
    let table = MountTable::current()?;
    reconcile(root, &table, ops)
}

/// Issue an unmount for each table entry below `root`
pub fn reconcile(root: &Path, table: &MountTable, ops: &dyn SysOps) -> Result<()> {
    for entry in table.under(root) {
        ops.unmount(&entry.mount_point)?;
    }
    Ok(())
}
