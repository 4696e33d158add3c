//! Jail configuration and the static provisioning tables
//!
//! Everything the build pipeline creates or mirrors is driven by the
//! constant tables below; nothing mutates them at runtime.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Directories created empty under the jail root
pub const NEW_DIRS: &[&str] = &["etc", "run", "usr", "var/log"];

/// Shared scratch directories, chmod'ed to 01777 after creation
pub const TEMP_DIRS: &[&str] = &["tmp", "run/lock", "var/tmp"];

/// Host system directories mirrored into the jail (read-only bind
/// mount, or an equivalent symlink when the host path is itself one).
/// Entries missing on the host are skipped at startup.
pub const BIND_DIRS: &[&str] = &[
    "/bin",
    "/etc/alternatives",
    "/etc/ssl/certs",
    "/lib",
    "/lib64",
    "/sbin",
    "/usr/bin",
    "/usr/include",
    "/usr/lib",
    "/usr/lib64",
    "/usr/libexec",
    "/usr/sbin",
    "/usr/share",
    "/usr/src",
];

/// Host files copied verbatim into the jail when absent
pub const COPY_FILES: &[&str] = &["etc/group", "etc/passwd", "etc/resolv.conf"];

/// Capability indices that are never dropped
pub const KEEP_CAPS: &[i32] = &[];

/// A caller-specified bind mount, parsed from `SRC[:DEST]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    /// Absolute host path to mount
    pub source: PathBuf,
    /// Destination relative to the jail root
    pub dest: PathBuf,
}

impl BindSpec {
    /// Parse a `SRC[:DEST]` bind specification
    ///
    /// Both SRC and DEST must be absolute as given; DEST defaults to
    /// SRC and is stored relative to the jail root.
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let (source, dest) = match s.split_once(':') {
            Some((src, dst)) => (src, dst),
            None => (s, s),
        };
        if !source.starts_with('/') {
            return Err(format!("bind source must be absolute: {source}"));
        }
        if !dest.starts_with('/') {
            return Err(format!("bind destination must be absolute: {dest}"));
        }
        Ok(BindSpec {
            source: PathBuf::from(source),
            dest: PathBuf::from(dest.trim_start_matches('/')),
        })
    }
}

/// Validated per-invocation configuration
#[derive(Debug, Clone)]
pub struct JailConfig {
    /// Absolute jail root, trailing slash stripped
    pub root: PathBuf,
    /// Caller bind mounts, in the order given
    pub binds: Vec<BindSpec>,
    /// Teardown mode
    pub umount: bool,
    /// Command to run inside the jail; empty for build-only
    pub command: Vec<String>,
}

impl JailConfig {
    /// Validate the jail root and assemble the configuration
    ///
    /// Fails before any filesystem mutation when the root is missing
    /// or not absolute.
    pub fn new(
        root: Option<String>,
        binds: Vec<BindSpec>,
        umount: bool,
        command: Vec<String>,
    ) -> Result<Self> {
        let root = root.ok_or_else(|| Error::Config("--root is required".to_string()))?;
        if !root.starts_with('/') {
            return Err(Error::Config(format!(
                "--root must be an absolute path: {root}"
            )));
        }
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(JailConfig {
            root: PathBuf::from(root),
            binds,
            umount,
            command,
        })
    }

    /// Jail-internal path for an absolute host path
    pub fn jail_path(&self, host: &Path) -> PathBuf {
        let rel = host.strip_prefix("/").unwrap_or(host);
        self.root.join(rel)
    }
}

/// The `BIND_DIRS` entries that exist on this host
///
/// Uses `symlink_metadata` so a host entry which is itself a symlink
/// still counts as present.
pub fn existing_bind_dirs() -> Vec<&'static Path> {
    BIND_DIRS
        .iter()
        .map(Path::new)
        .filter(|p| p.symlink_metadata().is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_spec_with_dest() {
        let spec = BindSpec::parse("/data:/srv/data").unwrap();
        assert_eq!(spec.source, PathBuf::from("/data"));
        assert_eq!(spec.dest, PathBuf::from("srv/data"));
    }

    #[test]
    fn test_bind_spec_default_dest() {
        let spec = BindSpec::parse("/opt/app").unwrap();
        assert_eq!(spec.source, PathBuf::from("/opt/app"));
        assert_eq!(spec.dest, PathBuf::from("opt/app"));
    }

    #[test]
    fn test_bind_spec_relative_source() {
        assert!(BindSpec::parse("data:/srv/data").is_err());
    }

    #[test]
    fn test_bind_spec_relative_dest() {
        assert!(BindSpec::parse("/data:srv/data").is_err());
    }

    #[test]
    fn test_root_required() {
        let err = JailConfig::new(None, vec![], false, vec![]);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_root_must_be_absolute() {
        let err = JailConfig::new(Some("relative/path".to_string()), vec![], false, vec![]);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_root_trailing_slash_stripped() {
        let cfg = JailConfig::new(Some("/jail/".to_string()), vec![], false, vec![]).unwrap();
        assert_eq!(cfg.root, PathBuf::from("/jail"));
    }

    #[test]
    fn test_root_slash_survives() {
        let cfg = JailConfig::new(Some("/".to_string()), vec![], false, vec![]).unwrap();
        assert_eq!(cfg.root, PathBuf::from("/"));
    }

    #[test]
    fn test_jail_path() {
        let cfg = JailConfig::new(Some("/jail".to_string()), vec![], false, vec![]).unwrap();
        assert_eq!(
            cfg.jail_path(Path::new("/usr/bin")),
            PathBuf::from("/jail/usr/bin")
        );
    }

    #[test]
    fn test_existing_bind_dirs_subset() {
        // /bin and /usr/bin exist on any Linux host this runs on
        let dirs = existing_bind_dirs();
        assert!(dirs.contains(&Path::new("/bin")));
        assert!(dirs.len() <= BIND_DIRS.len());
    }
}
