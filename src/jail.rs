//! Build pipeline and jail entry
//!
//! The build phase is unconditionally idempotent: every step fills in
//! whatever a previous (possibly interrupted) run left missing and
//! skips whatever is already in place. Entry then replaces this
//! process with the jail command.

use crate::caps::{self, CapabilityController};
use crate::config::{JailConfig, KEEP_CAPS};
use crate::error::{Error, Result};
use crate::ops::SysOps;
use crate::{mounts, provision};
use log::debug;
use nix::unistd::{chdir, chroot, execvp};
use std::convert::Infallible;
use std::ffi::CString;

/// Run the full build phase against the jail root
pub fn build(config: &JailConfig, ops: &dyn SysOps) -> Result<()> {
    debug!("building jail at {}", config.root.display());
    provision::create_skeleton(&config.root)?;
    provision::seed_files(&config.root, ops)?;
    mounts::mirror_system_dirs(&config.root, ops)?;
    mounts::apply_custom_binds(&config.root, &config.binds, ops)?;
    provision::create_device_nodes(&config.root, ops)?;
    Ok(())
}

/// Enter the jail and replace this process with `command`
///
/// Changes root to the jail, resets the working directory to `/`,
/// drops capabilities, and execs. On success this never returns; the
/// caller must treat a return as failure.
pub fn enter(
    config: &JailConfig,
    ctl: &dyn CapabilityController,
) -> Result<Infallible> {
    if config.command.is_empty() {
        return Err(Error::Config("no command to execute".to_string()));
    }
    chroot(&config.root).map_err(|e| Error::Syscall {
        op: "chroot",
        path: config.root.clone(),
        source: e,
    })?;
    chdir("/").map_err(|e| Error::Syscall {
        op: "chdir",
        path: "/".into(),
        source: e,
    })?;

    caps::drop_capabilities(ctl, KEEP_CAPS);

    let argv = to_cstrings(&config.command)?;
    let err = match execvp(&argv[0], &argv) {
        Err(e) => e,
        Ok(never) => match never {},
    };
    Err(Error::Exec {
        command: config.command[0].clone(),
        source: err,
    })
}

fn to_cstrings(args: &[String]) -> Result<Vec<CString>> {
    args.iter()
        .map(|a| {
            CString::new(a.as_str())
                .map_err(|_| Error::Config(format!("command argument contains nul: {a:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::PrctlCaps;
    use crate::config::{NEW_DIRS, TEMP_DIRS};
    use crate::ops::recording::{Call, RecordingOps};
    use tempfile::TempDir;

    fn config_for(root: &std::path::Path, command: Vec<String>) -> JailConfig {
        JailConfig::new(
            Some(root.to_string_lossy().into_owned()),
            vec![],
            false,
            command,
        )
        .unwrap()
    }

    #[test]
    fn test_build_produces_skeleton_and_mounts() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), vec![]);
        let ops = RecordingOps::new();
        build(&config, &ops).unwrap();

        for dir in NEW_DIRS.iter().chain(TEMP_DIRS) {
            assert!(tmp.path().join(dir).is_dir(), "missing {dir}");
        }

        let calls = ops.calls();
        // /usr/bin is a real directory on any Linux host (unlike /bin,
        // which may be a usr-merge symlink), so its read-only mirror
        // must have been requested
        assert!(calls.contains(&Call::BindMount {
            source: "/usr/bin".into(),
            target: tmp.path().join("usr/bin"),
        }));
        assert!(calls.contains(&Call::RemountReadOnly {
            target: tmp.path().join("usr/bin"),
        }));
        // all four device nodes
        let nodes = calls
            .iter()
            .filter(|c| matches!(c, Call::MakeDeviceNode { .. }))
            .count();
        assert_eq!(nodes, 4);
    }

    #[test]
    fn test_enter_reports_chroot_failure() {
        // unprivileged chroot into a nonexistent directory must fail
        // before anything else happens
        let config = config_for(
            std::path::Path::new("/no/such/jail"),
            vec!["true".to_string()],
        );
        let err = enter(&config, &PrctlCaps).unwrap_err();
        assert!(matches!(err, Error::Syscall { op: "chroot", .. }));
    }

    #[test]
    fn test_to_cstrings_rejects_nul() {
        let err = to_cstrings(&["tr\0ue".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
