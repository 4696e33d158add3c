//! Capability dropping via the bounding set
//!
//! Best-effort: a failed drop is logged and iteration continues. The
//! jail command must never inherit more privilege than the kernel
//! forces on us, but a partially dropped set is still better than
//! aborting the entry.

use crate::error::Result;
use log::{debug, warn};

/// Probe and drop individual capability indices
///
/// Production goes through `prctl(2)`; tests substitute a fake.
pub trait CapabilityController {
    /// Whether the running kernel defines this capability index
    fn is_defined(&self, index: i32) -> bool;

    /// Remove the capability from the bounding set
    fn drop_bound(&self, index: i32) -> Result<()>;
}

/// `prctl(PR_CAPBSET_READ / PR_CAPBSET_DROP)` implementation
pub struct PrctlCaps;

impl CapabilityController for PrctlCaps {
    fn is_defined(&self, index: i32) -> bool {
        // negative result means the index is past the last capability
        unsafe { libc::prctl(libc::PR_CAPBSET_READ, index as libc::c_ulong, 0, 0, 0) >= 0 }
    }

    fn drop_bound(&self, index: i32) -> Result<()> {
        let rc = unsafe { libc::prctl(libc::PR_CAPBSET_DROP, index as libc::c_ulong, 0, 0, 0) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}

/// Drop every capability the kernel defines, except `keep`
///
/// Iterates indices from 0 until the first undefined one. Must run
/// before the process image is replaced.
pub fn drop_capabilities(ctl: &dyn CapabilityController, keep: &[i32]) {
    let mut index = 0;
    loop {
        if !keep.contains(&index) {
            if !ctl.is_defined(index) {
                break;
            }
            match ctl.drop_bound(index) {
                Ok(()) => debug!("dropped capability {index}"),
                Err(e) => warn!("failed to drop capability {index}: {e}"),
            }
        }
        index += 1;
    }
}
