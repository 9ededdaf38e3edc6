//! Scoped read-only discipline: flips every non-originally-read-only
//! subvolume to read-only before sending, and restores writability on
//! every exit path (success, error, or panic unwind).

use crate::error::RoGuardError;
use crate::subvolume::Subvolume;
use crate::transport::Transport;

/// Engages the RO discipline for `subvolumes` and restores it when dropped.
///
/// `engage` iterates in enumeration order and aborts on the first failure
/// (the clone cannot proceed if the source can't be made read-only).
/// `disengage`, run from `Drop`, iterates in **reverse** order and treats
/// every failure as non-fatal: it is logged and skipped.
pub struct RoGuard<'a, 't> {
    transport: &'t dyn Transport,
    subvolumes: &'a [Subvolume],
    mount_override: Option<std::path::PathBuf>,
}

impl<'a, 't> RoGuard<'a, 't> {
    pub fn engage(
        transport: &'t dyn Transport,
        subvolumes: &'a [Subvolume],
    ) -> Result<Self, RoGuardError> {
        for sv in subvolumes {
            sv.set_ro(transport, true, None)
                .map_err(|source| RoGuardError::Engage {
                    path: sv.full_path(None),
                    source,
                })?;
        }
        Ok(Self {
            transport,
            subvolumes,
            mount_override: None,
        })
    }
}

impl<'a, 't> Drop for RoGuard<'a, 't> {
    fn drop(&mut self) {
        for sv in self.subvolumes.iter().rev() {
            if let Err(e) = sv.set_ro(self.transport, false, self.mount_override.as_deref()) {
                log::warn!(
                    "failed to restore read-write on {} (non-fatal): {e}",
                    sv.path.display()
                );
            }
        }
    }
}
