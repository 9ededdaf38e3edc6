//! Mounts a file system's top-level (id 5) subvolume at a throwaway mount
//! point so the clone can address every subvolume by a uniform path, and
//! unmounts it again on drop.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::MountError;
use crate::transport::Transport;

/// An active `subvolid=5` mount of a file system, torn down on drop.
///
/// Mirrors the reference tool's `atexit`-registered `umount -l` callback:
/// unmounting and removing the temporary mount point happens on every exit
/// path, and a failure to do so is logged, not propagated, since by the time
/// we're dropping there is nothing left to roll back to.
pub struct RootMount {
    path: PathBuf,
}

impl RootMount {
    /// Mounts the file system identified by `source`'s filesystem UUID at a
    /// fresh temporary directory.
    pub fn new(transport: &dyn Transport, source: &Path) -> Result<Self, MountError> {
        let path = tempfile_mkdtemp()?;
        let uuid = transport.filesystem_uuid(source)?;

        let status = Command::new("mount")
            .arg("-o")
            .arg("subvolid=5")
            .arg(format!("UUID={uuid}"))
            .arg(&path)
            .status()
            .map_err(|source| MountError::Mount {
                mount: path.clone(),
                source,
            })?;
        if !status.success() {
            return Err(MountError::Mount {
                mount: path.clone(),
                source: std::io::Error::other(format!(
                    "mount exited with status {}",
                    status.code().unwrap_or(-1)
                )),
            });
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootMount {
    fn drop(&mut self) {
        let unmounted = Command::new("umount")
            .arg("-l")
            .arg(&self.path)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !unmounted {
            log::warn!("failed to unmount {} (non-fatal)", self.path.display());
            return;
        }
        if let Err(e) = fs::remove_dir(&self.path) {
            log::warn!(
                "failed to remove temporary mount point {} (non-fatal): {e}",
                self.path.display()
            );
        }
    }
}

fn tempfile_mkdtemp() -> Result<PathBuf, MountError> {
    tempfile::Builder::new()
        .prefix("btrfs-clone-")
        .tempdir()
        .map(|dir| dir.keep())
        .map_err(MountError::TempDir)
}
