//! The in-memory subvolume model.

use std::path::{Path, PathBuf};

use crate::error::TransportError;
use crate::transport::Transport;

/// Max difference between `gen` and `ogen` still considered "static"
/// (i.e. an unmodified read-only snapshot).
pub const MAX_STATIC: u64 = 1;

/// One Btrfs subvolume, as enumerated from a mounted file system.
///
/// Immutable after construction: fields are never mutated post-enumeration,
/// only read. Completion bookkeeping (which subvolumes have been sent,
/// which have been moved into place) lives in caller-owned sets, not here.
#[derive(Debug, Clone)]
pub struct Subvolume {
    /// Absolute path where the source file system's top subvolume is mounted.
    pub mount_root: PathBuf,
    /// Path of this subvolume relative to `mount_root`.
    pub path: PathBuf,
    /// 64-bit subvolume id; the top-level subvolume has id 5.
    pub id: u64,
    /// Id of the containing (tree) subvolume, distinct from the snapshot origin.
    pub parent_id: u64,
    pub uuid: String,
    /// Absent for roots and for subvolumes whose snapshot origin is gone.
    pub parent_uuid: Option<String>,
    /// Current generation counter at list time.
    pub gen: u64,
    /// Generation at creation ("origin generation").
    pub ogen: u64,
    /// Whether the subvolume was read-only at enumeration time.
    pub ro_initial: bool,
}

impl Subvolume {
    /// Construct a subvolume from `(mount, path)` by introspecting it.
    pub fn from_path(
        transport: &dyn Transport,
        mount: &Path,
        path: &Path,
    ) -> Result<Self, TransportError> {
        let show = transport.introspect(mount, path)?;
        Ok(Self {
            mount_root: mount.to_path_buf(),
            path: path.to_path_buf(),
            id: show.id,
            parent_id: show.parent_id,
            uuid: show.uuid,
            parent_uuid: show.parent_uuid,
            gen: show.gen,
            ogen: show.ogen,
            ro_initial: show.ro,
        })
    }

    /// Full path of this subvolume, optionally rooted at a different mount
    /// point (used to address the equivalent path on the destination).
    pub fn full_path(&self, mount_override: Option<&Path>) -> PathBuf {
        mount_override.unwrap_or(&self.mount_root).join(&self.path)
    }

    /// `gen - ogen <= MAX_STATIC`: a proxy for "never modified since snapshot".
    pub fn is_static(&self) -> bool {
        self.gen - self.ogen <= MAX_STATIC
    }

    /// Set the read-only property, unless this subvolume was natively
    /// read-only at enumeration time — we never re-enable writability on a
    /// subvolume that was already read-only before the clone started.
    pub fn set_ro(
        &self,
        transport: &dyn Transport,
        ro: bool,
        mount_override: Option<&Path>,
    ) -> Result<(), TransportError> {
        if self.ro_initial {
            return Ok(());
        }
        transport.set_ro(&self.full_path(mount_override), ro)
    }
}

impl std::fmt::Display for Subvolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.path.display(), self.id)
    }
}


#[cfg(test)]
mod tests {
    use super::tests_support::sv;

    #[test]
    fn static_iff_gen_minus_ogen_le_one() {
        assert!(sv(1, 5, "a", None, 10, 10).is_static());
        assert!(sv(1, 5, "a", None, 10, 11).is_static());
        assert!(!sv(1, 5, "a", None, 10, 12).is_static());
    }

    #[test]
    fn full_path_defaults_to_own_mount() {
        let s = sv(1, 5, "a", None, 10, 10);
        assert_eq!(s.full_path(None), s.mount_root.join(&s.path));
    }

    #[test]
    fn full_path_honors_override() {
        let s = sv(1, 5, "a", None, 10, 10);
        let new_mnt = std::path::Path::new("/mnt/new");
        assert_eq!(s.full_path(Some(new_mnt)), new_mnt.join(&s.path));
    }
}
