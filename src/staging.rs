//! Scoped staging directory on the destination: subvolumes land here before
//! being moved into their final tree position.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StagingError, TransportError};
use crate::random::random_token;
use crate::subvolume::Subvolume;
use crate::transport::Transport;

/// A scoped base directory on the destination mount. Receives land in
/// per-subvolume sub-directories under it; on drop, every received
/// subvolume is moved to its final tree position and the base directory
/// is removed.
pub struct StagingArea<'a, 't> {
    transport: &'t dyn Transport,
    new_mount: PathBuf,
    base: PathBuf,
    subvolumes: &'a [Subvolume],
    dry_run: bool,
}

impl<'a, 't> StagingArea<'a, 't> {
    pub fn new(
        transport: &'t dyn Transport,
        new_mount: &Path,
        snap_base: Option<&str>,
        subvolumes: &'a [Subvolume],
        dry_run: bool,
    ) -> Result<Self, StagingError> {
        let name = snap_base
            .map(str::to_string)
            .unwrap_or_else(random_token);
        let base = new_mount.join(name);
        if !dry_run && !base.is_dir() {
            fs::create_dir(&base).map_err(|e| StagingError::CreateBase(base.clone(), e))?;
        }
        Ok(Self {
            transport,
            new_mount: new_mount.to_path_buf(),
            base,
            subvolumes,
            dry_run,
        })
    }

    /// `<base>/<sv.id>`: the sub-directory `sv` is received into.
    pub fn sub_dir(&self, sv: &Subvolume) -> PathBuf {
        self.base.join(sv.id.to_string())
    }

    /// Receives `sv` from `source_path` into its sub-directory, unless a
    /// directory of the expected name already exists there (idempotent
    /// replay).
    pub fn receive(
        &self,
        sv: &Subvolume,
        source_path: &Path,
        parent: Option<&Path>,
        clone_sources: &[PathBuf],
    ) -> Result<(), StagingError> {
        let dir = self.sub_dir(sv);
        if !self.dry_run && !dir.is_dir() {
            fs::create_dir(&dir).map_err(|e| StagingError::CreateBase(dir.clone(), e))?;
        }

        let basename = source_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| sv.path.clone());
        let new_path = dir.join(&basename);

        if new_path.is_dir() {
            log::info!("{} exists, not sending", new_path.display());
            return Ok(());
        }

        self.transport
            .pipe_send_receive(source_path, &dir, parent, clone_sources)?;

        if !sv.ro_initial && !self.dry_run {
            self.transport.set_ro(&new_path, false)?;
        }

        Ok(())
    }
}

impl<'a, 't> Drop for StagingArea<'a, 't> {
    fn drop(&mut self) {
        if self.dry_run {
            return;
        }

        let mut ordered: Vec<&Subvolume> = self.subvolumes.iter().collect();
        ordered.sort_by_key(|sv| (sv.parent_id, sv.id));

        let mut done: HashSet<u64> = HashSet::new();
        for sv in ordered {
            move_to_tree_position(self.transport, sv, &self.new_mount, self, &mut done);
        }

        if let Err(e) = fs::remove_dir(&self.base) {
            log::warn!(
                "failed to remove {} (non-fatal): {e}",
                self.base.display()
            );
        }
    }
}

/// Moves a received subvolume from its staging sub-directory into its
/// final tree position, honoring parent-id ordering.
fn move_to_tree_position(
    transport: &dyn Transport,
    sv: &Subvolume,
    new_mount: &Path,
    staging: &StagingArea,
    done: &mut HashSet<u64>,
) {
    let goal = sv.full_path(Some(new_mount));
    let last = match goal.file_name() {
        Some(name) => PathBuf::from(name),
        None => return,
    };
    let dir = staging.sub_dir(sv);
    let current = dir.join(&last);

    if !current.is_dir() {
        if goal.is_dir() {
            log::debug!("{} already moved", goal.display());
        } else {
            log::error!("{} was not created", current.display());
        }
        return;
    }

    if sv.parent_id != 5 && !done.contains(&sv.parent_id) {
        log::error!(
            "parent {} of {} not found among already-moved subvolumes",
            sv.parent_id,
            sv.id
        );
        return;
    }

    let parent_dir = match goal.parent() {
        Some(p) => p,
        None => return,
    };

    if sv.ro_initial {
        if let Err(e) = transport.set_ro(&current, false) {
            log::warn!("failed to clear ro on {} before move: {e}", current.display());
        }
    }

    let result = move_dir(&current, parent_dir);

    if sv.ro_initial {
        for path in [&goal, &current] {
            if path.is_dir() {
                if let Err(e) = transport.set_ro(path, true) {
                    log::warn!("failed to restore ro on {}: {e}", path.display());
                }
            }
        }
    }

    if let Err(e) = result {
        log::error!("failed to move {} into {}: {e}", current.display(), parent_dir.display());
        return;
    }

    done.insert(sv.id);
    if let Err(e) = fs::remove_dir(&dir) {
        log::warn!("failed to remove {} (non-fatal): {e}", dir.display());
    }
}

/// Cross-subvolume-safe rename: plain `rename` fails across subvolume
/// boundaries on Btrfs, so fall back to invoking `mv`.
fn move_dir(source: &Path, dest_dir: &Path) -> Result<(), TransportError> {
    if fs::rename(source, dest_dir.join(source.file_name().unwrap_or_default())).is_ok() {
        return Ok(());
    }
    let status = std::process::Command::new("mv")
        .arg("-f")
        .arg("-t")
        .arg(dest_dir)
        .arg(source)
        .status()
        .map_err(|source_err| TransportError::Spawn {
            command: format!("mv -f -t {} {}", dest_dir.display(), source.display()),
            source: source_err,
        })?;
    if !status.success() {
        return Err(TransportError::SendReceive {
            path: source.to_path_buf(),
            reason: format!("mv exited with status {}", status.code().unwrap_or(-1)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subvolume::tests_support::sv;
    use crate::transport::SubvolumeShow;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeTransport {
        sent: RefCell<Vec<(PathBuf, PathBuf)>>,
    }

    impl Transport for FakeTransport {
        fn list_subvolume_paths(&self, _mount: &Path) -> Result<Vec<PathBuf>, TransportError> {
            unimplemented!()
        }
        fn introspect(&self, _mount: &Path, _path: &Path) -> Result<SubvolumeShow, TransportError> {
            unimplemented!()
        }
        fn get_ro(&self, _path: &Path) -> Result<bool, TransportError> {
            unimplemented!()
        }
        fn set_ro(&self, _path: &Path, _ro: bool) -> Result<(), TransportError> {
            Ok(())
        }
        fn pipe_send_receive(
            &self,
            source_path: &Path,
            dest_dir: &Path,
            _parent: Option<&Path>,
            _clone_sources: &[PathBuf],
        ) -> Result<(), TransportError> {
            self.sent
                .borrow_mut()
                .push((source_path.to_path_buf(), dest_dir.to_path_buf()));
            // Simulate `btrfs receive` creating the subvolume directory.
            fs::create_dir_all(dest_dir.join(source_path.file_name().unwrap())).ok();
            Ok(())
        }
        fn snapshot_ro(&self, _src: &Path, _dst: &Path) -> Result<(), TransportError> {
            unimplemented!()
        }
        fn delete(&self, _path: &Path) -> Result<(), TransportError> {
            unimplemented!()
        }
        fn filesystem_uuid(&self, _mount: &Path) -> Result<String, TransportError> {
            unimplemented!()
        }
    }

    #[test]
    fn sub_dir_is_base_joined_with_id() {
        let dir = tempdir().unwrap();
        let subvols = vec![sv(101, 5, "a", None, 1, 1)];
        let transport = FakeTransport::default();
        let staging = StagingArea::new(&transport, dir.path(), Some("stage"), &subvols, false).unwrap();
        assert_eq!(staging.sub_dir(&subvols[0]), dir.path().join("stage").join("101"));
    }

    #[test]
    fn receive_is_idempotent_on_replay() {
        let dir = tempdir().unwrap();
        let mut top = sv(101, 5, "a", None, 1, 1);
        top.path = PathBuf::from("home");
        let subvols = vec![top];
        let transport = FakeTransport::default();
        let staging = StagingArea::new(&transport, dir.path(), Some("stage"), &subvols, false).unwrap();

        let source = subvols[0].full_path(None);
        staging.receive(&subvols[0], &source, None, &[]).unwrap();
        staging.receive(&subvols[0], &source, None, &[]).unwrap();

        assert_eq!(transport.sent.borrow().len(), 1);
    }

    #[test]
    fn move_to_tree_position_places_top_level_child_directly() {
        let dir = tempdir().unwrap();
        let mut top = sv(101, 5, "home", None, 1, 1);
        top.path = PathBuf::from("home");
        top.ro_initial = false;
        let subvols = vec![top];
        let transport = FakeTransport::default();

        {
            let staging = StagingArea::new(&transport, dir.path(), Some("stage"), &subvols, false).unwrap();
            let source = subvols[0].full_path(None);
            staging.receive(&subvols[0], &source, None, &[]).unwrap();
        }

        assert!(dir.path().join("home").is_dir());
        assert!(!dir.path().join("stage").exists());
    }
}
