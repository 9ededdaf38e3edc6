//! The Replication Planner: four pluggable strategies that each decide, for
//! a working set of subvolumes, the send order plus a per-subvolume parent
//! and clone-source set.
//!
//! Planning is pure and side-effect free — it never touches the transport —
//! so the order and per-subvolume flags can be asserted on directly in
//! tests (determinism, topological soundness) without running `btrfs`.
//! [`execute`] walks a computed plan and drives the actual transfers.

pub mod chronological;
pub mod generation;
pub mod parent;
pub mod snapshot;

use std::path::{Path, PathBuf};

use crate::error::{PlanError, StagingError};
use crate::staging::StagingArea;
use crate::subvolume::Subvolume;
use crate::transport::Transport;

/// One planned transfer: the subvolume to send, its incremental base (if
/// any), and the additional clone sources to offer the transport.
#[derive(Debug)]
pub struct PlannedSend<'a> {
    pub subvolume: &'a Subvolume,
    pub parent: Option<&'a Subvolume>,
    pub clone_sources: Vec<&'a Subvolume>,
}

impl<'a> PlannedSend<'a> {
    fn new(subvolume: &'a Subvolume) -> Self {
        Self {
            subvolume,
            parent: None,
            clone_sources: Vec::new(),
        }
    }
}

/// Executes a plan produced by the `parent` strategy: every subvolume is
/// sent straight into its final destination directory, bypassing the
/// staging area entirely (see DESIGN.md for why this asymmetry is kept).
pub fn execute_direct(
    transport: &dyn Transport,
    new_mount: &Path,
    plan: &[PlannedSend],
) -> Result<(), PlanError> {
    for planned in plan {
        let sv = planned.subvolume;
        let source_path = sv.full_path(None);
        let dest_dir = sv
            .full_path(Some(new_mount))
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| new_mount.to_path_buf());

        let parent_path = planned.parent.map(|p| p.full_path(None));
        let clone_paths: Vec<PathBuf> = planned
            .clone_sources
            .iter()
            .map(|c| c.full_path(None))
            .collect();

        transport.pipe_send_receive(
            &source_path,
            &dest_dir,
            parent_path.as_deref(),
            &clone_paths,
        )?;

        if !sv.ro_initial {
            let dest_path = sv.full_path(Some(new_mount));
            transport.set_ro(&dest_path, false)?;
        }
    }
    Ok(())
}

/// Executes a plan produced by any of the staging-backed strategies
/// (`snapshot`, `chronological`, `generation`).
pub fn execute_via_staging(
    staging: &StagingArea,
    plan: &[PlannedSend],
) -> Result<(), StagingError> {
    for planned in plan {
        let sv = planned.subvolume;
        let source_path = sv.full_path(None);
        let parent_path = planned.parent.map(|p| p.full_path(None));
        let clone_paths: Vec<PathBuf> = planned
            .clone_sources
            .iter()
            .map(|c| c.full_path(None))
            .collect();

        staging.receive(sv, &source_path, parent_path.as_deref(), &clone_paths)?;
    }
    Ok(())
}
