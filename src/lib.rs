//! btrfs-clone — clones an entire Btrfs file system onto another one,
//! subvolume by subvolume, using incremental send/receive.
//!
//! [`run`] drives the whole pipeline: mount both top-level subvolumes,
//! check preconditions, clone the top-level subvolume, enumerate the
//! remaining subvolumes, and dispatch to the selected [`planner`] strategy.

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod mount;
pub mod planner;
pub mod random;
pub mod ro_guard;
pub mod staging;
pub mod subvolume;
pub mod toplevel;
pub mod transport;

use std::thread::sleep;
use std::time::Duration;

use config::{CloneConfig, Strategy};
use error::{CloneError, PreconditionError, Result};
use graph::SubvolumeGraph;
use mount::RootMount;
use planner::{execute_direct, execute_via_staging};
use ro_guard::RoGuard;
use staging::StagingArea;
use subvolume::Subvolume;
use transport::{BtrfsTransport, Transport};

/// Runs one clone from `config.source` to `config.dest`.
pub fn run(config: &CloneConfig) -> Result<()> {
    let transport = BtrfsTransport::new(&config.btrfs_binary, config.verbosity, config.dry_run);

    let old_mount = RootMount::new(&transport, &config.source)?;
    let new_mount = RootMount::new(&transport, &config.dest)?;

    check_preconditions(&transport, config, old_mount.path(), new_mount.path())?;

    if config.verbosity > 0 {
        log::info!("OLD mounted on {}", old_mount.path().display());
        log::info!("NEW mounted on {}", new_mount.path().display());
    }

    let new_root = toplevel::clone_toplevel(
        &transport,
        old_mount.path(),
        new_mount.path(),
        config.promote_toplevel,
        config.dry_run,
    )?;

    let subvolumes = enumerate_subvolumes(&transport, old_mount.path())?;

    let _ro_guard = RoGuard::engage(&transport, &subvolumes)?;

    let graph = SubvolumeGraph::build(&subvolumes)?;

    match config.strategy {
        Strategy::Parent => {
            let plan = planner::parent::plan(&graph, &subvolumes);
            execute_direct(&transport, &new_root, &plan)?;
        }
        Strategy::Snapshot => {
            let plan = planner::snapshot::plan(&graph, &subvolumes);
            let staging = StagingArea::new(
                &transport,
                &new_root,
                config.snap_base.as_deref(),
                &subvolumes,
                config.dry_run,
            )?;
            execute_via_staging(&staging, &plan)?;
        }
        Strategy::Chronological => {
            let plan = planner::chronological::plan(&graph, &subvolumes);
            let staging = StagingArea::new(
                &transport,
                &new_root,
                config.snap_base.as_deref(),
                &subvolumes,
                config.dry_run,
            )?;
            execute_via_staging(&staging, &plan)?;
        }
        Strategy::Generation => {
            let plan = planner::generation::plan(&graph, &subvolumes, config.restrict_to_good_candidates);
            let staging = StagingArea::new(
                &transport,
                &new_root,
                config.snap_base.as_deref(),
                &subvolumes,
                config.dry_run,
            )?;
            execute_via_staging(&staging, &plan)?;
        }
    }

    Ok(())
}

fn check_preconditions(
    transport: &dyn Transport,
    config: &CloneConfig,
    old_mount: &std::path::Path,
    new_mount: &std::path::Path,
) -> Result<()> {
    let old_uuid = transport.filesystem_uuid(old_mount)?;
    let new_uuid = transport.filesystem_uuid(new_mount)?;

    let violation = if old_uuid == new_uuid {
        Some(PreconditionError::SameFilesystem {
            old: config.source.clone(),
            new: config.dest.clone(),
        })
    } else if std::fs::read_dir(new_mount)?.next().is_some() {
        Some(PreconditionError::DestinationNotEmpty(config.dest.clone()))
    } else {
        None
    };

    let Some(violation) = violation else {
        return Ok(());
    };

    if config.dry_run {
        return Ok(());
    }
    if !config.force {
        return Err(CloneError::Precondition(violation));
    }

    log::warn!("*** WARNING ***: {violation}");
    log::warn!("proceeding in 10 seconds unless interrupted...");
    sleep(Duration::from_secs(10));
    Ok(())
}

fn enumerate_subvolumes(
    transport: &dyn Transport,
    mount: &std::path::Path,
) -> Result<Vec<Subvolume>> {
    let paths = transport.list_subvolume_paths(mount)?;
    let mut subvolumes = Vec::with_capacity(paths.len());
    for path in paths {
        match Subvolume::from_path(transport, mount, &path) {
            Ok(sv) => subvolumes.push(sv),
            Err(e) => log::warn!("skipping {}: {e}", path.display()),
        }
    }
    subvolumes.sort_by_key(|sv| (sv.ogen, sv.id));
    Ok(subvolumes)
}
