//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{CloneConfig, Strategy};

/// Clones an entire Btrfs file system onto another one, subvolume by
/// subvolume, using incremental `btrfs send`/`receive`.
#[derive(Debug, Parser)]
#[command(name = "btrfs-clone", about = "Clone a Btrfs file system")]
pub struct Cli {
    /// Source file system (a mounted Btrfs device or any subvolume on it)
    pub old: PathBuf,

    /// Destination file system (must be empty, unless `--force`)
    pub new: PathBuf,

    /// Increase verbosity (repeatable; `-vv` also logs compressed send/recv transcripts)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Alternate `btrfs` binary
    #[arg(short = 'B', long = "btrfs", default_value = "btrfs")]
    pub btrfs: String,

    /// Proceed even if the destination is non-empty or the same file system
    #[arg(short, long)]
    pub force: bool,

    /// Plan and log every step without running any mutating command
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Replication strategy
    #[arg(short, long, default_value = "snapshot")]
    pub strategy: Strategy,

    /// Name for the staging area / top-level snapshot, instead of a random token
    #[arg(long)]
    pub snap_base: Option<String>,

    /// Skip re-executing under a fresh mount namespace
    #[arg(long)]
    pub no_unshare: bool,

    /// Clone the top-level subvolume into a named subvolume of the
    /// destination instead of promoting its contents to the destination root
    #[arg(short, long)]
    pub toplevel: bool,

    /// Restrict the `generation` strategy's clone-source set to just the
    /// chosen parent
    #[arg(long)]
    pub restrict_to_good_candidates: bool,
}

impl Cli {
    pub fn into_config(self) -> CloneConfig {
        CloneConfig {
            source: self.old,
            dest: self.new,
            btrfs_binary: self.btrfs,
            strategy: self.strategy,
            force: self.force,
            dry_run: self.dry_run,
            verbosity: self.verbose,
            snap_base: self.snap_base,
            promote_toplevel: !self.toplevel,
            no_unshare: self.no_unshare,
            restrict_to_good_candidates: self.restrict_to_good_candidates,
        }
    }
}
