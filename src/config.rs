//! Immutable clone configuration, threaded explicitly through every component.

use std::path::PathBuf;

/// Which [replication strategy](crate::planner) to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Parent,
    Snapshot,
    Chronological,
    Generation,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Strategy::Parent),
            "snapshot" => Ok(Strategy::Snapshot),
            "chronological" => Ok(Strategy::Chronological),
            "generation" => Ok(Strategy::Generation),
            other => Err(format!("unknown strategy `{other}`")),
        }
    }
}

/// Configuration for one clone run.
///
/// Built once from CLI arguments and passed by reference everywhere; no
/// component reaches into process-global or environment state.
#[derive(Debug, Clone)]
pub struct CloneConfig {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub btrfs_binary: String,
    pub strategy: Strategy,
    pub force: bool,
    pub dry_run: bool,
    pub verbosity: u8,
    pub snap_base: Option<String>,
    pub promote_toplevel: bool,
    pub no_unshare: bool,
    pub restrict_to_good_candidates: bool,
}

impl CloneConfig {
    /// Whether the compressed per-transfer log files should be written
    /// instead of buffering stderr in memory.
    pub fn log_transfers(&self) -> bool {
        self.verbosity >= 2
    }
}
