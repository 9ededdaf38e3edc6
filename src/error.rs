//! Layered error types for the clone pipeline.
//!
//! Each component owns an error enum describing its own failure modes;
//! [`CloneError`] aggregates them so `main` has a single type to match on.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the transport adapter (the `btrfs` subprocess wrapper).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("send/recv error for {path}: {reason}")]
    SendReceive { path: PathBuf, reason: String },

    #[error("could not parse `subvolume show` output for {path}: missing attribute `{attr}`")]
    MissingAttribute { path: PathBuf, attr: &'static str },

    #[error("could not parse `{field}` from `subvolume show` output for {path}: {value:?}")]
    MalformedField {
        path: PathBuf,
        field: &'static str,
        value: String,
    },

    #[error("could not find filesystem uuid in `btrfs filesystem show` output for {mount}")]
    NoFilesystemUuid { mount: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while walking or consulting the subvolume graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate subvolume uuid {0}")]
    DuplicateUuid(String),
}

/// Errors raised by the read-only discipline.
#[derive(Debug, Error)]
pub enum RoGuardError {
    #[error("failed to set {path} read-only: {source}")]
    Engage {
        path: PathBuf,
        #[source]
        source: TransportError,
    },
}

/// Errors raised by the staging area.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create staging directory {0}")]
    CreateBase(PathBuf, #[source] std::io::Error),

    #[error("subvolume {id} was not received into {path}")]
    NotReceived { id: u64, path: PathBuf },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised while mounting or unmounting a top subvolume.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("failed to create temporary mount point: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("failed to mount {mount} via subvolid=5: {source}")]
    Mount {
        mount: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised by the replication planner.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// A precondition the clone refuses to run with, absent `--force`.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("{old} and {new} are the same file system")]
    SameFilesystem { old: PathBuf, new: PathBuf },

    #[error("destination {0} is not empty")]
    DestinationNotEmpty(PathBuf),
}

/// The top-level error type returned by the clone pipeline.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    RoGuard(#[from] RoGuardError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CloneError>;
