//! Thin, strongly-typed wrapper around the `btrfs` command-line tool.
//!
//! Every mutating call honors `dry_run`: it logs what it would have run and
//! returns without touching the filesystem. Read-only introspection
//! (`list_subvolume_paths`, `introspect`, `get_ro`, `filesystem_uuid`) always
//! executes, since the planner needs real data to build a plan even in a
//! dry run.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::TransportError;

/// Parsed `subvolume show` projection of one subvolume.
#[derive(Debug, Clone)]
pub struct SubvolumeShow {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub id: u64,
    pub parent_id: u64,
    pub gen: u64,
    pub ogen: u64,
    pub ro: bool,
}

/// Abstraction over the external `btrfs` transport, so the planner and
/// staging area can be exercised against a fake in unit tests.
pub trait Transport {
    fn list_subvolume_paths(&self, mount: &Path) -> Result<Vec<PathBuf>, TransportError>;
    fn introspect(&self, mount: &Path, path: &Path) -> Result<SubvolumeShow, TransportError>;
    fn get_ro(&self, path: &Path) -> Result<bool, TransportError>;
    fn set_ro(&self, path: &Path, ro: bool) -> Result<(), TransportError>;
    fn pipe_send_receive(
        &self,
        source_path: &Path,
        dest_dir: &Path,
        parent: Option<&Path>,
        clone_sources: &[PathBuf],
    ) -> Result<(), TransportError>;
    fn snapshot_ro(&self, src: &Path, dst: &Path) -> Result<(), TransportError>;
    fn delete(&self, path: &Path) -> Result<(), TransportError>;
    fn filesystem_uuid(&self, mount: &Path) -> Result<String, TransportError>;
}

/// The real transport, driving the `btrfs` CLI via subprocesses.
pub struct BtrfsTransport {
    binary: String,
    verbose_flags: Vec<&'static str>,
    log_transfers: bool,
    dry_run: bool,
}

impl BtrfsTransport {
    pub fn new(binary: impl Into<String>, verbosity: u8, dry_run: bool) -> Self {
        Self {
            binary: binary.into(),
            verbose_flags: vec!["-v"; verbosity as usize],
            log_transfers: verbosity >= 2,
            dry_run,
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), TransportError> {
        log::debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| TransportError::Spawn {
                command: args.join(" "),
                source,
            })?;
        if !output.status.success() {
            return Err(TransportError::CommandFailed {
                command: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    fn run_for_output(&self, args: &[&str]) -> Result<String, TransportError> {
        log::debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| TransportError::Spawn {
                command: args.join(" "),
                source,
            })?;
        if !output.status.success() {
            return Err(TransportError::CommandFailed {
                command: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Transport for BtrfsTransport {
    fn list_subvolume_paths(&self, mount: &Path) -> Result<Vec<PathBuf>, TransportError> {
        let mount_str = mount.to_string_lossy();
        let out = self.run_for_output(&[
            "subvolume",
            "list",
            "-t",
            "--sort=ogen",
            &mount_str,
        ])?;

        let mut paths = Vec::new();
        for line in out.lines() {
            let Some(first) = line.split_whitespace().next() else {
                continue;
            };
            // Header rows have a non-numeric leading field.
            if first.parse::<u64>().is_err() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if let Some(path) = fields.get(3) {
                paths.push(PathBuf::from(path));
            }
        }
        Ok(paths)
    }

    fn introspect(&self, mount: &Path, path: &Path) -> Result<SubvolumeShow, TransportError> {
        let full = mount.join(path);
        let full_str = full.to_string_lossy();
        let out = self.run_for_output(&["subvolume", "show", &full_str])?;

        let mut uuid = None;
        let mut parent_uuid = None;
        let mut id = None;
        let mut parent_id = None;
        let mut gen = None;
        let mut ogen = None;
        let mut ro = None;

        for line in out.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "UUID" => uuid = Some(value.to_string()),
                "Parent UUID" => {
                    parent_uuid = if value == "-" {
                        None
                    } else {
                        Some(value.to_string())
                    }
                }
                "Subvolume ID" => {
                    id = Some(value.parse().map_err(|_| TransportError::MalformedField {
                        path: full.clone(),
                        field: "Subvolume ID",
                        value: value.to_string(),
                    })?)
                }
                "Parent ID" => {
                    parent_id = Some(value.parse().map_err(|_| TransportError::MalformedField {
                        path: full.clone(),
                        field: "Parent ID",
                        value: value.to_string(),
                    })?)
                }
                "Generation" => {
                    gen = Some(value.parse().map_err(|_| TransportError::MalformedField {
                        path: full.clone(),
                        field: "Generation",
                        value: value.to_string(),
                    })?)
                }
                "Gen at creation" => {
                    ogen = Some(value.parse().map_err(|_| TransportError::MalformedField {
                        path: full.clone(),
                        field: "Gen at creation",
                        value: value.to_string(),
                    })?)
                }
                "Flags" => ro = Some(value.contains("readonly")),
                _ => {}
            }
        }

        Ok(SubvolumeShow {
            uuid: uuid.ok_or(TransportError::MissingAttribute {
                path: full.clone(),
                attr: "uuid",
            })?,
            parent_uuid,
            id: id.ok_or(TransportError::MissingAttribute {
                path: full.clone(),
                attr: "id",
            })?,
            parent_id: parent_id.ok_or(TransportError::MissingAttribute {
                path: full.clone(),
                attr: "parent_id",
            })?,
            gen: gen.ok_or(TransportError::MissingAttribute {
                path: full.clone(),
                attr: "gen",
            })?,
            ogen: ogen.ok_or(TransportError::MissingAttribute {
                path: full.clone(),
                attr: "ogen",
            })?,
            ro: ro.ok_or(TransportError::MissingAttribute {
                path: full,
                attr: "ro",
            })?,
        })
    }

    fn get_ro(&self, path: &Path) -> Result<bool, TransportError> {
        let path_str = path.to_string_lossy();
        let out = self.run_for_output(&["property", "get", "-ts", &path_str, "ro"])?;
        Ok(out.trim() == "ro=true")
    }

    fn set_ro(&self, path: &Path, ro: bool) -> Result<(), TransportError> {
        if self.dry_run {
            log::info!("(dry run) would set ro={ro} on {}", path.display());
            return Ok(());
        }
        let path_str = path.to_string_lossy();
        self.run(&[
            "property",
            "set",
            "-ts",
            &path_str,
            "ro",
            if ro { "true" } else { "false" },
        ])
    }

    fn pipe_send_receive(
        &self,
        source_path: &Path,
        dest_dir: &Path,
        parent: Option<&Path>,
        clone_sources: &[PathBuf],
    ) -> Result<(), TransportError> {
        if self.dry_run {
            log::info!(
                "(dry run) would send {} -> {}",
                source_path.display(),
                dest_dir.display()
            );
            return Ok(());
        }

        let mut send_args: Vec<String> = vec!["send".to_string()];
        send_args.extend(self.verbose_flags.iter().map(|s| s.to_string()));
        if let Some(parent) = parent {
            send_args.push("-p".to_string());
            send_args.push(parent.to_string_lossy().into_owned());
        }
        for src in clone_sources {
            send_args.push("-c".to_string());
            send_args.push(src.to_string_lossy().into_owned());
        }
        send_args.push(source_path.to_string_lossy().into_owned());

        let mut recv_args: Vec<String> = vec!["receive".to_string()];
        recv_args.extend(self.verbose_flags.iter().map(|s| s.to_string()));
        recv_args.push(dest_dir.to_string_lossy().into_owned());

        log::info!(
            "{} {} | {} {}",
            self.binary,
            send_args.join(" "),
            self.binary,
            recv_args.join(" ")
        );

        let (send_stderr, recv_stderr, log_names) = if self.log_transfers {
            let name = dest_dir.to_string_lossy().replace('/', "-");
            let send_name = format!("btrfs-send-{name}.log.gz");
            let recv_name = format!("btrfs-recv-{name}.log.gz");
            (Stdio::piped(), Stdio::piped(), Some((send_name, recv_name)))
        } else {
            (Stdio::piped(), Stdio::piped(), None)
        };

        let mut send = Command::new(&self.binary)
            .args(&send_args)
            .stdout(Stdio::piped())
            .stderr(send_stderr)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: send_args.join(" "),
                source,
            })?;

        let send_stdout = send.stdout.take().expect("send stdout was piped");

        let mut recv = Command::new(&self.binary)
            .args(&recv_args)
            .stdin(Stdio::from(send_stdout))
            .stderr(recv_stderr)
            .spawn()
            .map_err(|source| TransportError::Spawn {
                command: recv_args.join(" "),
                source,
            })?;

        let mut send_stderr_buf = String::new();
        if let Some(mut pipe) = send.stderr.take() {
            pipe.read_to_string(&mut send_stderr_buf).ok();
        }
        let mut recv_stderr_buf = String::new();
        if let Some(mut pipe) = recv.stderr.take() {
            pipe.read_to_string(&mut recv_stderr_buf).ok();
        }

        let send_status = send.wait().map_err(|source| TransportError::Spawn {
            command: send_args.join(" "),
            source,
        })?;
        let recv_status = recv.wait().map_err(|source| TransportError::Spawn {
            command: recv_args.join(" "),
            source,
        })?;

        if let Some((send_name, recv_name)) = &log_names {
            write_gz(send_name, send_stderr_buf.as_bytes());
            write_gz(recv_name, recv_stderr_buf.as_bytes());
        }

        if !send_status.success() || !recv_status.success() {
            let reason = if let Some((send_name, recv_name)) = &log_names {
                format!("see {send_name} and {recv_name}")
            } else {
                format!("send stderr: {send_stderr_buf}; recv stderr: {recv_stderr_buf}")
            };
            return Err(TransportError::SendReceive {
                path: source_path.to_path_buf(),
                reason,
            });
        }

        Ok(())
    }

    fn snapshot_ro(&self, src: &Path, dst: &Path) -> Result<(), TransportError> {
        if self.dry_run {
            log::info!(
                "(dry run) would snapshot -r {} {}",
                src.display(),
                dst.display()
            );
            return Ok(());
        }
        let src_str = src.to_string_lossy();
        let dst_str = dst.to_string_lossy();
        self.run(&["subvolume", "snapshot", "-r", &src_str, &dst_str])
    }

    fn delete(&self, path: &Path) -> Result<(), TransportError> {
        if self.dry_run {
            log::info!("(dry run) would delete {}", path.display());
            return Ok(());
        }
        let path_str = path.to_string_lossy();
        self.run(&["subvolume", "delete", &path_str])
    }

    fn filesystem_uuid(&self, mount: &Path) -> Result<String, TransportError> {
        let mount_str = mount.to_string_lossy();
        let out = self.run_for_output(&["filesystem", "show", &mount_str])?;
        let first_line = out.lines().next().unwrap_or_default();
        first_line
            .split("uuid:")
            .nth(1)
            .map(|s| s.split_whitespace().next().unwrap_or_default().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TransportError::NoFilesystemUuid {
                mount: mount.to_path_buf(),
            })
    }
}

fn write_gz(name: &str, data: &[u8]) {
    match std::fs::File::create(name) {
        Ok(file) => {
            let mut encoder = GzEncoder::new(file, Compression::default());
            if let Err(e) = encoder.write_all(data) {
                log::warn!("failed to write {name}: {e}");
            }
        }
        Err(e) => log::warn!("failed to create {name}: {e}"),
    }
}
