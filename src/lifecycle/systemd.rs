//! systemd registration.
//!
//! # Responsibilities
//! - Render the unit file from the basic settings
//! - Install, uninstall, start and stop the unit through `systemctl`
//!
//! # Design Decisions
//! - Only the unit file and `systemctl` calls; no D-Bus
//! - The `systemctl` binary and unit directory are overridable for tests

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::constants::{PROJECT_BASE_DIR, PROJECT_INSTALL_MARK};
use crate::config::{BasicSettings, Environment};

const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("cannot locate the service executable: {0}")]
    Executable(#[source] io::Error),
}

/// Control over the installed service.
pub trait ServiceManager {
    fn install(&self) -> Result<(), ServiceError>;
    fn uninstall(&self) -> Result<(), ServiceError>;
    fn start(&self) -> Result<(), ServiceError>;
    fn stop(&self) -> Result<(), ServiceError>;
}

/// Contents of `<name>.service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    pub name: String,
    pub description: String,
    /// `Key=value` lines for the `[Unit]` section.
    pub depends: Vec<String>,
    pub exec_start: String,
    pub working_dir: PathBuf,
}

impl UnitFile {
    pub fn from_settings(basic: &BasicSettings, exe: &Path, env: Environment) -> Self {
        let depends = basic
            .srv_depends
            .split(',')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let working_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(PROJECT_BASE_DIR));
        Self {
            name: basic.name.clone(),
            description: basic.description.clone(),
            depends,
            exec_start: format!("{} --env {}", exe.display(), env.value()),
            working_dir,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.service", self.name)
    }

    pub fn render(&self) -> String {
        let mut unit = String::from("[Unit]\n");
        let _ = writeln!(unit, "Description={}", self.description);
        for line in &self.depends {
            let _ = writeln!(unit, "{line}");
        }
        unit.push_str("\n[Service]\n");
        unit.push_str("StartLimitInterval=5\n");
        unit.push_str("StartLimitBurst=10\n");
        let _ = writeln!(unit, "ExecStart={}", self.exec_start);
        let _ = writeln!(unit, "WorkingDirectory={}", self.working_dir.display());
        unit.push_str("Restart=always\n");
        unit.push_str("RestartSec=120\n");
        unit.push_str("KillSignal=SIGTERM\n");
        unit.push_str("\n[Install]\nWantedBy=multi-user.target\n");
        unit
    }
}

/// [`ServiceManager`] backed by unit files and `systemctl`.
#[derive(Debug, Clone)]
pub struct Systemd {
    unit: UnitFile,
    unit_dir: PathBuf,
    systemctl: PathBuf,
}

impl Systemd {
    pub fn new(unit: UnitFile) -> Self {
        Self {
            unit,
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            systemctl: PathBuf::from("systemctl"),
        }
    }

    /// Unit for the running executable.
    pub fn for_current_exe(basic: &BasicSettings, env: Environment) -> Result<Self, ServiceError> {
        let exe = std::env::current_exe().map_err(ServiceError::Executable)?;
        Ok(Self::new(UnitFile::from_settings(basic, &exe, env)))
    }

    pub fn with_unit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.unit_dir = dir.into();
        self
    }

    pub fn with_systemctl(mut self, bin: impl Into<PathBuf>) -> Self {
        self.systemctl = bin.into();
        self
    }

    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.unit.file_name())
    }

    pub fn install_mark_path(&self) -> PathBuf {
        self.unit.working_dir.join(PROJECT_INSTALL_MARK)
    }

    fn systemctl(&self, args: &[&str]) -> Result<(), ServiceError> {
        let command = format!("{} {}", self.systemctl.display(), args.join(" "));
        tracing::debug!(%command, "Running systemctl");
        let output = Command::new(&self.systemctl)
            .args(args)
            .output()
            .map_err(|source| ServiceError::Spawn {
                command: command.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ServiceError::Command {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ServiceError> {
    fs::write(path, contents).map_err(|source| ServiceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_file(path: &Path) -> Result<(), ServiceError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(ServiceError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

impl ServiceManager for Systemd {
    fn install(&self) -> Result<(), ServiceError> {
        let path = self.unit_path();
        write_file(&path, &self.unit.render())?;
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &self.unit.name])?;
        write_file(&self.install_mark_path(), &self.unit.exec_start)?;
        tracing::info!(unit = %path.display(), "Service installed");
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        self.systemctl(&["stop", &self.unit.name])?;
        self.systemctl(&["disable", &self.unit.name])?;
        remove_file(&self.unit_path())?;
        self.systemctl(&["daemon-reload"])?;
        remove_file(&self.install_mark_path())?;
        tracing::info!(unit = %self.unit.file_name(), "Service uninstalled");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.systemctl(&["start", &self.unit.name])
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.systemctl(&["stop", &self.unit.name])
    }
}
