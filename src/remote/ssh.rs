use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info};

use super::{RemoteError, RemoteJob, RemoteServer, parse_status_table};
use crate::config::ServerConfig;

/// Server reached through the system `ssh` and `scp` clients.
///
/// Both run with `BatchMode=yes` and a connect timeout, so a dead host fails
/// instead of hanging the loop.
#[derive(Debug, Clone)]
pub struct SshServer {
    label: String,
    hostname: String,
    username: Option<String>,
    private_key: Option<PathBuf>,
    command_prefix: String,
    status_command: String,
    snapshot_source: Option<String>,
    connect_timeout_seconds: u64,
}

impl SshServer {
    pub fn from_config(server: &ServerConfig, private_key: Option<&Path>) -> Self {
        Self {
            label: server.label.clone(),
            hostname: server.hostname.clone(),
            username: server.username.clone(),
            private_key: private_key.map(Path::to_path_buf),
            command_prefix: server.command_prefix.clone(),
            status_command: server.status_command.clone(),
            snapshot_source: server.snapshot_source.clone(),
            connect_timeout_seconds: server.connect_timeout_seconds,
        }
    }

    fn destination(&self) -> String {
        match &self.username {
            Some(user) if !user.is_empty() => format!("{user}@{}", self.hostname),
            _ => self.hostname.clone(),
        }
    }

    fn transport_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_seconds),
        ];
        if let Some(key) = &self.private_key {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().into_owned());
        }
        args
    }

    pub(crate) fn remote_command(&self, command: &str) -> String {
        let prefix = self.command_prefix.trim();
        if prefix.is_empty() {
            command.to_string()
        } else {
            format!("{prefix} {command}")
        }
    }

    pub(crate) fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = self.transport_options();
        args.push(self.destination());
        args.push(self.remote_command(command));
        args
    }

    pub(crate) fn scp_args(&self, source: &str, dest: &Path) -> Vec<String> {
        let mut args = self.transport_options();
        args.push("-r".to_string());
        args.push(format!("{}:{source}", self.destination()));
        args.push(dest.to_string_lossy().into_owned());
        args
    }

    fn run(&self, program: &str, args: &[String]) -> Result<Output, RemoteError> {
        debug!("{program} {}", args.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| RemoteError::Spawn {
                program: program.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                program: program.to_string(),
                host: self.hostname.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl RemoteServer for SshServer {
    fn label(&self) -> &str {
        &self.label
    }

    fn hostname(&self) -> &str {
        &self.hostname
    }

    fn list_jobs(&self) -> Result<Vec<RemoteJob>, RemoteError> {
        let output = self.run("ssh", &self.ssh_args(&self.status_command))?;
        Ok(parse_status_table(&String::from_utf8_lossy(&output.stdout)))
    }

    fn snapshot(&self, job_id_on_server: &str, dest: &Path) -> Result<(), RemoteError> {
        let template = self
            .snapshot_source
            .as_deref()
            .ok_or_else(|| RemoteError::NoSnapshotSource(self.label.clone()))?;
        let source = template.replace("{job}", job_id_on_server);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RemoteError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.run("scp", &self.scp_args(&source, dest))?;
        info!(
            "Snapshot of job {job_id_on_server} on {} saved to {}",
            self.label,
            dest.display()
        );
        Ok(())
    }
}
