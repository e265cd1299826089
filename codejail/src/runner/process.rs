//! Command runner: one child interpreter per invocation

use super::{IsolationRunner, RunnerInput};
use crate::limits::RunnerLimits;
use crate::stage::{stage_paths, write_inline_files};
use crate::types::SandboxResult;
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// File name the program text is written to inside the working directory
pub const JAILED_CODE: &str = "jailed_code";

/// How to launch the interpreter for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerCommand {
    /// Interpreter binary, typically inside a dedicated virtualenv
    pub bin_path: PathBuf,

    /// Arguments placed before the program file
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Run the interpreter as this user through `sudo -u`
    #[serde(default)]
    pub user: Option<String>,

    /// `sudo` binary used when `user` is set
    #[serde(default = "default_sudo_path")]
    pub sudo_path: PathBuf,

    #[serde(default)]
    pub limits: RunnerLimits,
}

fn default_args() -> Vec<String> {
    vec!["-E".to_string(), "-B".to_string()]
}

fn default_sudo_path() -> PathBuf {
    PathBuf::from("sudo")
}

impl RunnerCommand {
    pub fn new(bin_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            args: default_args(),
            user: None,
            sudo_path: default_sudo_path(),
            limits: RunnerLimits::default(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_limits(mut self, limits: RunnerLimits) -> Self {
        self.limits = limits;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = match &self.user {
            Some(user) => {
                let mut cmd = Command::new(&self.sudo_path);
                cmd.arg("-u").arg(user).arg(&self.bin_path);
                cmd
            }
            None => Command::new(&self.bin_path),
        };
        cmd.args(&self.args).arg(JAILED_CODE);
        // The child leads a fresh group so a timeout can reach its descendants
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    /// Kill every process left in the jailed group.
    ///
    /// `sudo` cannot relay SIGKILL, and processes owned by the jail user may
    /// be out of our reach, so with a user set the group is also killed as
    /// that user.
    async fn kill_group(&self, pgid: u32) {
        kill_process_group(pgid);

        let Some(user) = &self.user else {
            return;
        };
        let status = Command::new(&self.sudo_path)
            .arg("-u")
            .arg(user)
            .args(["pkill", "-KILL", "-g"])
            .arg(pgid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = status {
            tracing::warn!(error = %e, pgid, user = %user, "Failed to kill jailed processes as their user");
        }
    }
}

/// Runs each program in a fresh temporary directory with a configured
/// interpreter
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    commands: HashMap<String, RunnerCommand>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, language: impl Into<String>, command: RunnerCommand) -> Self {
        self.commands.insert(language.into(), command);
        self
    }

    pub fn from_commands(commands: HashMap<String, RunnerCommand>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl IsolationRunner for ProcessRunner {
    fn is_configured(&self, language: &str) -> bool {
        self.commands.contains_key(language)
    }

    async fn run(&self, input: RunnerInput<'_>) -> Result<SandboxResult> {
        let command = self
            .commands
            .get(input.language)
            .with_context(|| format!("No runner configured for language {:?}", input.language))?;

        let workdir = tempfile::Builder::new()
            .prefix("codejail-")
            .tempdir()
            .context("Failed to create working directory")?;

        let dir = workdir.path().to_path_buf();
        let files = input.files.to_vec();
        let inline_files = input.inline_files.to_vec();
        let program = input.program.to_string();
        let shared = command.user.is_some();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            stage_paths(&dir, &files)?;
            write_inline_files(&dir, &inline_files)?;
            std::fs::write(dir.join(JAILED_CODE), program)?;
            if shared {
                open_to_other_users(&dir)?;
            }
            Ok(())
        })
        .await
        .context("Staging task panicked")?
        .context("Failed to stage files for jailed code")?;

        tracing::debug!(
            runner = "process",
            language = input.language,
            slug = input.slug.unwrap_or("<none>"),
            workdir = %workdir.path().display(),
            "Launching jailed interpreter"
        );

        let mut child = command
            .command()
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", command.bin_path.display()))?;
        let pgid = child.id();

        // Feed stdin concurrently so a chatty child cannot deadlock on a full pipe
        if let Some(mut stdin) = child.stdin.take() {
            let bytes = input.stdin.to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    tracing::debug!(error = %e, "Jailed process closed stdin early");
                }
            });
        }

        let output = match command.limits.max_duration {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output.context("Failed to wait for jailed process")?,
                Err(_) => {
                    tracing::warn!(
                        slug = input.slug.unwrap_or("<none>"),
                        limit = ?limit,
                        "Jailed code timed out"
                    );
                    if let Some(pgid) = pgid {
                        command.kill_group(pgid).await;
                    }
                    return Ok(SandboxResult {
                        status: -1,
                        stdout: Vec::new(),
                        stderr: format!("Jailed code timed out after {:?}", limit).into_bytes(),
                    });
                }
            },
            None => child
                .wait_with_output()
                .await
                .context("Failed to wait for jailed process")?,
        };

        Ok(SandboxResult {
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn name(&self) -> &str {
        "process"
    }
}

#[cfg(unix)]
fn open_to_other_users(dir: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        let mode = if entry.file_type().is_dir() { 0o755 } else { 0o644 };
        std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn open_to_other_users(_dir: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            error = %std::io::Error::last_os_error(),
            pgid,
            "Jailed process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
