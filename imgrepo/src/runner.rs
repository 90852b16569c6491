//! External tool execution
//!
//! Every image tool runs through [`ToolRunner`], which applies the libguestfs
//! environment and the per-command timeout.

use std::{
    fmt::Display,
    path::Path,
    process::Stdio,
    time::Duration,
};

use tokio::process::Command;
use tracing::{debug, info, trace};

use crate::{Error, Result};

/// Environment passed to every tool; the direct backend avoids libvirt
pub const TOOL_ENV: [(&str, &str); 1] = [("LIBGUESTFS_BACKEND", "direct")];

/// Trailing stderr kept in a failure report
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &'static str) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, prefix: &str, path: &Path) -> Self {
        self.arg(format!("{}{}", prefix, path.display()))
    }

    pub fn virt_builder(os: &str, commands_file: &Path, output: &Path) -> Self {
        Self::new("virt-builder")
            .path_arg("--commands-from-file=", commands_file)
            .path_arg("--output=", output)
            .arg("--format=qcow2")
            .arg(os)
    }

    pub fn virt_customize(commands_file: &Path, image: &Path) -> Self {
        Self::new("virt-customize")
            .path_arg("--commands-from-file=", commands_file)
            .arg("--format=qcow2")
            .path_arg("--add=", image)
    }

    pub fn virt_sysprep(image: &Path) -> Self {
        Self::new("virt-sysprep")
            .arg("--format=qcow2")
            .arg("--selinux-relabel")
            .path_arg("--add=", image)
    }

    pub fn virt_sparsify(image: &Path) -> Self {
        Self::new("virt-sparsify")
            .arg("--format")
            .arg("qcow2")
            .arg("--in-place")
            .path_arg("", image)
    }

    /// qcow2 overlay of `base`
    pub fn qemu_img_layer(base: &Path, output: &Path) -> Self {
        Self::new("qemu-img")
            .arg("create")
            .arg("-f")
            .arg("qcow2")
            .arg("-F")
            .arg("qcow2")
            .arg("-b")
            .path_arg("", base)
            .path_arg("", output)
    }
}

impl Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Fail unless every tool is found in PATH
pub fn check_tools<'a>(tools: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for tool in tools {
        match which::which(tool) {
            Ok(path) => debug!("Using {} from {}", tool, path.display()),
            Err(_) => return Err(Error::ToolNotFound(tool.to_string())),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run a command to completion, returning its stdout
    pub async fn run(&self, command: &ToolCommand) -> Result<String> {
        info!("Running {}", command);

        let mut cmd = Command::new(command.program);
        cmd.args(&command.args)
            .envs(TOOL_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| Error::Timeout {
                    program: command.program.to_string(),
                    secs: limit.as_secs(),
                })??,
            None => cmd.output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        for line in stdout.lines() {
            trace!("{}: {}", command.program, line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(Error::CommandFailed {
                program: command.program.to_string(),
                code: output.status.code(),
                stderr: tail,
            });
        }

        Ok(stdout)
    }
}
