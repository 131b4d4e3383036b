//! Root shell access and device node permission fixing
//!
//! Freshly created `/dev/hidg*` nodes belong to root and carry a generic
//! SELinux label. [`PermissionFixer`] hands them to the client user and copies
//! the categories of its data directory onto the label, after amending the
//! live policy so app domains may touch `device` character files at all.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PermissionConfig;
use crate::error::{AppError, Result};

/// Result of one shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Privileged command execution
#[async_trait]
pub trait RootShell: Send + Sync {
    /// Whether commands run as uid 0
    async fn is_root(&self) -> bool;

    /// Run `command` through a root shell
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Runs commands with `su -c`
pub struct SuShell {
    su: String,
}

impl SuShell {
    pub fn new() -> Self {
        Self {
            su: "su".to_string(),
        }
    }

    pub fn with_binary(su: impl Into<String>) -> Self {
        Self { su: su.into() }
    }
}

impl Default for SuShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RootShell for SuShell {
    async fn is_root(&self) -> bool {
        match self.run("id -u").await {
            Ok(out) => out.success() && out.stdout.trim() == "0",
            Err(e) => {
                debug!("Root check failed: {}", e);
                false
            }
        }
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        debug!("{} -c {}", self.su, command);
        let output = Command::new(&self.su)
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::RootUnavailable(format!("Failed to spawn {}: {}", self.su, e)))?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Root solution installed on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootMethod {
    Unrooted,
    /// Root shell works but no known policy tool was found
    Unknown,
    Magisk,
    KernelSu,
}

impl RootMethod {
    /// Command that applies a policy statement to the live policy
    pub fn sepolicy_command(&self) -> Option<&'static str> {
        match self {
            Self::Magisk => Some("magiskpolicy --live"),
            Self::KernelSu => Some("ksud sepolicy patch"),
            Self::Unrooted | Self::Unknown => None,
        }
    }
}

/// Probed in order; the first binary found decides the method
const ROOT_BINARIES: [(&str, RootMethod); 3] = [
    ("magisk", RootMethod::Magisk),
    ("magiskpolicy", RootMethod::Magisk),
    ("ksud", RootMethod::KernelSu),
];

/// Quote for a POSIX shell
fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Owner for the device nodes
///
/// Falls back to the running user; `None` when that would be root, since a
/// root-owned mode 600 node is unusable by the client. The gid follows the
/// uid unless set.
fn resolve_owner(
    uid: Option<u32>,
    gid: Option<u32>,
    process_uid: u32,
    process_gid: u32,
) -> Option<(u32, u32)> {
    match uid {
        Some(uid) => Some((uid, gid.unwrap_or(uid))),
        None if process_uid == 0 => None,
        None => Some((process_uid, gid.unwrap_or(process_gid))),
    }
}

/// Fixes ownership and SELinux labels of HID device nodes
pub struct PermissionFixer {
    shell: Arc<dyn RootShell>,
    config: PermissionConfig,
    policy_amended: AtomicBool,
}

impl PermissionFixer {
    pub fn new(shell: Arc<dyn RootShell>, config: PermissionConfig) -> Self {
        Self {
            shell,
            config,
            policy_amended: AtomicBool::new(false),
        }
    }

    pub fn shell(&self) -> &Arc<dyn RootShell> {
        &self.shell
    }

    pub async fn detect_root_method(&self) -> RootMethod {
        if !self.shell.is_root().await {
            info!("No root shell available");
            return RootMethod::Unrooted;
        }

        for (binary, method) in ROOT_BINARIES {
            match self.shell.run(&format!("type {}", binary)).await {
                Ok(out) if out.success() => {
                    debug!("Found {}, root method {:?}", binary, method);
                    return method;
                }
                Ok(_) => {}
                Err(e) => debug!("type {}: {}", binary, e),
            }
        }

        RootMethod::Unknown
    }

    /// Configured policy tool, else the one matching the detected root method
    pub async fn policy_command(&self) -> Option<String> {
        if let Some(cmd) = self
            .config
            .sepolicy_command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            return Some(cmd.to_string());
        }
        self.detect_root_method()
            .await
            .sepolicy_command()
            .map(str::to_string)
    }

    pub fn policy_statement(&self) -> String {
        format!(
            "allow {} device chr_file {{ getattr open read write }}",
            self.config.selinux_domain
        )
    }

    /// Amend the live SELinux policy; later calls are no-ops once it succeeded
    pub async fn amend_policy(&self) -> Result<()> {
        if self.policy_amended.load(Ordering::Acquire) {
            return Ok(());
        }

        let tool = self.policy_command().await.ok_or_else(|| {
            AppError::RootUnavailable("No SELinux policy tool available".to_string())
        })?;
        let command = format!("{} {}", tool, quote(&self.policy_statement()));
        let out = self.shell.run(&command).await?;
        if !out.success() {
            return Err(AppError::GadgetStep(format!(
                "{} exited with {}: {}",
                tool,
                out.code,
                out.stderr.trim()
            )));
        }

        self.policy_amended.store(true, Ordering::Release);
        info!("SELinux policy amended for {}", self.config.selinux_domain);
        Ok(())
    }

    /// SELinux categories of the configured data directory, e.g. `c512,c768`
    pub async fn selinux_categories(&self) -> Result<Option<String>> {
        let Some(dir) = self.config.app_data_dir.as_deref() else {
            return Ok(None);
        };

        let out = self
            .shell
            .run(&format!("stat -c %C {}", quote(dir)))
            .await?;
        let context = out.stdout.trim();
        if !out.success() || context.is_empty() {
            return Err(AppError::GadgetStep(format!(
                "Failed to read SELinux context of {}: {}",
                dir,
                out.stderr.trim()
            )));
        }

        let categories = context.rsplit(':').next().unwrap_or(context);
        if categories == context {
            warn!("Unexpected SELinux context {:?}", context);
        }
        debug!("SELinux context {} -> categories {}", context, categories);
        Ok(Some(categories.to_string()))
    }

    fn owner(&self) -> Option<(u32, u32)> {
        resolve_owner(
            self.config.uid,
            self.config.gid,
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        )
    }

    async fn step(&self, failed: &mut Vec<String>, command: String) {
        let result = match self.shell.run(&command).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(format!("exit {}: {}", out.code, out.stderr.trim())),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = result {
            warn!("{} failed: {}", command, reason);
            failed.push(format!("{}: {}", command, reason));
        }
    }

    /// chown, chmod and relabel `device`; returns the failed steps
    pub async fn fix(&self, device: &Path) -> Vec<String> {
        let mut failed = Vec::new();
        let dev = quote(&device.display().to_string());
        match self.owner() {
            Some((uid, gid)) => {
                self.step(&mut failed, format!("chown '{}:{}' {}", uid, gid, dev))
                    .await;
                self.step(&mut failed, format!("chmod 600 {}", dev)).await;
            }
            None => {
                let reason = format!(
                    "chown {}: no owner uid configured, refusing to hand the node to root",
                    dev
                );
                warn!("{}", reason);
                failed.push(reason);
            }
        }

        match self.selinux_categories().await {
            Ok(Some(categories)) => {
                let context = format!("u:object_r:device:s0:{}", categories);
                self.step(&mut failed, format!("chcon {} {}", quote(&context), dev))
                    .await;
            }
            Ok(None) => debug!("No data directory configured, keeping label of {}", dev),
            Err(e) => {
                warn!("{}", e);
                failed.push(e.to_string());
            }
        }

        if failed.is_empty() {
            info!("Fixed permissions of {}", device.display());
        }
        failed
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Shell that records commands and answers from a prefix table
    pub struct ScriptedShell {
        root: bool,
        responses: Vec<(String, CommandOutput)>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedShell {
        pub fn new(root: bool) -> Self {
            Self {
                root,
                responses: Vec::new(),
                commands: Mutex::new(Vec::new()),
            }
        }

        pub fn respond(mut self, prefix: &str, code: i32, stdout: &str) -> Self {
            self.responses.push((
                prefix.to_string(),
                CommandOutput {
                    code,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                },
            ));
            self
        }

        pub fn commands(&self) -> Vec<String> {
            self.commands.lock().clone()
        }
    }

    #[async_trait]
    impl RootShell for ScriptedShell {
        async fn is_root(&self) -> bool {
            self.root
        }

        async fn run(&self, command: &str) -> Result<CommandOutput> {
            self.commands.lock().push(command.to_string());
            Ok(self
                .responses
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| CommandOutput {
                    code: 1,
                    ..Default::default()
                }))
        }
    }
}
