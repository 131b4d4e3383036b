//! Gadget service - create/delete orchestration
//!
//! ```text
//!   GadgetService::create
//!       ├── euid 0 + RootShell::is_root (abort if unavailable)
//!       ├── GadgetManager (blocking)    add, link, enable
//!       ├── PermissionFixer             amend policy
//!       └── per device (concurrently)   wait for node, fix permissions
//! ```
//!
//! The manager is rebuilt from the current configuration on every call, so
//! changes to the gadget settings take effect on the next create or delete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::manager::{wait_for_devices, GadgetManager, GadgetReport, GadgetStatus};
use super::permissions::{PermissionFixer, RootShell};
use crate::config::ConfigStore;
use crate::error::{AppError, HidErrorKind, Result};
use crate::events::{EventBus, SystemEvent};

/// Outcome of fixing one device node
#[derive(Debug, Clone, Serialize)]
pub struct DevicePermissionReport {
    pub device: PathBuf,
    /// The node appeared before the timeout
    pub appeared: bool,
    pub failed_steps: Vec<String>,
}

/// Outcome of [`GadgetService::create`]
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub gadget: GadgetReport,
    /// Set when the policy amendment failed
    pub policy_error: Option<String>,
    pub devices: Vec<DevicePermissionReport>,
}

impl CreateReport {
    pub fn is_success(&self) -> bool {
        self.gadget.is_success()
            && self.policy_error.is_none()
            && self
                .devices
                .iter()
                .all(|d| d.appeared && d.failed_steps.is_empty())
    }
}

pub struct GadgetService {
    config: ConfigStore,
    shell: Arc<dyn RootShell>,
    events: Arc<EventBus>,
    /// ConfigFS is written from this process, not through the shell
    process_root: bool,
    /// Serializes create/delete; concurrent ConfigFS edits would interleave
    op_lock: Mutex<()>,
}

impl GadgetService {
    pub fn new(config: ConfigStore, shell: Arc<dyn RootShell>, events: Arc<EventBus>) -> Self {
        Self {
            config,
            shell,
            events,
            process_root: nix::unistd::geteuid().is_root(),
            op_lock: Mutex::new(()),
        }
    }

    /// Override the effective-uid check, e.g. when ConfigFS access is granted
    /// through capabilities instead of uid 0
    pub fn with_process_root(mut self, process_root: bool) -> Self {
        self.process_root = process_root;
        self
    }

    pub fn manager(&self) -> GadgetManager {
        GadgetManager::new(&self.config.get())
    }

    fn fixer(&self) -> PermissionFixer {
        PermissionFixer::new(self.shell.clone(), self.config.get().permissions.clone())
    }

    async fn require_root_shell(&self) -> Result<()> {
        if self.shell.is_root().await {
            Ok(())
        } else {
            Err(AppError::RootUnavailable(
                "Root shell required to fix device permissions".to_string(),
            ))
        }
    }

    async fn require_root(&self) -> Result<()> {
        if !self.process_root {
            return Err(AppError::RootUnavailable(
                "ConfigFS changes need this process to run as root".to_string(),
            ));
        }
        self.require_root_shell().await
    }

    async fn run_blocking<F>(&self, f: F) -> Result<GadgetReport>
    where
        F: FnOnce(GadgetManager) -> GadgetReport + Send + 'static,
    {
        let manager = self.manager();
        tokio::task::spawn_blocking(move || f(manager))
            .await
            .map_err(|e| AppError::Internal(format!("Gadget task failed: {}", e)))
    }

    fn publish_state(&self, report: &GadgetReport) {
        let gadget = report
            .gadget_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.events.publish(SystemEvent::GadgetStateChanged {
            gadget,
            phase: report.phase.as_str().to_string(),
            enabled: report.enabled,
            failed_steps: report.failed_steps.clone(),
        });
    }

    /// Add the HID functions and hand the device nodes to the client user
    pub async fn create(&self) -> Result<CreateReport> {
        let _guard = self.op_lock.lock().await;
        self.require_root().await?;

        let gadget = self
            .run_blocking(|manager| manager.create_character_devices())
            .await?;
        self.publish_state(&gadget);

        let fixer = self.fixer();
        let policy_error = match fixer.amend_policy().await {
            Ok(()) => None,
            Err(e) => {
                warn!("SELinux policy not amended: {}", e);
                Some(e.to_string())
            }
        };

        let config = self.config.get();
        let timeout = Duration::from_millis(config.gadget.wait_timeout_ms);
        let interval = Duration::from_millis(config.gadget.poll_interval_ms.max(1));
        let device_paths = self.manager().device_paths().to_vec();

        let devices = join_all(
            device_paths
                .into_iter()
                .map(|device| self.prepare_device(&fixer, device, timeout, interval)),
        )
        .await;

        let report = CreateReport {
            gadget,
            policy_error,
            devices,
        };
        if report.is_success() {
            info!("HID gadget ready");
        } else {
            warn!("HID gadget created with errors");
        }
        Ok(report)
    }

    async fn prepare_device(
        &self,
        fixer: &PermissionFixer,
        device: PathBuf,
        timeout: Duration,
        interval: Duration,
    ) -> DevicePermissionReport {
        let missing = wait_for_devices(std::slice::from_ref(&device), timeout, interval).await;
        if !missing.is_empty() {
            error!(
                "Timed out after {:?} waiting for {}",
                timeout,
                device.display()
            );
            return DevicePermissionReport {
                device,
                appeared: false,
                failed_steps: vec![AppError::Timeout("device node did not appear".to_string())
                    .to_string()],
            };
        }

        let failed_steps = fixer.fix(&device).await;
        self.events.publish(SystemEvent::GadgetPermissionsFixed {
            device: device.display().to_string(),
            failed_steps: failed_steps.clone(),
        });

        DevicePermissionReport {
            device,
            appeared: true,
            failed_steps,
        }
    }

    /// Remove the HID functions and their device nodes
    pub async fn delete(&self) -> Result<GadgetReport> {
        let _guard = self.op_lock.lock().await;
        self.require_root().await?;

        let report = self
            .run_blocking(|manager| manager.delete_character_devices())
            .await?;
        self.publish_state(&report);
        Ok(report)
    }

    /// Re-run ownership and label fixing without touching ConfigFS
    ///
    /// Missing nodes are reported and skipped; the others are still fixed.
    pub async fn fix_permissions(&self) -> Result<Vec<DevicePermissionReport>> {
        self.require_root_shell().await?;

        let fixer = self.fixer();
        if let Err(e) = fixer.amend_policy().await {
            warn!("SELinux policy not amended: {}", e);
        }

        let manager = self.manager();
        let mut reports = Vec::new();
        for device in manager.device_paths() {
            if !device.exists() {
                let error = AppError::hid(
                    device.display().to_string(),
                    "device node does not exist",
                    HidErrorKind::DeviceMissing,
                );
                warn!("{}", error);
                reports.push(DevicePermissionReport {
                    device: device.clone(),
                    appeared: false,
                    failed_steps: vec![error.to_string()],
                });
                continue;
            }
            let failed_steps = fixer.fix(device).await;
            self.events.publish(SystemEvent::GadgetPermissionsFixed {
                device: device.display().to_string(),
                failed_steps: failed_steps.clone(),
            });
            reports.push(DevicePermissionReport {
                device: device.clone(),
                appeared: true,
                failed_steps,
            });
        }
        Ok(reports)
    }

    pub fn status(&self) -> GadgetStatus {
        self.manager().status()
    }

    pub fn any_character_device_missing(&self) -> bool {
        self.manager().any_character_device_missing()
    }

    pub fn character_device_missing(&self, path: &Path) -> bool {
        self.manager().character_device_missing(path)
    }
}
