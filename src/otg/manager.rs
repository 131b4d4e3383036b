//! USB gadget manager
//!
//! Adds the HID functions to an existing ConfigFS gadget (the one the vendor
//! init scripts created for adb/mtp) and removes them again. Every step is
//! best effort: a failure is logged, recorded in the [`GadgetReport`] and the
//! remaining steps still run. Re-enabling the gadget is always attempted when
//! a UDC name is known, so a failed step never leaves USB switched off.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::configfs::{
    create_dir, create_symlink, find_udc, is_configfs_available, is_symlink, list_dir,
    list_symlinks, read_file, remove_file, write_file, UDC_FILE,
};
use super::hid::{HidFunction, ALL_FUNCTIONS};
use crate::config::AppConfig;
use crate::error::Result;

/// Configuration state of our functions, derived from ConfigFS on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GadgetPhase {
    Unconfigured,
    FunctionsAdded,
    Linked,
    Enabled,
}

impl GadgetPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::FunctionsAdded => "functions_added",
            Self::Linked => "linked",
            Self::Enabled => "enabled",
        }
    }
}

/// Outcome of a create or delete
#[derive(Debug, Clone, Serialize)]
pub struct GadgetReport {
    pub gadget_path: PathBuf,
    pub phase: GadgetPhase,
    /// A UDC was written back at the end
    pub enabled: bool,
    /// Description of every failed step, in order
    pub failed_steps: Vec<String>,
}

impl GadgetReport {
    pub fn is_success(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

/// Snapshot for the UI collaborator
#[derive(Debug, Clone, Serialize)]
pub struct GadgetStatus {
    pub configfs_available: bool,
    pub gadget_path: PathBuf,
    pub phase: GadgetPhase,
    pub udc: Option<String>,
    /// Names of all entries linked into the configuration
    pub linked_functions: Vec<String>,
    /// Character devices and whether they currently exist
    pub devices: Vec<(PathBuf, bool)>,
}

/// Collects failed steps while a multi-step operation keeps going
#[derive(Default)]
struct Steps {
    failed: Vec<String>,
}

impl Steps {
    fn check(&mut self, step: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => {
                debug!("{}: ok", step);
                true
            }
            Err(e) => {
                warn!("{} failed: {}", step, e);
                self.failed.push(format!("{}: {}", step, e));
                false
            }
        }
    }
}

/// Manages our HID functions inside a ConfigFS gadget
pub struct GadgetManager {
    configfs_root: PathBuf,
    gadget_path: PathBuf,
    config_path: PathBuf,
    udc_override: Option<String>,
    udc_class_dir: PathBuf,
    park_foreign_functions: bool,
    device_paths: Vec<PathBuf>,
    functions: &'static [HidFunction],
}

impl GadgetManager {
    pub fn new(config: &AppConfig) -> Self {
        let gadget = &config.gadget;
        let configfs_root = PathBuf::from(&gadget.configfs_root);
        let gadget_path =
            Self::determine_gadget_path(&configfs_root, gadget.gadget_path.as_deref());
        let config_path = gadget_path.join("configs").join(&gadget.config_name);

        debug!("Using gadget at {}", gadget_path.display());

        Self {
            configfs_root,
            gadget_path,
            config_path,
            udc_override: gadget.udc.clone().filter(|u| !u.trim().is_empty()),
            udc_class_dir: PathBuf::from(&gadget.udc_class_dir),
            park_foreign_functions: gadget.disable_functions_during_configuration,
            device_paths: vec![
                PathBuf::from(&config.hid.keyboard_path),
                PathBuf::from(&config.hid.touchpad_path),
            ],
            functions: &ALL_FUNCTIONS,
        }
    }

    /// Pick the gadget directory
    ///
    /// Order: a non-blank override that is a directory, `g1`, `g2`, the first
    /// ConfigFS entry with a `UDC` file, the first entry, and finally the first
    /// candidate tried even though it does not exist.
    pub fn determine_gadget_path(configfs_root: &Path, override_path: Option<&str>) -> PathBuf {
        let mut candidates = Vec::with_capacity(3);
        if let Some(path) = override_path.filter(|p| !p.trim().is_empty()) {
            candidates.push(PathBuf::from(path.trim()));
        }
        candidates.push(configfs_root.join("g1"));
        candidates.push(configfs_root.join("g2"));

        if let Some(found) = candidates.iter().find(|p| p.is_dir()) {
            return found.clone();
        }

        let entries = list_dir(configfs_root).unwrap_or_else(|e| {
            error!("{}", e);
            Vec::new()
        });

        entries
            .iter()
            .find(|p| p.join(UDC_FILE).is_file())
            .or_else(|| entries.first())
            .cloned()
            .unwrap_or_else(|| candidates.swap_remove(0))
    }

    pub fn gadget_path(&self) -> &Path {
        &self.gadget_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn device_paths(&self) -> &[PathBuf] {
        &self.device_paths
    }

    fn udc_path(&self) -> PathBuf {
        self.gadget_path.join(UDC_FILE)
    }

    /// UDC to bind on enable: configured name, else the first controller present
    pub fn udc_name(&self) -> Option<String> {
        self.udc_override
            .clone()
            .or_else(|| find_udc(&self.udc_class_dir))
    }

    /// UDC currently bound, if any
    pub fn bound_udc(&self) -> Option<String> {
        read_file(&self.udc_path()).ok().filter(|s| !s.is_empty())
    }

    /// Unbind the gadget from its controller
    pub fn disable(&self) -> Result<()> {
        // Only a bare newline reliably clears the UDC attribute
        write_file(&self.udc_path(), "\n")
    }

    /// Bind the gadget; `Ok(false)` when no UDC name is known
    pub fn enable(&self) -> Result<bool> {
        self.enable_with(None)
    }

    /// Bind to `previous` when given, else to [`udc_name`](Self::udc_name)
    pub fn enable_with(&self, previous: Option<String>) -> Result<bool> {
        match previous.or_else(|| self.udc_name()) {
            Some(udc) => {
                write_file(&self.udc_path(), &udc)?;
                info!("Gadget bound to UDC {}", udc);
                Ok(true)
            }
            None => {
                warn!("No UDC name known, leaving gadget disabled");
                Ok(false)
            }
        }
    }

    /// Current phase of our functions
    pub fn phase(&self) -> GadgetPhase {
        let added = self
            .functions
            .iter()
            .all(|f| f.function_path(&self.gadget_path).is_dir());
        if !added {
            return GadgetPhase::Unconfigured;
        }

        let linked = self
            .functions
            .iter()
            .all(|f| is_symlink(&f.link_path(&self.config_path)));
        if !linked {
            return GadgetPhase::FunctionsAdded;
        }

        if self.bound_udc().is_some() {
            GadgetPhase::Enabled
        } else {
            GadgetPhase::Linked
        }
    }

    pub fn status(&self) -> GadgetStatus {
        let linked_functions = list_dir(&self.config_path)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| is_symlink(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();

        GadgetStatus {
            configfs_available: is_configfs_available(&self.configfs_root),
            gadget_path: self.gadget_path.clone(),
            phase: self.phase(),
            udc: self.bound_udc(),
            linked_functions,
            devices: self
                .device_paths
                .iter()
                .map(|p| (p.clone(), p.exists()))
                .collect(),
        }
    }

    /// Whether any of our character devices is absent right now
    pub fn any_character_device_missing(&self) -> bool {
        self.device_paths.iter().any(|p| !p.exists())
    }

    /// Whether `path` is missing; paths we do not manage always count as missing
    pub fn character_device_missing(&self, path: &Path) -> bool {
        !self.device_paths.iter().any(|p| p == path) || !path.exists()
    }

    fn is_own_link(&self, link: &Path) -> bool {
        self.functions
            .iter()
            .any(|f| link.file_name() == Some(std::ffi::OsStr::new(f.name)))
    }

    /// Add, link and enable the HID functions
    pub fn create_character_devices(&self) -> GadgetReport {
        info!("Creating HID functions in {}", self.gadget_path.display());
        let mut steps = Steps::default();
        let previous = self.bound_udc();

        // 1-2: park existing links (adb, mtp, ...) so function attributes are writable
        let parked = if self.park_foreign_functions {
            let links = list_symlinks(&self.config_path).unwrap_or_else(|e| {
                warn!("{}", e);
                Vec::new()
            });
            for (link, _) in &links {
                steps.check(
                    &format!("unlink {}", link.display()),
                    remove_file(link),
                );
            }
            links
        } else {
            Vec::new()
        };

        // 3: some kernels refuse function changes while bound
        steps.check("disable gadget", self.disable());

        // 4
        for function in self.functions {
            steps.check(
                &format!("add function {}", function.name),
                function.create(&self.gadget_path),
            );
        }

        // 5
        steps.check("create config dir", create_dir(&self.config_path));
        for function in self.functions {
            steps.check(
                &format!("link function {}", function.name),
                function.link(&self.config_path, &self.gadget_path),
            );
        }

        // 6: our own links were recreated above
        for (link, target) in parked.iter().filter(|(l, _)| !self.is_own_link(l)) {
            steps.check(
                &format!("restore link {}", link.display()),
                create_symlink(target, link),
            );
        }

        // 7: back onto the controller we were bound to
        let enabled = self.enable_logged(&mut steps, previous);

        self.finish("create", steps, enabled)
    }

    /// Unlink and remove the HID functions and their character devices
    pub fn delete_character_devices(&self) -> GadgetReport {
        info!("Removing HID functions from {}", self.gadget_path.display());
        let mut steps = Steps::default();

        for function in self.functions {
            steps.check(
                &format!("unlink function {}", function.name),
                function.unlink(&self.config_path),
            );
            steps.check(
                &format!("remove function {}", function.name),
                function.cleanup(&self.gadget_path),
            );
        }

        let previous = self.bound_udc();
        steps.check("disable gadget", self.disable());
        let enabled = self.enable_logged(&mut steps, previous);

        // Stale nodes would otherwise look like a configured gadget
        for device in &self.device_paths {
            steps.check(
                &format!("delete {}", device.display()),
                remove_file(device),
            );
        }

        self.finish("delete", steps, enabled)
    }

    fn enable_logged(&self, steps: &mut Steps, previous: Option<String>) -> bool {
        match self.enable_with(previous) {
            Ok(enabled) => enabled,
            Err(e) => {
                steps.check("enable gadget", Err(e));
                false
            }
        }
    }

    fn finish(&self, operation: &str, steps: Steps, enabled: bool) -> GadgetReport {
        let report = GadgetReport {
            gadget_path: self.gadget_path.clone(),
            phase: self.phase(),
            enabled,
            failed_steps: steps.failed,
        };

        if report.is_success() {
            info!(
                "Gadget {} finished: phase={}, enabled={}",
                operation,
                report.phase.as_str(),
                enabled
            );
        } else {
            error!(
                "Gadget {} finished with {} failed step(s): phase={}, enabled={}",
                operation,
                report.failed_steps.len(),
                report.phase.as_str(),
                enabled
            );
        }
        report
    }
}

/// Wait until every path exists, polling at a fixed interval
///
/// Returns the paths still missing when the timeout expired (empty on success).
pub async fn wait_for_devices(
    device_paths: &[PathBuf],
    timeout: Duration,
    poll_interval: Duration,
) -> Vec<PathBuf> {
    let start = Instant::now();

    loop {
        let missing: Vec<PathBuf> = device_paths
            .iter()
            .filter(|p| !p.exists())
            .cloned()
            .collect();

        if missing.is_empty() {
            return missing;
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return missing;
        }

        debug!("Waiting for {} device(s) to appear", missing.len());
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}
