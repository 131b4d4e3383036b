//! HID functions of the USB gadget

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::configfs::{
    create_dir, create_symlink, is_symlink, remove_dir, remove_file, write_bytes, write_file,
};
use super::report_desc;
use crate::error::Result;

/// Static description of one HID gadget function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidFunction {
    /// Directory name under `functions/`, also the config link name
    pub name: &'static str,
    pub protocol: u8,
    pub subclass: u8,
    /// Value for the function's `report_length` attribute; f_hid cuts longer
    /// writes to this size, so multi-report devices size it for the report
    /// the host polls (4 for the keyboard) rather than the largest one
    pub report_length: u8,
    pub report_desc: &'static [u8],
}

/// Keyboard with consumer control (boot keyboard protocol)
pub const KEYBOARD_FUNCTION: HidFunction = HidFunction {
    name: "hid.keyboard",
    protocol: 1,
    subclass: 1,
    report_length: 4,
    report_desc: report_desc::KEYBOARD,
};

/// Precision touchpad
pub const TOUCHPAD_FUNCTION: HidFunction = HidFunction {
    name: "hid.touchpad",
    protocol: 2,
    subclass: 0,
    report_length: 12,
    report_desc: report_desc::TOUCHPAD,
};

/// Every function the gadget manager installs, in creation order
pub const ALL_FUNCTIONS: [HidFunction; 2] = [KEYBOARD_FUNCTION, TOUCHPAD_FUNCTION];

impl HidFunction {
    pub fn function_path(&self, gadget_path: &Path) -> PathBuf {
        gadget_path.join("functions").join(self.name)
    }

    pub fn link_path(&self, config_path: &Path) -> PathBuf {
        config_path.join(self.name)
    }

    /// Create the function directory and write its attributes
    ///
    /// `no_out_endpoint` is missing on older kernels, so failing to write it is
    /// only logged.
    pub fn create(&self, gadget_path: &Path) -> Result<()> {
        let func_path = self.function_path(gadget_path);
        create_dir(&func_path)?;

        write_file(&func_path.join("protocol"), &self.protocol.to_string())?;
        write_file(&func_path.join("subclass"), &self.subclass.to_string())?;
        if let Err(e) = write_file(&func_path.join("no_out_endpoint"), "1") {
            warn!("{}: {}", self.name, e);
        }
        write_file(
            &func_path.join("report_length"),
            &self.report_length.to_string(),
        )?;
        write_bytes(&func_path.join("report_desc"), self.report_desc)?;

        debug!(
            "Created HID function: {} at {}",
            self.name,
            func_path.display()
        );
        Ok(())
    }

    /// Link the function into the configuration; an existing entry is left alone
    pub fn link(&self, config_path: &Path, gadget_path: &Path) -> Result<()> {
        let link_path = self.link_path(config_path);

        if is_symlink(&link_path) || link_path.exists() {
            warn!("{} already present, not relinking", link_path.display());
            return Ok(());
        }

        create_symlink(&self.function_path(gadget_path), &link_path)?;
        debug!("Linked HID function {} to config", self.name);
        Ok(())
    }

    pub fn unlink(&self, config_path: &Path) -> Result<()> {
        remove_file(&self.link_path(config_path))?;
        debug!("Unlinked HID function {}", self.name);
        Ok(())
    }

    /// Remove the function directory
    pub fn cleanup(&self, gadget_path: &Path) -> Result<()> {
        remove_dir(&self.function_path(gadget_path))?;
        debug!("Cleaned up HID function {}", self.name);
        Ok(())
    }
}

/// Fake ConfigFS function directories for tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Attribute files the kernel creates with every HID function directory
    pub const ATTRIBUTES: [&str; 4] = ["protocol", "subclass", "no_out_endpoint", "report_length"];

    /// Create `functions/<name>` with its attribute files, like mkdir in configfs
    pub fn seed_function(gadget_path: &Path, function: &HidFunction, attributes: &[&str]) {
        let func_path = function.function_path(gadget_path);
        std::fs::create_dir_all(&func_path).unwrap();
        for attr in attributes {
            std::fs::write(func_path.join(attr), b"").unwrap();
        }
    }

    pub fn seed_all(gadget_path: &Path) {
        for function in &ALL_FUNCTIONS {
            seed_function(gadget_path, function, &ATTRIBUTES);
        }
    }
}
