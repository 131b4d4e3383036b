use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HID device settings
    pub hid: HidConfig,
    /// USB gadget (ConfigFS) settings
    pub gadget: GadgetConfig,
    /// Device node ownership and SELinux settings
    pub permissions: PermissionConfig,
}

/// HID device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidConfig {
    /// Keyboard character device
    pub keyboard_path: String,
    /// Touchpad character device
    pub touchpad_path: String,
    /// Send touchpad reports to a local uhid device instead of the USB host
    pub loopback: bool,
    /// uhid control node used in loopback mode
    pub uhid_path: String,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            keyboard_path: "/dev/hidg0".to_string(),
            touchpad_path: "/dev/hidg1".to_string(),
            loopback: false,
            uhid_path: "/dev/uhid".to_string(),
        }
    }
}

/// USB gadget configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetConfig {
    /// ConfigFS usb_gadget directory
    pub configfs_root: String,
    /// Gadget directory to use instead of auto-discovery
    pub gadget_path: Option<String>,
    /// Configuration directory name under `configs/`
    pub config_name: String,
    /// UDC name; auto-detected from `udc_class_dir` when unset
    pub udc: Option<String>,
    pub udc_class_dir: String,
    /// Unlink other functions (adb, mtp, ...) while adding ours, then restore them
    pub disable_functions_during_configuration: bool,
    /// How long to wait for character devices to appear
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            configfs_root: "/config/usb_gadget".to_string(),
            gadget_path: None,
            config_name: "b.1".to_string(),
            udc: None,
            udc_class_dir: "/sys/class/udc".to_string(),
            disable_functions_during_configuration: true,
            wait_timeout_ms: 3000,
            poll_interval_ms: 200,
        }
    }
}

/// Device node permission configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Owner of the device nodes; the current user when unset
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Directory whose SELinux categories are copied onto the device nodes
    pub app_data_dir: Option<String>,
    /// Domain granted access by the policy amendment
    pub selinux_domain: String,
    /// Policy tool command, e.g. "magiskpolicy --live"; auto-detected when unset
    pub sepolicy_command: Option<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            uid: None,
            gid: None,
            app_data_dir: None,
            selinux_domain: "appdomain".to_string(),
            sepolicy_command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "hid": { "loopback": true }, "gadget": { "udc": "musb-hdrc.0" } }"#)
                .unwrap();

        assert!(config.hid.loopback);
        assert_eq!(config.hid.keyboard_path, "/dev/hidg0");
        assert_eq!(config.gadget.udc.as_deref(), Some("musb-hdrc.0"));
        assert_eq!(config.gadget.config_name, "b.1");
        assert!(config.gadget.disable_functions_during_configuration);
        assert_eq!(config.permissions.selinux_domain, "appdomain");
    }
}
