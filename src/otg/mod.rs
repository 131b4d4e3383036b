//! USB gadget management
//!
//! ```text
//! GadgetService (root check, orchestration, events)
//!     ├── GadgetManager (ConfigFS: add, link, enable, delete)
//!     │       └── HidFunction (keyboard, touchpad)
//!     └── PermissionFixer (SELinux policy, chown/chmod/chcon)
//!             └── RootShell
//! ```

pub mod configfs;
pub mod hid;
pub mod manager;
pub mod permissions;
pub mod report_desc;
pub mod service;

pub use hid::{HidFunction, ALL_FUNCTIONS, KEYBOARD_FUNCTION, TOUCHPAD_FUNCTION};
pub use manager::{wait_for_devices, GadgetManager, GadgetPhase, GadgetReport, GadgetStatus};
pub use permissions::{CommandOutput, PermissionFixer, RootMethod, RootShell, SuShell};
pub use service::{CreateReport, DevicePermissionReport, GadgetService};
