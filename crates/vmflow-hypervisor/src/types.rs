//! Typed records returned by hypervisor implementations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of a virtual device attached to a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Disk,
    Cdrom,
    Network,
    Controller,
    Other,
}

impl DeviceKind {
    /// Classify a device from its vSphere type name (e.g. `VirtualCdrom`)
    pub fn from_type_name(type_name: &str) -> Self {
        let t = type_name.to_ascii_lowercase();
        if t.contains("disk") {
            DeviceKind::Disk
        } else if t.contains("cdrom") {
            DeviceKind::Cdrom
        } else if t.contains("ethernet")
            || t.contains("vmxnet")
            || t.contains("e1000")
            || t.contains("pcnet")
        {
            DeviceKind::Network
        } else if t.contains("controller") {
            DeviceKind::Controller
        } else {
            DeviceKind::Other
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Disk => write!(f, "disk"),
            DeviceKind::Cdrom => write!(f, "cdrom"),
            DeviceKind::Network => write!(f, "network"),
            DeviceKind::Controller => write!(f, "controller"),
            DeviceKind::Other => write!(f, "other"),
        }
    }
}

/// A virtual device as reported by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device name (e.g. "cdrom-3000", "disk-1000-0")
    pub name: String,

    pub kind: DeviceKind,

    /// Free-form summary text
    pub summary: String,

    /// Backing file, when the device has one (e.g. "[datastore1] vm/seed.iso")
    pub attached_file: Option<String>,
}

impl Device {
    pub fn is_disk(&self) -> bool {
        self.kind == DeviceKind::Disk
    }

    pub fn is_cdrom(&self) -> bool {
        self.kind == DeviceKind::Cdrom
    }
}

/// VM power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    Suspended,
    Unknown,
}

impl PowerState {
    /// Parse the vSphere power state string (`poweredOn`, `poweredOff`, `suspended`)
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "poweredon" | "on" => PowerState::On,
            "poweredoff" | "off" => PowerState::Off,
            "suspended" => PowerState::Suspended,
            _ => PowerState::Unknown,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "poweredOn"),
            PowerState::Off => write!(f, "poweredOff"),
            PowerState::Suspended => write!(f, "suspended"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Summary of a VM's runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSummary {
    pub name: String,
    pub power_state: PowerState,
    pub ip: Option<String>,
    pub cpus: Option<u32>,
    pub memory_mb: Option<u32>,
    pub hostname: Option<String>,
}

/// How to address the disk in a resize call
///
/// Hypervisor versions differ in which selector they accept, so callers
/// try these in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum DiskSelector {
    /// Let the tool pick the VM's only disk
    Default,
    /// Device label (e.g. "Hard disk 1")
    Label(String),
    /// Device key (e.g. 2000)
    Key(u32),
    /// Device name from `device.ls` (e.g. "disk-1000-0")
    Name(String),
}

impl fmt::Display for DiskSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskSelector::Default => write!(f, "default disk"),
            DiskSelector::Label(label) => write!(f, "label \"{label}\""),
            DiskSelector::Key(key) => write!(f, "key {key}"),
            DiskSelector::Name(name) => write!(f, "name {name}"),
        }
    }
}

/// Boot device class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootDevice {
    Cdrom,
    Disk,
    Ethernet,
    Floppy,
}

impl BootDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootDevice::Cdrom => "cdrom",
            BootDevice::Disk => "disk",
            BootDevice::Ethernet => "ethernet",
            BootDevice::Floppy => "floppy",
        }
    }
}

/// Boot order with optional boot delay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootOrder {
    pub devices: Vec<BootDevice>,
    pub delay_ms: Option<u32>,
}

impl BootOrder {
    pub fn new(devices: Vec<BootDevice>) -> Self {
        Self {
            devices,
            delay_ms: None,
        }
    }

    pub fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Comma separated list, as accepted by `device.boot -order`
    pub fn order_arg(&self) -> String {
        self.devices
            .iter()
            .map(BootDevice::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for BootOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.order_arg())?;
        if let Some(delay) = self.delay_ms {
            write!(f, " (delay {delay}ms)")?;
        }
        Ok(())
    }
}

/// File location on a datastore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastorePath {
    pub datastore: String,
    pub path: String,
}

impl DatastorePath {
    pub fn new(datastore: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            datastore: datastore.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for DatastorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.datastore, self.path)
    }
}

/// Parameters for importing a new VM from an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVmSpec {
    pub name: String,
    pub image: PathBuf,
    pub datastore: String,
    pub network: String,
    pub cpus: u32,
    pub memory_mb: u32,
}
