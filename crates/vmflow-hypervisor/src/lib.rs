//! vmflow Hypervisor Abstraction
//!
//! This crate defines the external command boundary used by the vmflow engine.
//! Implementations wrap hypervisor CLIs and return typed records, so the
//! orchestration layer never scrapes command output itself.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 vmflow-engine                    │
//! │   executor / poller / pipeline / destroy         │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               vmflow-hypervisor                  │
//! │  trait Hypervisor { ... }  trait RemoteShell     │
//! │  Device / VmSummary / DiskSelector / BootOrder   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼───────┐
//!           │  vmflow-esxi  │
//!           │ govc/ovftool  │
//!           │     ssh       │
//!           └───────────────┘
//! ```

pub mod error;
pub mod hypervisor;
pub mod shell;
pub mod types;

// Re-exports
pub use error::{HypervisorError, Result};
pub use hypervisor::Hypervisor;
pub use shell::{CommandOutput, RemoteShell};
pub use types::{
    BootDevice, BootOrder, CreateVmSpec, DatastorePath, Device, DeviceKind, DiskSelector,
    PowerState, VmSummary,
};
