//! VMware ESXi support for vmflow
//!
//! Provides the `Hypervisor` implementation backed by the `govc` and
//! `ovftool` CLIs, and an OpenSSH based `RemoteShell`.
//!
//! # Prerequisites
//!
//! - `govc` and `ovftool` installed under the vmflow tools directory
//! - `ssh` on `PATH`

pub mod govc;
pub mod ovftool;
pub mod provider;
pub mod ssh;

pub use govc::{Govc, parse_device_list, parse_vm_info_json, parse_vm_list};
pub use ovftool::Ovftool;
pub use provider::EsxiHypervisor;
pub use ssh::OpenSsh;
