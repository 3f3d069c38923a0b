//! Hypervisor trait definition

use crate::error::Result;
use crate::types::{BootOrder, CreateVmSpec, DatastorePath, Device, DiskSelector, VmSummary};
use async_trait::async_trait;
use std::path::Path;

/// Hypervisor control surface
///
/// Every method maps to one control-plane call. Implementations are
/// expected to be stateless apart from connection settings, so a failed
/// call can simply be retried with different arguments.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Returns the implementation name (e.g., "esxi")
    fn name(&self) -> &str;

    /// Import a VM from a disk image
    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()>;

    async fn power_on(&self, vm: &str) -> Result<()>;

    async fn power_off(&self, vm: &str) -> Result<()>;

    /// List the VM's virtual devices as typed records
    async fn list_devices(&self, vm: &str) -> Result<Vec<Device>>;

    /// Raw detail text for a single device
    async fn device_info(&self, vm: &str, device: &str) -> Result<String>;

    /// Add a CD-ROM drive and return its device name
    async fn add_cdrom(&self, vm: &str) -> Result<String>;

    /// Insert an ISO from the datastore into a CD-ROM drive
    async fn insert_media(&self, vm: &str, device: &str, iso: &DatastorePath) -> Result<()>;

    async fn connect_device(&self, vm: &str, device: &str) -> Result<()>;

    async fn set_boot_order(&self, vm: &str, order: &BootOrder) -> Result<()>;

    async fn resize_disk(&self, vm: &str, disk: &DiskSelector, size_gb: u32) -> Result<()>;

    /// Upload a local file to the datastore
    async fn upload_to_datastore(
        &self,
        local: &Path,
        datastore: &str,
        remote: &str,
    ) -> Result<DatastorePath>;

    /// Guest IP address as reported by the guest tools, if any
    async fn guest_ip(&self, vm: &str) -> Result<Option<String>>;

    /// Names of all VMs on the host
    async fn list_vms(&self) -> Result<Vec<String>>;

    async fn vm_summary(&self, vm: &str) -> Result<VmSummary>;

    /// Raw `vm.info` style text for display
    async fn vm_info_text(&self, vm: &str) -> Result<String>;

    async fn snapshot_tree(&self, vm: &str) -> Result<String>;

    async fn remove_snapshots(&self, vm: &str) -> Result<()>;

    async fn destroy_vm(&self, vm: &str) -> Result<()>;
}
