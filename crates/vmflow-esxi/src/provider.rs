//! ESXi hypervisor implementation

use crate::govc::Govc;
use crate::ovftool::Ovftool;
use async_trait::async_trait;
use std::path::Path;
use vmflow_core::DeploymentConfig;
use vmflow_hypervisor::{
    BootOrder, CreateVmSpec, DatastorePath, Device, DiskSelector, Hypervisor, HypervisorError,
    Result, VmSummary,
};

/// ESXi host driven through govc and ovftool
pub struct EsxiHypervisor {
    govc: Govc,
    ovftool: Ovftool,
}

impl EsxiHypervisor {
    pub fn new(govc: Govc, ovftool: Ovftool) -> Self {
        Self { govc, ovftool }
    }

    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self::new(
            Govc::new(&config.tools.govc, config.endpoint.clone()),
            Ovftool::new(&config.tools.ovftool, config.endpoint.clone()),
        )
    }

    pub fn govc(&self) -> &Govc {
        &self.govc
    }
}

/// `vm.ip` gives up with a deadline error when the guest has no address yet
fn is_wait_timeout(err: &HypervisorError) -> bool {
    match err {
        HypervisorError::CommandFailed { stderr, .. } => {
            let stderr = stderr.to_ascii_lowercase();
            stderr.contains("deadline") || stderr.contains("timeout")
        }
        _ => false,
    }
}

#[async_trait]
impl Hypervisor for EsxiHypervisor {
    fn name(&self) -> &str {
        "esxi"
    }

    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()> {
        tracing::info!(vm = %spec.name, "Importing VM with ovftool");
        self.ovftool.import(spec).await
    }

    async fn power_on(&self, vm: &str) -> Result<()> {
        self.govc.run_command("vm.power", &["-on", vm]).await?;
        Ok(())
    }

    async fn power_off(&self, vm: &str) -> Result<()> {
        self.govc.run_command("vm.power", &["-off", vm]).await?;
        Ok(())
    }

    async fn list_devices(&self, vm: &str) -> Result<Vec<Device>> {
        self.govc.list_devices(vm).await
    }

    async fn device_info(&self, vm: &str, device: &str) -> Result<String> {
        self.govc
            .run_command("device.info", &["-vm", vm, device])
            .await
    }

    async fn add_cdrom(&self, vm: &str) -> Result<String> {
        let before = self.govc.list_devices(vm).await?;
        let output = self.govc.run_command("device.cdrom.add", &["-vm", vm]).await?;

        let name = output.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }

        // Older govc releases print nothing; find the drive that was not there before
        let after = self.govc.list_devices(vm).await?;
        after
            .into_iter()
            .filter(|d| d.is_cdrom())
            .find(|d| !before.iter().any(|b| b.name == d.name))
            .map(|d| d.name)
            .ok_or_else(|| HypervisorError::DeviceNotFound(format!("new cdrom on {vm}")))
    }

    async fn insert_media(&self, vm: &str, device: &str, iso: &DatastorePath) -> Result<()> {
        self.govc
            .run_command(
                "device.cdrom.insert",
                &["-vm", vm, "-device", device, "-ds", &iso.datastore, &iso.path],
            )
            .await?;
        Ok(())
    }

    async fn connect_device(&self, vm: &str, device: &str) -> Result<()> {
        self.govc
            .run_command("device.connect", &["-vm", vm, device])
            .await?;
        Ok(())
    }

    async fn set_boot_order(&self, vm: &str, order: &BootOrder) -> Result<()> {
        let order_arg = order.order_arg();
        let delay = order.delay_ms.map(|d| d.to_string());

        let mut args = vec!["-vm", vm, "-order", order_arg.as_str()];
        if let Some(ref delay) = delay {
            args.push("-delay");
            args.push(delay.as_str());
        }
        self.govc.run_command("device.boot", &args).await?;
        Ok(())
    }

    async fn resize_disk(&self, vm: &str, disk: &DiskSelector, size_gb: u32) -> Result<()> {
        let size = format!("{size_gb}G");
        let key;

        let mut args = vec!["-vm", vm];
        match disk {
            DiskSelector::Default => {}
            DiskSelector::Label(label) => {
                args.push("-disk.label");
                args.push(label.as_str());
            }
            DiskSelector::Key(k) => {
                key = k.to_string();
                args.push("-disk.key");
                args.push(key.as_str());
            }
            DiskSelector::Name(name) => {
                args.push("-disk.name");
                args.push(name.as_str());
            }
        }
        args.push("-size");
        args.push(size.as_str());

        self.govc.run_command("vm.disk.change", &args).await?;
        Ok(())
    }

    async fn upload_to_datastore(
        &self,
        local: &Path,
        datastore: &str,
        remote: &str,
    ) -> Result<DatastorePath> {
        let local_str = local.display().to_string();
        self.govc
            .run_command("datastore.upload", &["-ds", datastore, &local_str, remote])
            .await?;
        Ok(DatastorePath::new(datastore, remote))
    }

    async fn guest_ip(&self, vm: &str) -> Result<Option<String>> {
        match self.govc.run_command("vm.ip", &["-wait", "5s", vm]).await {
            Ok(output) => {
                let ip = output.trim();
                Ok((!ip.is_empty()).then(|| ip.to_string()))
            }
            Err(e) if is_wait_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_vms(&self) -> Result<Vec<String>> {
        self.govc.list_vms().await
    }

    async fn vm_summary(&self, vm: &str) -> Result<VmSummary> {
        self.govc.vm_summary(vm).await
    }

    async fn vm_info_text(&self, vm: &str) -> Result<String> {
        self.govc.run_command("vm.info", &[vm]).await
    }

    async fn snapshot_tree(&self, vm: &str) -> Result<String> {
        self.govc.run_command("snapshot.tree", &["-vm", vm]).await
    }

    async fn remove_snapshots(&self, vm: &str) -> Result<()> {
        self.govc
            .run_command("snapshot.remove", &["-vm", vm, "*"])
            .await?;
        Ok(())
    }

    async fn destroy_vm(&self, vm: &str) -> Result<()> {
        self.govc.run_command("vm.destroy", &[vm]).await?;
        Ok(())
    }
}
