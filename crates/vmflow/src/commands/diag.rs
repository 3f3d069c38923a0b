//! 診断コマンド（読み取りのみ）

use super::print_field;
use colored::Colorize;
use vmflow_hypervisor::{Hypervisor, PowerState};

pub async fn handle_list(hypervisor: &dyn Hypervisor) -> anyhow::Result<()> {
    let vms = hypervisor.list_vms().await?;
    if vms.is_empty() {
        println!("{}", "VMはありません".dimmed());
        return Ok(());
    }
    for vm in vms {
        println!("{}", vm);
    }
    Ok(())
}

pub async fn handle_status(hypervisor: &dyn Hypervisor, name: &str) -> anyhow::Result<()> {
    let summary = hypervisor.vm_summary(name).await?;

    let state = match summary.power_state {
        PowerState::On => summary.power_state.to_string().green(),
        PowerState::Off => summary.power_state.to_string().red(),
        _ => summary.power_state.to_string().yellow(),
    };

    println!("{}", summary.name.cyan().bold());
    print_field("電源", state);
    print_field("IPアドレス", summary.ip.as_deref().unwrap_or("未割り当て"));
    if let Some(hostname) = &summary.hostname {
        print_field("ホスト名", hostname);
    }
    if let Some(cpus) = summary.cpus {
        print_field("vCPU", cpus);
    }
    if let Some(memory) = summary.memory_mb {
        print_field("メモリ", format!("{memory} MB"));
    }
    Ok(())
}

pub async fn handle_info(hypervisor: &dyn Hypervisor, name: &str) -> anyhow::Result<()> {
    let info = hypervisor.vm_info_text(name).await?;
    println!("{}", info.trim_end());
    Ok(())
}

pub async fn handle_devices(hypervisor: &dyn Hypervisor, name: &str) -> anyhow::Result<()> {
    let devices = hypervisor.list_devices(name).await?;
    if devices.is_empty() {
        println!("{}", "デバイスはありません".dimmed());
        return Ok(());
    }

    for device in devices {
        println!(
            "  {:<20} {:<12} {}",
            device.name.cyan(),
            device.kind.to_string(),
            device.summary
        );
        if let Some(file) = &device.attached_file {
            println!("  {:<20} {:<12} {}", "", "", file.dimmed());
        }
    }
    Ok(())
}

pub async fn handle_ip(hypervisor: &dyn Hypervisor, name: &str) -> anyhow::Result<()> {
    match hypervisor.guest_ip(name).await? {
        Some(ip) => println!("{}", ip),
        None => {
            println!("{}", "IPアドレスは未割り当てです".yellow());
            println!(
                "{}",
                "VMware Tools が起動していない可能性があります。しばらく待ってから再実行してください"
                    .dimmed()
            );
        }
    }
    Ok(())
}
