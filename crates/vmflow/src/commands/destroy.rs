use super::load_config;
use crate::prompt::StdinPrompt;
use colored::Colorize;
use std::path::Path;
use vmflow_engine::{ConfirmationGate, DestroyAuthorization, DestroyWorkflow, find_matching};
use vmflow_esxi::EsxiHypervisor;
use vmflow_hypervisor::Hypervisor;

/// 削除対象の指定方法
pub enum Target {
    Single(String),
    Pattern(String),
    All,
    List,
}

pub async fn handle(env_file: Option<&Path>, target: Target) -> anyhow::Result<()> {
    let config = load_config(env_file)?;
    let hypervisor = EsxiHypervisor::from_config(&config);
    let prompt = StdinPrompt;
    let gate = ConfirmationGate::new(&prompt);

    let authorization = match target {
        Target::List => return list_vms(&hypervisor).await,
        Target::Single(name) => {
            show_vm(&hypervisor, &name).await;
            gate.confirm_single(&name)?
        }
        Target::Pattern(pattern) => {
            let vms = find_matching(&hypervisor, &pattern).await?;
            if vms.is_empty() {
                println!(
                    "{}",
                    format!("パターン '{pattern}' に一致するVMはありません").yellow()
                );
                return Ok(());
            }
            print_targets(&vms);
            gate.confirm_bulk(&vms)?
        }
        Target::All => {
            let vms = hypervisor.list_vms().await?;
            if vms.is_empty() {
                println!("{}", "VMはありません".yellow());
                return Ok(());
            }
            println!("{}", "⚠ 全VMを削除します".red().bold());
            print_targets(&vms);
            gate.confirm_all(&vms)?
        }
    };

    let Some(authorization) = authorization.granted() else {
        println!("{}", "削除をキャンセルしました".yellow());
        return Ok(());
    };

    destroy(&hypervisor, &config, &authorization).await
}

async fn destroy(
    hypervisor: &EsxiHypervisor,
    config: &vmflow_core::DeploymentConfig,
    authorization: &DestroyAuthorization,
) -> anyhow::Result<()> {
    println!();
    println!("{}", "VMを削除中...".blue());

    let workflow = DestroyWorkflow::new(
        hypervisor,
        config.paths.clone(),
        config.timings.destroy_settle,
    );
    let result = workflow.destroy(authorization).await;

    println!();
    for report in &result.reports {
        if report.destroyed {
            println!("  {} {}", "✓".green(), report.vm);
            for file in &report.removed_files {
                println!("    {} {}", "削除:".dimmed(), file.display().to_string().dimmed());
            }
        } else {
            println!("  {} {}", "✗".red(), report.vm);
            if let Some(error) = &report.error {
                println!("    {}", error.red());
            }
        }
    }

    println!();
    println!(
        "{} / {} 台のVMを削除しました",
        result.destroyed().to_string().bold(),
        result.attempted()
    );

    if !result.all_destroyed() {
        anyhow::bail!(
            "{} 台のVMを削除できませんでした",
            result.attempted() - result.destroyed()
        );
    }
    Ok(())
}

/// 確認前にVMの情報を表示
async fn show_vm(hypervisor: &EsxiHypervisor, name: &str) {
    println!("{} {}", "削除するVM:".bold(), name.cyan());
    match hypervisor.vm_info_text(name).await {
        Ok(info) => {
            for line in info.lines() {
                println!("  {}", line);
            }
        }
        Err(e) => println!("  {}", format!("VM情報を取得できません: {e}").yellow()),
    }

    if let Ok(tree) = hypervisor.snapshot_tree(name).await
        && !tree.trim().is_empty()
    {
        println!();
        println!("{}", "スナップショット:".bold());
        for line in tree.lines() {
            println!("  {}", line);
        }
    }
    println!();
}

fn print_targets(vms: &[String]) {
    println!("{}", format!("対象のVM ({} 台):", vms.len()).bold());
    for vm in vms {
        println!("  - {}", vm.cyan());
    }
    println!();
}

async fn list_vms(hypervisor: &EsxiHypervisor) -> anyhow::Result<()> {
    let vms = hypervisor.list_vms().await?;
    if vms.is_empty() {
        println!("{}", "VMはありません".dimmed());
        return Ok(());
    }

    println!("{}", format!("VM一覧 ({} 台)", vms.len()).bold());
    for vm in &vms {
        match hypervisor.vm_summary(vm).await {
            Ok(summary) => {
                let state = summary.power_state.to_string();
                let state = match summary.power_state {
                    vmflow_hypervisor::PowerState::On => state.green(),
                    vmflow_hypervisor::PowerState::Off => state.dimmed(),
                    _ => state.yellow(),
                };
                println!(
                    "  {:<40} {:<12} {}",
                    vm.cyan(),
                    state,
                    summary.ip.as_deref().unwrap_or("-")
                );
            }
            Err(e) => println!("  {:<40} {}", vm.cyan(), format!("({e})").yellow()),
        }
    }
    Ok(())
}
