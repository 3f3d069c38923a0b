use super::{load_config, print_field, read_template};
use crate::artifacts::LocalStager;
use crate::commands::validate::print_report;
use crate::progress::DeployProgress;
use colored::Colorize;
use std::path::Path;
use vmflow_core::{DeploymentConfig, VmIdentity};
use vmflow_engine::stages::WAIT_FOR_COMPLETION;
use vmflow_engine::{
    DeployOptions, Pipeline, PipelineError, PipelineObserver, PipelineReport, QuietObserver,
    StageContext, StageError, WaitMode, standard_stages,
};
use vmflow_esxi::{EsxiHypervisor, OpenSsh};

pub async fn handle(
    env_file: Option<&Path>,
    wait_mode: WaitMode,
    template: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(env_file)?;
    let options = DeployOptions {
        wait_mode,
        template: read_template(template)?,
    };
    let mut vm = VmIdentity::generate(&config.naming);

    if !json {
        print_plan(&config, &vm, wait_mode);
    }

    let hypervisor = EsxiHypervisor::from_config(&config);
    let shell = OpenSsh::default();
    let stager = LocalStager::new();
    let progress = DeployProgress::new();
    let ctx = StageContext {
        config: &config,
        hypervisor: &hypervisor,
        shell: &shell,
        stager: &stager,
        options: &options,
        observer: if json {
            &QuietObserver as &dyn PipelineObserver
        } else {
            &progress
        },
    };

    let mut pipeline = Pipeline::new(standard_stages());
    let result = pipeline.run(&ctx, &mut vm).await;

    if json {
        let report = match &result {
            Ok(report) => report,
            Err(_) => pipeline.report(),
        };
        print_json(&vm, report, result.as_ref().err())?;
    }

    match result {
        Ok(report) => {
            if !json {
                print_summary(&config, &vm, &report);
            }
            if let Some(validation) = report.validation_for(WAIT_FOR_COMPLETION)
                && !validation.passed()
            {
                anyhow::bail!(
                    "VM {} はデプロイされましたが、検証に失敗しました（エラー {} 件）",
                    vm.name,
                    validation.errors.len()
                );
            }
            Ok(())
        }
        Err(e) => {
            if !json {
                print_failure(&vm, &e);
            }
            Err(anyhow::Error::new(e).context(format!("VM {} のデプロイに失敗しました", vm.name)))
        }
    }
}

fn print_plan(config: &DeploymentConfig, vm: &VmIdentity, wait_mode: WaitMode) {
    println!("{}", "VMをデプロイします".blue().bold());
    print_field("VM名", vm.name.cyan());
    print_field("ホスト名", &vm.hostname);
    print_field("ESXi", &config.endpoint.host);
    print_field("データストア", &config.datastore);
    print_field(
        "スペック",
        format!(
            "{} vCPU / {} MB / {} GB",
            config.sizing.cpus, config.sizing.memory_mb, config.sizing.disk_gb
        ),
    );
    print_field("待機方法", wait_mode);
    println!();
}

fn print_summary(config: &DeploymentConfig, vm: &VmIdentity, report: &PipelineReport) {
    println!();
    let warnings: Vec<(&str, &str)> = report.warnings().collect();
    if !warnings.is_empty() {
        println!("{}", format!("⚠ 警告 {} 件", warnings.len()).yellow().bold());
        for (stage, warning) in &warnings {
            println!("  {} {}", format!("[{stage}]").dimmed(), warning);
        }
        println!();
    }

    if let Some(validation) = report.validation_for(WAIT_FOR_COMPLETION) {
        print_report("デプロイの検証", validation);
        println!();
    }

    println!("{}", "✓ デプロイが完了しました".green().bold());
    print_field("VM名", vm.name.cyan());
    print_field("ホスト名", &vm.hostname);
    print_field("IPアドレス", vm.ip.as_deref().unwrap_or("不明"));
    println!();

    match vm.ssh_target(&config.guest.user) {
        Some(target) => {
            println!("{}", "ログイン:".bold());
            println!("  ssh {}", target.cyan());
            println!();
            println!("{}", "cloud-init の状態確認:".bold());
            println!("  ssh {target} cloud-init status --long");
        }
        None => {
            println!(
                "{}",
                "IPアドレスを取得できませんでした。ESXi のコンソールを確認してください:".yellow()
            );
            println!("  vmflow diag ip {}", vm.name);
        }
    }
    println!();
    println!("{}", "削除:".bold());
    println!("  vmflow destroy {}", vm.name);
}

fn print_failure(vm: &VmIdentity, error: &PipelineError) {
    let PipelineError::Aborted { stage, source } = error;
    eprintln!();
    eprintln!(
        "{} {}",
        "✗ デプロイに失敗しました".red().bold(),
        format!("(ステージ: {stage})").dimmed()
    );
    eprintln!("  {}", source);

    if let StageError::Validation(report) = source {
        for error in &report.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
    }

    eprintln!();
    eprintln!("作成途中のVMが残っている場合は削除してください:");
    eprintln!("  vmflow destroy {}", vm.name);
}

fn print_json(
    vm: &VmIdentity,
    report: &PipelineReport,
    error: Option<&PipelineError>,
) -> anyhow::Result<()> {
    let value = serde_json::json!({
        "vm": {
            "name": vm.name,
            "hostname": vm.hostname,
            "ip": vm.ip,
        },
        "success": error.is_none(),
        "failed_stage": error.map(PipelineError::stage),
        "error": error.map(|e| e.to_string()),
        "stages": report.stages,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
