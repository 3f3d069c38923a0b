use super::{load_config, read_template};
use colored::Colorize;
use std::path::Path;
use vmflow_core::{
    CloudInitDocument, DeploymentConfig, HypervisorEndpoint, USER_DATA_TEMPLATE, VmIdentity,
};
use vmflow_engine::validation::{check_template_source, validate_config};
use vmflow_engine::{DeploymentValidator, ValidationReport};
use vmflow_esxi::OpenSsh;

/// 検証用の設定
///
/// ESXi の接続情報は検証に使わないため、設定ファイルが見つからない場合は
/// デフォルト値で続行します。明示されたファイルが読めない場合はエラーです。
fn validation_config(env_file: Option<&Path>) -> anyhow::Result<DeploymentConfig> {
    match load_config(env_file) {
        Ok(config) => Ok(config),
        Err(e) if env_file.is_none() => {
            tracing::debug!(error = %e, "No deployment config, validating with defaults");
            Ok(DeploymentConfig::with_defaults(
                HypervisorEndpoint::new("", "root", ""),
                std::env::temp_dir(),
            ))
        }
        Err(e) => Err(e),
    }
}

/// 設定時の検証を実行
async fn config_report(config: &DeploymentConfig, template: &str) -> ValidationReport {
    let ssh_key = match &config.guest.ssh_key_path {
        Some(path) => tokio::fs::read_to_string(path).await.ok(),
        None => None,
    };
    let vm = VmIdentity::generate(&config.naming);

    match CloudInitDocument::render_with(template, config, &vm, ssh_key.as_deref()) {
        Ok(document) => validate_config(template, &document.user_data),
        Err(e) => {
            let mut report = ValidationReport::new();
            check_template_source(template, &mut report);
            report.add_error(format!("Template rendering failed: {e}"));
            report
        }
    }
}

async fn deploy_report(config: &DeploymentConfig, ip: &str) -> ValidationReport {
    let shell = OpenSsh::default();
    let target = format!("{}@{}", config.guest.user, ip);
    DeploymentValidator::new(&shell, target, &config.naming.hostname_prefix)
        .validate()
        .await
}

pub async fn handle_config(
    env_file: Option<&Path>,
    template: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = validation_config(env_file)?;
    let template = read_template(template)?;
    let template = template.as_deref().unwrap_or(USER_DATA_TEMPLATE);

    if !json {
        println!("{}", "cloud-init 設定を検証中...".blue());
    }
    let report = config_report(&config, template).await;
    finish(&report, "設定の検証", json)
}

pub async fn handle_deploy(env_file: Option<&Path>, ip: &str, json: bool) -> anyhow::Result<()> {
    let config = validation_config(env_file)?;

    if !json {
        println!(
            "{} {}",
            "デプロイ済みVMを検証中:".blue(),
            format!("{}@{}", config.guest.user, ip).cyan()
        );
    }
    let report = deploy_report(&config, ip).await;
    finish(&report, "デプロイの検証", json)
}

pub async fn handle_both(
    env_file: Option<&Path>,
    ip: &str,
    template: Option<&Path>,
) -> anyhow::Result<()> {
    let config = validation_config(env_file)?;
    let template = read_template(template)?;
    let template = template.as_deref().unwrap_or(USER_DATA_TEMPLATE);

    println!("{}", "cloud-init 設定を検証中...".blue());
    let config_result = config_report(&config, template).await;
    print_report("設定の検証", &config_result);

    println!();
    println!("{} {}", "デプロイ済みVMを検証中:".blue(), ip.cyan());
    let deploy_result = deploy_report(&config, ip).await;
    print_report("デプロイの検証", &deploy_result);

    let errors = config_result.errors.len() + deploy_result.errors.len();
    let warnings = config_result.warnings.len() + deploy_result.warnings.len();

    println!();
    println!("{}", "総合結果".bold());
    print_verdict("  設定", &config_result);
    print_verdict("  デプロイ", &deploy_result);
    println!("  エラー {errors} 件 / 警告 {warnings} 件");

    if errors > 0 {
        anyhow::bail!("検証に失敗しました");
    }
    println!("{}", "✓ すべての検証に合格しました".green().bold());
    Ok(())
}

fn finish(report: &ValidationReport, title: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_report(title, report);
    }

    if !report.passed() {
        anyhow::bail!("{title}に失敗しました（エラー {} 件）", report.errors.len());
    }
    Ok(())
}

fn print_verdict(label: &str, report: &ValidationReport) {
    if report.passed() {
        println!("{}: {}", label, "PASS".green().bold());
    } else {
        println!("{}: {}", label, "FAIL".red().bold());
    }
}

/// 検証結果を表示
pub fn print_report(title: &str, report: &ValidationReport) {
    println!();
    println!("{}", title.bold());
    for info in &report.info {
        println!("  {} {}", "✓".green(), info);
    }
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning.yellow());
    }
    for error in &report.errors {
        println!("  {} {}", "✗".red(), error.red());
    }

    if report.passed() {
        println!(
            "{} {}",
            "✓ 合格".green().bold(),
            format!("(警告 {} 件)", report.warnings.len()).dimmed()
        );
    } else {
        println!(
            "{} {}",
            "✗ 不合格".red().bold(),
            format!(
                "(エラー {} 件, 警告 {} 件)",
                report.errors.len(),
                report.warnings.len()
            )
            .dimmed()
        );
    }
}
