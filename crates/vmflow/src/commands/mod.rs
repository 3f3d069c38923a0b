pub mod deploy;
pub mod destroy;
pub mod diag;
pub mod validate;

use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use vmflow_core::DeploymentConfig;

/// 設定を読み込む
///
/// `env_file` が指定されていればそのファイル、なければ標準の探索順で探します。
pub fn load_config(env_file: Option<&Path>) -> anyhow::Result<DeploymentConfig> {
    let config = match env_file {
        Some(path) => vmflow_config::load_deployment_config_from(path)?,
        None => vmflow_config::load_deployment_config()?,
    };
    tracing::debug!(host = %config.endpoint.host, "Loaded deployment config");
    Ok(config)
}

/// user-data テンプレートを読み込む（未指定なら `None`）
pub fn read_template(path: Option<&Path>) -> anyhow::Result<Option<String>> {
    path.map(|path| {
        std::fs::read_to_string(path)
            .with_context(|| format!("テンプレートを読み込めません: {}", path.display()))
    })
    .transpose()
}

/// VM情報の見出し
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<12} {}", format!("{label}:").dimmed(), value);
}
