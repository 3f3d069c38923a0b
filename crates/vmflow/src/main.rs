mod artifacts;
mod commands;
mod progress;
mod prompt;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use vmflow_engine::WaitMode;

#[derive(Parser)]
#[command(name = "vmflow")]
#[command(about = "使い捨てVMを、ESXiに。作って、確かめて、片付ける。", long_about = None)]
struct Cli {
    /// 設定ファイル (.env) のパス
    #[arg(long, global = true, env = "VMFLOW_ENV_PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// VMを作成して cloud-init で構築
    Deploy {
        /// 起動完了の待ち方 (auto, ssh, fixed, skip)
        #[arg(short, long, default_value_t = WaitMode::Auto)]
        wait_mode: WaitMode,
        /// user-data テンプレート（省略時は組み込みテンプレート）
        #[arg(short, long)]
        template: Option<PathBuf>,
        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },
    /// VMを削除
    #[command(group(
        clap::ArgGroup::new("target")
            .required(true)
            .args(["name", "pattern", "all", "list"])
    ))]
    Destroy {
        /// 削除するVM名
        name: Option<String>,
        /// 名前のパターン（glob または部分一致）
        #[arg(short, long)]
        pattern: Option<String>,
        /// 全VMを削除
        #[arg(long)]
        all: bool,
        /// VM一覧を表示（削除しない）
        #[arg(short, long)]
        list: bool,
    },
    /// cloud-init 設定とデプロイ済みVMを検証
    #[command(subcommand)]
    Validate(ValidateCommands),
    /// VMの状態を確認（読み取りのみ）
    #[command(subcommand)]
    Diag(DiagCommands),
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum ValidateCommands {
    /// テンプレートと生成される user-data を検証
    Config {
        /// user-data テンプレート（省略時は組み込みテンプレート）
        #[arg(short, long)]
        template: Option<PathBuf>,
        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },
    /// 稼働中のVMをSSH経由で検証
    Deploy {
        /// VMのIPアドレス
        ip: String,
        /// 結果をJSONで出力
        #[arg(long)]
        json: bool,
    },
    /// 設定とデプロイの両方を検証
    Both {
        /// VMのIPアドレス
        ip: String,
        /// user-data テンプレート（省略時は組み込みテンプレート）
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DiagCommands {
    /// VM一覧
    List,
    /// 電源状態とIPアドレス
    Status {
        /// VM名
        name: String,
    },
    /// vm.info の出力
    Info {
        /// VM名
        name: String,
    },
    /// デバイス一覧
    Devices {
        /// VM名
        name: String,
    },
    /// ゲストのIPアドレス
    Ip {
        /// VM名
        name: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // ログは stderr に出力（stdout は結果表示とJSON用）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,vmflow=info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let env_file = cli.env_file.as_deref();

    match cli.command {
        Commands::Version => {
            println!("vmflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Deploy {
            wait_mode,
            template,
            json,
        } => {
            commands::deploy::handle(env_file, wait_mode, template.as_deref(), json).await?;
        }
        Commands::Destroy {
            name,
            pattern,
            all,
            list,
        } => {
            let target = if list {
                commands::destroy::Target::List
            } else if all {
                commands::destroy::Target::All
            } else if let Some(pattern) = pattern {
                commands::destroy::Target::Pattern(pattern)
            } else if let Some(name) = name {
                commands::destroy::Target::Single(name)
            } else {
                anyhow::bail!("VM名、--pattern、--all、--list のいずれかを指定してください");
            };
            commands::destroy::handle(env_file, target).await?;
        }
        Commands::Validate(command) => match command {
            ValidateCommands::Config { template, json } => {
                commands::validate::handle_config(env_file, template.as_deref(), json).await?;
            }
            ValidateCommands::Deploy { ip, json } => {
                commands::validate::handle_deploy(env_file, &ip, json).await?;
            }
            ValidateCommands::Both { ip, template } => {
                commands::validate::handle_both(env_file, &ip, template.as_deref()).await?;
            }
        },
        Commands::Diag(command) => {
            let config = commands::load_config(env_file)?;
            let hypervisor = vmflow_esxi::EsxiHypervisor::from_config(&config);
            match command {
                DiagCommands::List => commands::diag::handle_list(&hypervisor).await?,
                DiagCommands::Status { name } => {
                    commands::diag::handle_status(&hypervisor, &name).await?
                }
                DiagCommands::Info { name } => {
                    commands::diag::handle_info(&hypervisor, &name).await?
                }
                DiagCommands::Devices { name } => {
                    commands::diag::handle_devices(&hypervisor, &name).await?
                }
                DiagCommands::Ip { name } => commands::diag::handle_ip(&hypervisor, &name).await?,
            }
        }
    }

    Ok(())
}
