//! ローカル成果物の準備（ツール確認・イメージ取得・ISO作成）

use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use vmflow_core::DeploymentConfig;
use vmflow_engine::{ArtifactStager, StageError};

/// ISO に入れるファイル
const SEED_FILES: [&str; 3] = ["user-data", "meta-data", "network-config"];

/// ISO のボリュームラベル（NoCloud データソースの識別子）
const VOLUME_ID: &str = "cidata";

pub struct LocalStager {
    client: reqwest::Client,
}

impl LocalStager {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", "vmflow")
            .send()
            .await?
            .error_for_status()?;

        let pb = match response.content_length() {
            Some(total) => {
                let pb = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };

        // 途中で失敗したファイルを本来の名前で残さない
        let partial = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);
        pb.finish_and_clear();

        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }
}

/// PATH 上の実行ファイルを探す
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

async fn run_iso_tool(tool: &str, args: &[&OsStr]) -> std::io::Result<std::process::Output> {
    debug!("Running: {} {:?}", tool, args);
    Command::new(tool).args(args).output().await
}

#[async_trait]
impl ArtifactStager for LocalStager {
    async fn missing_tools(&self, config: &DeploymentConfig) -> Vec<String> {
        let mut missing = Vec::new();

        for (name, path) in [("ovftool", &config.tools.ovftool), ("govc", &config.tools.govc)] {
            if !path.is_file() {
                missing.push(format!("{name} ({})", path.display()));
            }
        }
        if find_in_path("ssh").is_none() {
            missing.push("ssh".to_string());
        }
        if find_in_path("mkisofs").is_none() && find_in_path("genisoimage").is_none() {
            missing.push("mkisofs or genisoimage".to_string());
        }

        missing
    }

    async fn ensure_image(&self, config: &DeploymentConfig) -> Result<(), StageError> {
        let path = config.paths.image_path(&config.image);
        if path.is_file() {
            info!(image = %path.display(), "Cloud image already present");
            return Ok(());
        }

        let url = config.image.url();
        info!(url = %url, "Downloading cloud image");
        self.download(&url, &path)
            .await
            .map_err(|e| StageError::Artifact(format!("image download from {url} failed: {e:#}")))
    }

    async fn build_iso(&self, source_dir: &Path, iso: &Path) -> Result<(), StageError> {
        let files: Vec<PathBuf> = SEED_FILES.iter().map(|f| source_dir.join(f)).collect();
        let file_args = files.iter().map(|f| f.as_os_str());

        let mkisofs: Vec<&OsStr> = [OsStr::new("-o"), iso.as_os_str()]
            .into_iter()
            .chain(["-V", VOLUME_ID, "-J", "-R"].map(OsStr::new))
            .chain(file_args.clone())
            .collect();

        let output = match run_iso_tool("mkisofs", &mkisofs).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("mkisofs not found, trying genisoimage");
                let genisoimage: Vec<&OsStr> = [OsStr::new("-output"), iso.as_os_str()]
                    .into_iter()
                    .chain(["-volid", VOLUME_ID, "-joliet", "-rock"].map(OsStr::new))
                    .chain(file_args)
                    .collect();
                run_iso_tool("genisoimage", &genisoimage).await?
            }
            result => result?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Artifact(format!(
                "ISO creation failed: {}",
                stderr.trim()
            )));
        }
        debug!(iso = %iso.display(), "Cloud-init ISO created");
        Ok(())
    }
}
