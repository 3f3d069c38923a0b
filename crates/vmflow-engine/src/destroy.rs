//! VM削除ワークフロー
//!
//! 電源オフ → 待機 → スナップショット削除 → VM削除 → ローカル成果物の削除
//! の順に実行します。電源オフとスナップショット削除の失敗は続行可能です。

use crate::confirm::DestroyAuthorization;
use crate::error::DestroyError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use vmflow_core::WorkPaths;
use vmflow_hypervisor::Hypervisor;

/// 1台分の削除結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VmDestroyReport {
    pub vm: String,
    /// false の場合は既に電源オフだった
    pub powered_off: bool,
    /// false の場合はスナップショットが無かった
    pub snapshots_removed: bool,
    pub destroyed: bool,
    pub removed_files: Vec<PathBuf>,
    pub error: Option<String>,
}

/// 削除結果のまとめ
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub reports: Vec<VmDestroyReport>,
}

impl BulkReport {
    pub fn destroyed(&self) -> usize {
        self.reports.iter().filter(|r| r.destroyed).count()
    }

    pub fn attempted(&self) -> usize {
        self.reports.len()
    }

    pub fn all_destroyed(&self) -> bool {
        self.destroyed() == self.attempted()
    }

    pub fn failures(&self) -> impl Iterator<Item = &VmDestroyReport> {
        self.reports.iter().filter(|r| !r.destroyed)
    }
}

/// 削除ワークフロー
pub struct DestroyWorkflow<'a> {
    hypervisor: &'a dyn Hypervisor,
    paths: WorkPaths,
    settle: Duration,
}

impl<'a> DestroyWorkflow<'a> {
    pub fn new(hypervisor: &'a dyn Hypervisor, paths: WorkPaths, settle: Duration) -> Self {
        Self {
            hypervisor,
            paths,
            settle,
        }
    }

    /// 許可されたVMを順に削除する
    ///
    /// 1台の失敗で残りの削除は止めません。
    pub async fn destroy(&self, authorization: &DestroyAuthorization) -> BulkReport {
        let mut bulk = BulkReport::default();
        let total = authorization.vms().len();

        for (index, vm) in authorization.vms().iter().enumerate() {
            info!(vm = %vm, "[{}/{}] Destroying VM", index + 1, total);
            bulk.reports.push(self.destroy_one(vm).await);
        }

        info!(
            destroyed = bulk.destroyed(),
            attempted = bulk.attempted(),
            "Destroy finished"
        );
        bulk
    }

    async fn destroy_one(&self, vm: &str) -> VmDestroyReport {
        let mut report = VmDestroyReport {
            vm: vm.to_string(),
            ..Default::default()
        };

        match self.hypervisor.power_off(vm).await {
            Ok(()) => report.powered_off = true,
            Err(e) => debug!(vm, error = %e, "Power off failed, VM already off"),
        }

        tokio::time::sleep(self.settle).await;

        match self.hypervisor.remove_snapshots(vm).await {
            Ok(()) => report.snapshots_removed = true,
            Err(e) => debug!(vm, error = %e, "No snapshots to remove"),
        }

        if let Err(e) = self.hypervisor.destroy_vm(vm).await {
            let error = DestroyError::DestroyFailed {
                vm: vm.to_string(),
                source: e,
            };
            warn!("{}", error);
            report.error = Some(error.to_string());
            return report;
        }
        report.destroyed = true;

        report.removed_files = remove_local_artifacts(&self.paths, vm).await;
        report
    }
}

/// デプロイ時にこのVM用に作った ISO と cloud-init ディレクトリを削除する
///
/// 他のVMの成果物やキャッシュ済みイメージには触れません。
pub async fn remove_local_artifacts(paths: &WorkPaths, vm: &str) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for path in [paths.iso_path(vm), paths.cloud_init_dir(vm)] {
        let Ok(metadata) = tokio::fs::symlink_metadata(&path).await else {
            continue;
        };
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => removed.push(path),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove local file"),
        }
    }

    removed
}

/// パターンに一致するか
///
/// `*` `?` `[` を含む場合は glob、それ以外は部分一致。
pub fn matches_pattern(pattern: &str, name: &str) -> Result<bool, DestroyError> {
    if pattern.contains(['*', '?', '[']) {
        let glob = glob::Pattern::new(pattern)
            .map_err(|e| DestroyError::InvalidPattern(format!("{pattern}: {e}")))?;
        Ok(glob.matches(name))
    } else {
        Ok(name.contains(pattern))
    }
}

/// パターンに一致するVMを探す
pub async fn find_matching(
    hypervisor: &dyn Hypervisor,
    pattern: &str,
) -> Result<Vec<String>, DestroyError> {
    let vms = hypervisor.list_vms().await.map_err(DestroyError::Listing)?;
    let mut matching = Vec::new();
    for vm in vms {
        if matches_pattern(pattern, &vm)? {
            matching.push(vm);
        }
    }
    Ok(matching)
}
