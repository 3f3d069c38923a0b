//! 代替手段付きオペレーション実行
//!
//! ハイパーバイザーのバージョンによって受け付ける引数が異なる操作を、
//! 候補の呼び出し方法（ストラテジー）を順に試して実行します。
//! この層ではリトライやバックオフは行いません。

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};
use vmflow_hypervisor::{BootDevice, BootOrder, Device, DiskSelector, Hypervisor};

/// 1回分の呼び出し内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Invocation {
    ResizeDisk { disk: DiskSelector, size_gb: u32 },
    SetBootOrder { order: BootOrder },
    ConnectDevice { device: String },
}

impl Invocation {
    pub async fn invoke(
        &self,
        hypervisor: &dyn Hypervisor,
        vm: &str,
    ) -> vmflow_hypervisor::Result<()> {
        match self {
            Invocation::ResizeDisk { disk, size_gb } => {
                hypervisor.resize_disk(vm, disk, *size_gb).await
            }
            Invocation::SetBootOrder { order } => hypervisor.set_boot_order(vm, order).await,
            Invocation::ConnectDevice { device } => hypervisor.connect_device(vm, device).await,
        }
    }
}

/// 呼び出し方法の候補
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStrategy {
    pub id: String,
    pub invocation: Invocation,
}

impl OperationStrategy {
    pub fn new(id: impl Into<String>, invocation: Invocation) -> Self {
        Self {
            id: id.into(),
            invocation,
        }
    }
}

/// 1つのストラテジーの実行結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub strategy_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// 実行結果
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub operation: String,
    /// 試行順の結果
    pub outcomes: Vec<OperationOutcome>,
    pub success: bool,
    pub duration_ms: u64,
}

impl ExecutionReport {
    /// 成功したストラテジーのID
    pub fn succeeded_with(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .find(|o| o.success)
            .map(|o| o.strategy_id.as_str())
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.outcomes.iter().rev().find_map(|o| o.error.as_deref())
    }
}

/// ストラテジーを順に試す実行器
pub struct ResilientExecutor<'a> {
    hypervisor: &'a dyn Hypervisor,
}

impl<'a> ResilientExecutor<'a> {
    pub fn new(hypervisor: &'a dyn Hypervisor) -> Self {
        Self { hypervisor }
    }

    /// 最初に成功したストラテジーで止まる
    ///
    /// 全て失敗した場合は `success == false` のレポートを返します。
    /// 致命的かどうかは呼び出し側が判断します。
    pub async fn execute(
        &self,
        operation: &str,
        vm: &str,
        strategies: &[OperationStrategy],
    ) -> ExecutionReport {
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(strategies.len());
        let mut success = false;

        for strategy in strategies {
            debug!(operation, strategy = %strategy.id, "Trying strategy");

            match strategy.invocation.invoke(self.hypervisor, vm).await {
                Ok(()) => {
                    outcomes.push(OperationOutcome {
                        strategy_id: strategy.id.clone(),
                        success: true,
                        error: None,
                    });
                    success = true;
                    break;
                }
                Err(e) => {
                    warn!(operation, strategy = %strategy.id, error = %e, "Strategy failed");
                    outcomes.push(OperationOutcome {
                        strategy_id: strategy.id.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if !success {
            warn!(
                operation,
                attempted = outcomes.len(),
                "All strategies failed"
            );
        }

        ExecutionReport {
            operation: operation.to_string(),
            outcomes,
            success,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// ディスク拡張の候補
///
/// デフォルト、ラベル "Hard disk 1"、キー 2000、
/// その後 `list_devices` で見つかったディスクごとに名前指定。
pub fn disk_resize_strategies(size_gb: u32, discovered: &[Device]) -> Vec<OperationStrategy> {
    let mut strategies = vec![
        OperationStrategy::new(
            "resize-default",
            Invocation::ResizeDisk {
                disk: DiskSelector::Default,
                size_gb,
            },
        ),
        OperationStrategy::new(
            "resize-by-label",
            Invocation::ResizeDisk {
                disk: DiskSelector::Label("Hard disk 1".to_string()),
                size_gb,
            },
        ),
        OperationStrategy::new(
            "resize-by-key",
            Invocation::ResizeDisk {
                disk: DiskSelector::Key(2000),
                size_gb,
            },
        ),
    ];

    strategies.extend(discovered.iter().filter(|d| d.is_disk()).map(|disk| {
        OperationStrategy::new(
            format!("resize-by-name:{}", disk.name),
            Invocation::ResizeDisk {
                disk: DiskSelector::Name(disk.name.clone()),
                size_gb,
            },
        )
    }));

    strategies
}

/// ブート順設定の候補
pub fn boot_order_strategies() -> Vec<OperationStrategy> {
    let cdrom_disk = BootOrder::new(vec![BootDevice::Cdrom, BootDevice::Disk]);
    vec![
        OperationStrategy::new(
            "boot-cdrom-disk",
            Invocation::SetBootOrder {
                order: cdrom_disk.clone(),
            },
        ),
        OperationStrategy::new(
            "boot-cdrom-disk-delay",
            Invocation::SetBootOrder {
                order: cdrom_disk.with_delay(5000),
            },
        ),
        OperationStrategy::new(
            "boot-cdrom-only",
            Invocation::SetBootOrder {
                order: BootOrder::new(vec![BootDevice::Cdrom]),
            },
        ),
    ]
}

/// デバイス接続の候補（単一）
pub fn connect_strategies(device: &str) -> Vec<OperationStrategy> {
    vec![OperationStrategy::new(
        format!("connect:{device}"),
        Invocation::ConnectDevice {
            device: device.to_string(),
        },
    )]
}
