//! VM識別子

use crate::model::NamingSeed;
use crate::naming;
use chrono::{DateTime, Local};

/// デプロイ中のVMの識別子
///
/// 実行開始時に一度だけ生成されます。`ip` はゲストのIPアドレスが
/// 観測されるまで `None` のままです。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmIdentity {
    pub name: String,
    pub hostname: String,
    pub ip: Option<String>,
}

impl VmIdentity {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            ip: None,
        }
    }

    /// 現在時刻から識別子を生成
    pub fn generate(seed: &NamingSeed) -> Self {
        Self::from_seed(seed, Local::now())
    }

    /// 指定時刻から識別子を生成
    pub fn from_seed(seed: &NamingSeed, at: DateTime<Local>) -> Self {
        let stamp = naming::timestamp(at);
        Self::new(
            format!("{}-{}", seed.vm_prefix, stamp),
            format!("{}-{}", seed.hostname_prefix, stamp),
        )
    }

    /// 観測したIPアドレスを記録
    pub fn record_ip(&mut self, ip: impl Into<String>) {
        self.ip = Some(ip.into());
    }

    /// `user@ip` 形式のSSH接続先
    pub fn ssh_target(&self, user: &str) -> Option<String> {
        self.ip.as_ref().map(|ip| format!("{user}@{ip}"))
    }
}
