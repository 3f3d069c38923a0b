//! 検証エンジン
//!
//! 設定時（テンプレートと生成済みドキュメント）とデプロイ後（稼働中のゲスト）の
//! 2種類の検証を行い、結果を [`ValidationReport`] に集約します。
//! 検証ごとに空のレポートから始め、レポート同士の結合は行いません。

mod config;
mod deploy;

pub use config::{check_document, check_template_source, validate_config, validate_document};
pub use deploy::DeploymentValidator;

use serde::Serialize;

/// 検証結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        self.info.push(message.into());
    }

    /// エラーが無ければ合格（警告は合否に影響しない）
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// ゲストに入っているべきコンポーネント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedComponent {
    pub name: &'static str,
    /// runcmd 内にインストール手順があるとみなす文字列（小文字で比較）
    pub install_markers: &'static [&'static str],
    /// デプロイ後の確認コマンド
    pub check_command: &'static str,
}

/// 標準で確認するコンポーネント
pub const EXPECTED_COMPONENTS: &[ExpectedComponent] = &[
    ExpectedComponent {
        name: "Docker",
        install_markers: &["docker"],
        check_command: "docker --version && systemctl is-active docker",
    },
    ExpectedComponent {
        name: "Go",
        install_markers: &["golang", "/usr/local/go"],
        check_command: "/usr/local/go/bin/go version",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_do_not_fail() {
        let mut report = ValidationReport::new();
        report.add_warning("something odd");
        report.add_info("fine");
        assert!(report.passed());

        report.add_error("broken");
        assert!(!report.passed());
    }

    #[test]
    fn test_report_serializes() {
        let mut report = ValidationReport::new();
        report.add_error("e");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0], "e");
        assert_eq!(json["warnings"].as_array().map(Vec::len), Some(0));
    }
}
