//! デプロイ設定
//!
//! 1回のデプロイで使う設定値。実行開始時に一度だけ構築され、
//! 以降は `&DeploymentConfig` として各ステージに渡されます。

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ハイパーバイザー接続情報
#[derive(Clone, PartialEq, Eq)]
pub struct HypervisorEndpoint {
    /// ESXi ホスト名またはIPアドレス
    pub host: String,
    pub user: String,
    pub password: String,
}

impl HypervisorEndpoint {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// govc 用の SDK URL
    pub fn sdk_url(&self) -> String {
        format!("https://{}/sdk", self.host)
    }
}

// パスワードはログに出さない
impl fmt::Debug for HypervisorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HypervisorEndpoint")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

/// VMのサイズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmSizing {
    pub cpus: u32,
    pub memory_mb: u32,
    pub disk_gb: u32,
}

impl Default for VmSizing {
    fn default() -> Self {
        Self {
            cpus: 8,
            memory_mb: 8192,
            disk_gb: 500,
        }
    }
}

/// VM名・ホスト名のプレフィックス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingSeed {
    /// VM名のプレフィックス（例: "ubuntu-pentest"）
    pub vm_prefix: String,
    /// ゲストのホスト名のプレフィックス（例: "pentest"）
    pub hostname_prefix: String,
}

impl Default for NamingSeed {
    fn default() -> Self {
        Self {
            vm_prefix: "ubuntu-pentest".to_string(),
            hostname_prefix: "pentest".to_string(),
        }
    }
}

/// ゲストへのログイン情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestAccess {
    /// SSHユーザー名（デフォルト: "ubuntu"）
    pub user: String,
    /// 公開鍵ファイル。見つからない場合はパスワード認証のみになる
    pub ssh_key_path: Option<PathBuf>,
}

impl Default for GuestAccess {
    fn default() -> Self {
        Self {
            user: "ubuntu".to_string(),
            ssh_key_path: None,
        }
    }
}

/// 作業ディレクトリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPaths {
    pub tools_dir: PathBuf,
    pub work_dir: PathBuf,
    pub iso_dir: PathBuf,
}

impl WorkPaths {
    pub fn under(tools_dir: impl Into<PathBuf>) -> Self {
        let tools_dir = tools_dir.into();
        Self {
            work_dir: tools_dir.join("work"),
            iso_dir: tools_dir.join("iso"),
            tools_dir,
        }
    }

    /// 作成が必要なディレクトリ一覧
    pub fn all(&self) -> [&Path; 3] {
        [&self.tools_dir, &self.work_dir, &self.iso_dir]
    }

    /// ダウンロード済みクラウドイメージの配置先
    pub fn image_path(&self, image: &ImageSource) -> PathBuf {
        self.work_dir.join(&image.file_name)
    }

    /// VMごとの cloud-init ISO の配置先
    pub fn iso_path(&self, vm_name: &str) -> PathBuf {
        self.work_dir.join(format!("{vm_name}-cloud-init.iso"))
    }

    /// ISO に詰める user-data / meta-data / network-config の書き出し先
    pub fn cloud_init_dir(&self, vm_name: &str) -> PathBuf {
        self.work_dir.join(format!("{vm_name}-cloud-init"))
    }
}

/// 外部ツールのパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ovftool: PathBuf,
    pub govc: PathBuf,
}

impl ToolPaths {
    pub fn under(tools_dir: &Path) -> Self {
        Self {
            ovftool: tools_dir.join("ovftool").join("ovftool"),
            govc: tools_dir.join("govc").join("govc"),
        }
    }
}

/// クラウドイメージの取得元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub base_url: String,
    pub file_name: String,
}

impl ImageSource {
    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.file_name)
    }
}

impl Default for ImageSource {
    fn default() -> Self {
        Self {
            base_url: "https://cloud-images.ubuntu.com/oracular/current".to_string(),
            file_name: "oracular-server-cloudimg-amd64.ova".to_string(),
        }
    }
}

/// ポーリング上限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollBounds {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollBounds {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// 全試行を使い切った場合の最大待ち時間
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// 待機時間の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// IPアドレス取得待ち
    pub guest_ip: PollBounds,
    /// SSH疎通待ち
    pub ssh_reachable: PollBounds,
    /// cloud-init 完了待ち
    pub first_boot: PollBounds,
    /// cloud-init 確認前の待機
    pub first_boot_settle: Duration,
    /// 固定待機の合計時間
    pub fixed_wait: Duration,
    /// 固定待機の進捗表示間隔
    pub fixed_wait_step: Duration,
    /// 電源オフ後、スナップショット削除までの待機
    pub destroy_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            guest_ip: PollBounds::new(Duration::from_secs(10), 60),
            ssh_reachable: PollBounds::new(Duration::from_secs(10), 12),
            first_boot: PollBounds::new(Duration::from_secs(30), 20),
            first_boot_settle: Duration::from_secs(30),
            fixed_wait: Duration::from_secs(600),
            fixed_wait_step: Duration::from_secs(60),
            destroy_settle: Duration::from_secs(3),
        }
    }
}

/// デプロイ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub endpoint: HypervisorEndpoint,
    pub sizing: VmSizing,
    pub datastore: String,
    /// VMを接続するポートグループ
    pub network: String,
    pub naming: NamingSeed,
    pub guest: GuestAccess,
    pub paths: WorkPaths,
    pub tools: ToolPaths,
    pub image: ImageSource,
    /// ゲストにインストールする Go のバージョン
    pub go_version: String,
    pub timings: Timings,
}

impl DeploymentConfig {
    /// デフォルト値で設定を作成
    pub fn with_defaults(endpoint: HypervisorEndpoint, tools_dir: impl Into<PathBuf>) -> Self {
        let paths = WorkPaths::under(tools_dir);
        let tools = ToolPaths::under(&paths.tools_dir);
        Self {
            endpoint,
            sizing: VmSizing::default(),
            datastore: "datastore1".to_string(),
            network: "VM Network".to_string(),
            naming: NamingSeed::default(),
            guest: GuestAccess::default(),
            paths,
            tools,
            image: ImageSource::default(),
            go_version: "1.24.4".to_string(),
            timings: Timings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> HypervisorEndpoint {
        HypervisorEndpoint::new("10.0.0.2", "root", "s3cret!")
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DeploymentConfig::with_defaults(endpoint(), "/tmp/vmflow");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret!"));
        assert!(debug.contains("10.0.0.2"));
    }

    #[test]
    fn test_sdk_url() {
        assert_eq!(endpoint().sdk_url(), "https://10.0.0.2/sdk");
    }

    #[test]
    fn test_paths_under_tools_dir() {
        let config = DeploymentConfig::with_defaults(endpoint(), "/opt/vmflow");
        assert_eq!(config.paths.work_dir, PathBuf::from("/opt/vmflow/work"));
        assert_eq!(config.paths.iso_dir, PathBuf::from("/opt/vmflow/iso"));
        assert_eq!(config.tools.govc, PathBuf::from("/opt/vmflow/govc/govc"));
        assert_eq!(
            config.paths.iso_path("vm-1"),
            PathBuf::from("/opt/vmflow/work/vm-1-cloud-init.iso")
        );
        assert_eq!(
            config.paths.image_path(&config.image),
            PathBuf::from("/opt/vmflow/work/oracular-server-cloudimg-amd64.ova")
        );
    }

    #[test]
    fn test_image_url_joins_without_double_slash() {
        let image = ImageSource {
            base_url: "https://example.com/images/".to_string(),
            file_name: "disk.ova".to_string(),
        };
        assert_eq!(image.url(), "https://example.com/images/disk.ova");
    }

    #[test]
    fn test_default_timings() {
        let timings = Timings::default();
        assert_eq!(timings.guest_ip.max_attempts, 60);
        assert_eq!(timings.guest_ip.budget(), Duration::from_secs(590));
        assert_eq!(timings.first_boot.interval, Duration::from_secs(30));
        assert_eq!(timings.fixed_wait, Duration::from_secs(600));
    }
}
