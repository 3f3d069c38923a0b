//! デプロイ設定の構築
//!
//! `.env` の値とプロセスの環境変数をマージして `DeploymentConfig` を作ります。
//! 同じキーが両方にある場合は環境変数を優先します。

use crate::env_file::load_env_file;
use crate::error::{ConfigError, Result};
use crate::find_env_file;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vmflow_core::{DeploymentConfig, HypervisorEndpoint, ImageSource};

/// 設定キー
pub mod keys {
    pub const ESXI_HOST: &str = "ESXI_HOST";
    pub const ESXI_USER: &str = "ESXI_USER";
    pub const ESXI_PASSWORD: &str = "ESXI_PASSWORD";
    pub const VM_CPU: &str = "VM_CPU";
    pub const VM_MEMORY: &str = "VM_MEMORY";
    pub const VM_DISK_SIZE: &str = "VM_DISK_SIZE";
    pub const DATASTORE: &str = "DATASTORE";
    pub const VM_NETWORK: &str = "VM_NETWORK";
    pub const GO_VERSION: &str = "GO_VERSION";
    pub const SSH_KEY_PATH: &str = "SSH_KEY_PATH";
    pub const SSH_USER: &str = "SSH_USER";
    pub const VM_NAME_PREFIX: &str = "VM_NAME_PREFIX";
    pub const VM_HOSTNAME_PREFIX: &str = "VM_HOSTNAME_PREFIX";
    pub const TOOLS_DIR: &str = "VMFLOW_TOOLS_DIR";
    pub const IMAGE_URL: &str = "UBUNTU_IMAGE_URL";
    pub const IMAGE_FILE: &str = "UBUNTU_IMAGE_FILE";
}

/// 探索した `.env` と環境変数から設定を読み込む
///
/// `.env` が見つからない場合は環境変数のみで構築します。
pub fn load_deployment_config() -> Result<DeploymentConfig> {
    let file_vars = match find_env_file() {
        Ok(path) => {
            info!(path = %path.display(), "Using env file");
            load_env_file(&path)?
        }
        Err(ConfigError::EnvFileNotFound) => {
            debug!("No env file found, using process environment only");
            HashMap::new()
        }
        Err(e) => return Err(e),
    };
    build_with_process_env(file_vars)
}

/// 指定した `.env` と環境変数から設定を読み込む
pub fn load_deployment_config_from(path: &Path) -> Result<DeploymentConfig> {
    if !path.exists() {
        return Err(ConfigError::EnvFileNotFound);
    }
    build_with_process_env(load_env_file(path)?)
}

fn build_with_process_env(file_vars: HashMap<String, String>) -> Result<DeploymentConfig> {
    let home = dirs::home_dir();
    build_config(
        |key| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned()),
        home.as_deref(),
    )
}

/// キー検索関数から設定を構築する
///
/// `home` は `~` 展開とデフォルトのツールディレクトリ・SSH鍵の探索に使います。
pub fn build_config<F>(lookup: F, home: Option<&Path>) -> Result<DeploymentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let required = |key: &str| {
        get(key).ok_or_else(|| ConfigError::MissingKey {
            key: key.to_string(),
        })
    };

    let endpoint = HypervisorEndpoint::new(
        required(keys::ESXI_HOST)?,
        get(keys::ESXI_USER).unwrap_or_else(|| "root".to_string()),
        required(keys::ESXI_PASSWORD)?,
    );

    let tools_dir = match get(keys::TOOLS_DIR) {
        Some(dir) => expand_home(&dir, home)?,
        None => home
            .ok_or(ConfigError::HomeDirNotFound)?
            .join("tools")
            .join("vmflow"),
    };

    let mut config = DeploymentConfig::with_defaults(endpoint, tools_dir);

    if let Some(cpus) = parse_number(&get, keys::VM_CPU)? {
        config.sizing.cpus = cpus;
    }
    if let Some(memory) = parse_number(&get, keys::VM_MEMORY)? {
        config.sizing.memory_mb = memory;
    }
    if let Some(disk) = parse_number(&get, keys::VM_DISK_SIZE)? {
        config.sizing.disk_gb = disk;
    }

    if let Some(datastore) = get(keys::DATASTORE) {
        config.datastore = datastore;
    }
    if let Some(network) = get(keys::VM_NETWORK) {
        config.network = network;
    }
    if let Some(go_version) = get(keys::GO_VERSION) {
        config.go_version = go_version;
    }
    if let Some(user) = get(keys::SSH_USER) {
        config.guest.user = user;
    }
    if let Some(prefix) = get(keys::VM_NAME_PREFIX) {
        config.naming.vm_prefix = prefix;
    }
    if let Some(prefix) = get(keys::VM_HOSTNAME_PREFIX) {
        config.naming.hostname_prefix = prefix;
    }

    let default_image = ImageSource::default();
    config.image = ImageSource {
        base_url: get(keys::IMAGE_URL).unwrap_or(default_image.base_url),
        file_name: get(keys::IMAGE_FILE).unwrap_or(default_image.file_name),
    };

    config.guest.ssh_key_path = match get(keys::SSH_KEY_PATH) {
        Some(path) => Some(expand_home(&path, home)?),
        None => home.and_then(find_ssh_key),
    };
    if config.guest.ssh_key_path.is_none() {
        warn!("No SSH public key found, guest will allow password login only");
    }

    debug!(config = ?config, "Deployment config loaded");
    Ok(config)
}

fn parse_number<G>(get: &G, key: &str) -> Result<Option<u32>>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.parse::<u32>().map_err(|_| ConfigError::InvalidNumber {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

fn expand_home(path: &str, home: Option<&Path>) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(home.ok_or(ConfigError::HomeDirNotFound)?.join(rest)),
        None if path == "~" => Ok(home.ok_or(ConfigError::HomeDirNotFound)?.to_path_buf()),
        None => Ok(PathBuf::from(path)),
    }
}

/// `~/.ssh/id_rsa.pub`、`~/.ssh/id_ed25519.pub` の順に公開鍵を探す
pub fn find_ssh_key(home: &Path) -> Option<PathBuf> {
    ["id_rsa.pub", "id_ed25519.pub"]
        .iter()
        .map(|name| home.join(".ssh").join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_required_keys() {
        let home = tempfile::tempdir().unwrap();
        let config = build_config(
            lookup_from(&[("ESXI_HOST", "10.0.0.2"), ("ESXI_PASSWORD", "pw")]),
            Some(home.path()),
        )
        .unwrap();

        assert_eq!(config.endpoint.user, "root");
        assert_eq!(config.sizing.cpus, 8);
        assert_eq!(config.sizing.memory_mb, 8192);
        assert_eq!(config.sizing.disk_gb, 500);
        assert_eq!(config.go_version, "1.24.4");
        assert_eq!(config.paths.tools_dir, home.path().join("tools/vmflow"));
        assert_eq!(config.guest.ssh_key_path, None);
    }

    #[test]
    fn test_missing_password() {
        let result = build_config(lookup_from(&[("ESXI_HOST", "h")]), None);
        match result {
            Err(ConfigError::MissingKey { key }) => assert_eq!(key, "ESXI_PASSWORD"),
            other => panic!("Expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let result = build_config(
            lookup_from(&[("ESXI_HOST", "  "), ("ESXI_PASSWORD", "pw")]),
            None,
        );
        assert!(matches!(result, Err(ConfigError::MissingKey { key }) if key == "ESXI_HOST"));
    }

    #[test]
    fn test_invalid_number_names_key() {
        let home = tempfile::tempdir().unwrap();
        let result = build_config(
            lookup_from(&[
                ("ESXI_HOST", "h"),
                ("ESXI_PASSWORD", "pw"),
                ("VM_MEMORY", "8G"),
            ]),
            Some(home.path()),
        );
        match result {
            Err(ConfigError::InvalidNumber { key, value }) => {
                assert_eq!(key, "VM_MEMORY");
                assert_eq!(value, "8G");
            }
            other => panic!("Expected InvalidNumber, got {:?}", other),
        }
    }

    #[test]
    fn test_overrides_and_tilde_expansion() {
        let home = tempfile::tempdir().unwrap();
        let config = build_config(
            lookup_from(&[
                ("ESXI_HOST", "h"),
                ("ESXI_PASSWORD", "pw"),
                ("VM_CPU", "2"),
                ("DATASTORE", "ssd"),
                ("SSH_KEY_PATH", "~/keys/lab.pub"),
                ("VMFLOW_TOOLS_DIR", "/srv/vmflow"),
                ("VM_NAME_PREFIX", "lab"),
            ]),
            Some(home.path()),
        )
        .unwrap();

        assert_eq!(config.sizing.cpus, 2);
        assert_eq!(config.datastore, "ssd");
        assert_eq!(config.naming.vm_prefix, "lab");
        assert_eq!(
            config.guest.ssh_key_path,
            Some(home.path().join("keys/lab.pub"))
        );
        assert_eq!(
            config.tools.ovftool,
            PathBuf::from("/srv/vmflow/ovftool/ovftool")
        );
    }

    #[test]
    fn test_find_ssh_key_prefers_rsa() {
        let home = tempfile::tempdir().unwrap();
        let ssh = home.path().join(".ssh");
        std::fs::create_dir(&ssh).unwrap();
        std::fs::write(ssh.join("id_ed25519.pub"), "ed").unwrap();
        assert_eq!(find_ssh_key(home.path()), Some(ssh.join("id_ed25519.pub")));

        std::fs::write(ssh.join("id_rsa.pub"), "rsa").unwrap();
        assert_eq!(find_ssh_key(home.path()), Some(ssh.join("id_rsa.pub")));
    }
}
