//! vmflow の設定読み込み
//!
//! `.env` ファイルの探索と、そこから `DeploymentConfig` を構築する処理を提供します。

pub mod env_file;
pub mod error;
pub mod loader;

pub use env_file::{load_env_file, parse_env};
pub use error::*;
pub use loader::{build_config, find_ssh_key, load_deployment_config, load_deployment_config_from};

use std::path::PathBuf;

/// 環境変数で `.env` のパスを直接指定する場合のキー
pub const ENV_PATH_VAR: &str = "VMFLOW_ENV_PATH";

/// vmflow のグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("vmflow");
    Ok(config_dir)
}

/// `.env` ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 VMFLOW_ENV_PATH (直接パス指定)
/// 2. カレントディレクトリ: .env
/// 3. ./.vmflow/.env
/// 4. ~/.config/vmflow/.env (グローバル設定)
pub fn find_env_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(env_path) = std::env::var(ENV_PATH_VAR) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリ
    let path = current_dir.join(".env");
    if path.is_file() {
        return Ok(path);
    }

    // 3. ./.vmflow/ ディレクトリ
    let path = current_dir.join(".vmflow").join(".env");
    if path.is_file() {
        return Ok(path);
    }

    // 4. グローバル設定
    if let Ok(config_dir) = get_config_dir() {
        let global = config_dir.join(".env");
        if global.is_file() {
            return Ok(global);
        }
    }

    Err(ConfigError::EnvFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("vmflow"));
    }

    #[test]
    #[serial]
    fn test_find_env_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join(".env"), "ESXI_HOST=h\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(ENV_PATH_VAR, find_env_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".env"));
    }

    #[test]
    #[serial]
    fn test_find_env_file_in_vmflow_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let dot_dir = temp_dir.path().join(".vmflow");
        fs::create_dir(&dot_dir).unwrap();
        fs::write(dot_dir.join(".env"), "ESXI_HOST=h\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(ENV_PATH_VAR, find_env_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".vmflow/.env"));
    }

    #[test]
    #[serial]
    fn test_find_env_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("lab.env");
        fs::write(&custom, "ESXI_HOST=h\n").unwrap();

        let result = temp_env::with_var(ENV_PATH_VAR, Some(custom.as_os_str()), find_env_file);
        assert_eq!(result.unwrap(), custom);
    }

    #[test]
    #[serial]
    fn test_process_env_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let env_path = temp_dir.path().join(".env");
        fs::write(
            &env_path,
            "ESXI_HOST=from-file\nESXI_PASSWORD=pw\nVM_CPU=2\nVMFLOW_TOOLS_DIR=/tmp/vmflow\n",
        )
        .unwrap();

        let config = temp_env::with_vars(
            [
                ("ESXI_HOST", Some("from-env")),
                ("VM_CPU", None),
                ("ESXI_PASSWORD", None),
            ],
            || load_deployment_config_from(&env_path),
        )
        .unwrap();

        assert_eq!(config.endpoint.host, "from-env");
        assert_eq!(config.endpoint.password, "pw");
        assert_eq!(config.sizing.cpus, 2);
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = load_deployment_config_from(std::path::Path::new("/nonexistent/vmflow.env"));
        assert!(matches!(result, Err(ConfigError::EnvFileNotFound)));
    }
}
