use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("ホームディレクトリが見つかりません")]
    HomeDirNotFound,

    #[error(
        ".env ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: .env\n\
        - ./.vmflow/.env\n\
        - ~/.config/vmflow/.env\n\
        または VMFLOW_ENV_PATH 環境変数で直接指定できます"
    )]
    EnvFileNotFound,

    #[error("{key} が設定されていません (.env または環境変数で指定してください)")]
    MissingKey { key: String },

    #[error("{key} の値が数値ではありません: {value}")]
    InvalidNumber { key: String, value: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
