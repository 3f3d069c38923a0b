use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("cloud-init テンプレート展開エラー: {0}")]
    TemplateRender(String),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
