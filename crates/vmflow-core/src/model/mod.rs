//! モデル定義
//!
//! デプロイ1回分の設定と、デプロイ中に生成されるVM識別子を定義します。

mod config;
mod identity;

// Re-exports
pub use config::*;
pub use identity::*;
