//! vmflow のコアモデル
//!
//! デプロイ設定・VM識別子・命名規則・cloud-init ドキュメント生成を提供します。
//! ここにある型はすべて実行中に変更されない値として扱います。

pub mod cloudinit;
pub mod error;
pub mod model;
pub mod naming;

pub use cloudinit::{CloudInitDocument, USER_DATA_TEMPLATE};
pub use error::{CoreError, Result};
pub use model::*;
