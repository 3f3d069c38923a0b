//! 破壊的操作の確認
//!
//! 削除には [`DestroyAuthorization`] が必要で、これは [`ConfirmationGate`]
//! からしか得られません。問い合わせ方法は [`Prompt`] として外から渡します。

use std::io;
use tracing::info;

/// 操作者への問い合わせ
pub trait Prompt: Send + Sync {
    /// 質問を表示して1行の回答を返す
    fn ask(&self, question: &str) -> io::Result<String>;
}

/// 削除の許可
///
/// フィールドは非公開で、ゲート以外では生成できません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyAuthorization {
    vms: Vec<String>,
}

impl DestroyAuthorization {
    /// 削除が許可されたVM
    pub fn vms(&self) -> &[String] {
        &self.vms
    }

    pub fn covers(&self, vm: &str) -> bool {
        self.vms.iter().any(|v| v == vm)
    }
}

/// 確認結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted(DestroyAuthorization),
    /// 操作者が取り消した
    Denied,
}

impl Authorization {
    pub fn granted(self) -> Option<DestroyAuthorization> {
        match self {
            Authorization::Granted(auth) => Some(auth),
            Authorization::Denied => None,
        }
    }
}

/// 全VM削除時に入力させる文字列
pub const DESTROY_ALL_PHRASE: &str = "DESTROY ALL VMs";

/// 確認ゲート
pub struct ConfirmationGate<'a> {
    prompt: &'a dyn Prompt,
}

impl<'a> ConfirmationGate<'a> {
    pub fn new(prompt: &'a dyn Prompt) -> Self {
        Self { prompt }
    }

    /// 単一VM: `DELETE <name>` の入力を求める
    pub fn confirm_single(&self, vm: &str) -> io::Result<Authorization> {
        let expected = format!("DELETE {vm}");
        let answer = self
            .prompt
            .ask(&format!("Type '{expected}' to confirm: "))?;

        if answer.trim() == expected {
            Ok(grant(vec![vm.to_string()]))
        } else {
            info!(vm, "Destroy cancelled");
            Ok(Authorization::Denied)
        }
    }

    /// 複数VM: `yes` の入力を求める
    pub fn confirm_bulk(&self, vms: &[String]) -> io::Result<Authorization> {
        if vms.is_empty() {
            return Ok(Authorization::Denied);
        }

        let answer = self
            .prompt
            .ask(&format!("Destroy all {} VMs? (yes/no): ", vms.len()))?;

        if answer.trim().eq_ignore_ascii_case("yes") {
            Ok(grant(vms.to_vec()))
        } else {
            info!(count = vms.len(), "Bulk destroy cancelled");
            Ok(Authorization::Denied)
        }
    }

    /// 全VM: `DESTROY ALL VMs` の入力の後、件数の確認を求める
    pub fn confirm_all(&self, vms: &[String]) -> io::Result<Authorization> {
        if vms.is_empty() {
            return Ok(Authorization::Denied);
        }

        let answer = self
            .prompt
            .ask(&format!("Type '{DESTROY_ALL_PHRASE}' to confirm: "))?;
        if answer.trim() != DESTROY_ALL_PHRASE {
            info!("Destroy all cancelled");
            return Ok(Authorization::Denied);
        }

        self.confirm_bulk(vms)
    }
}

fn grant(vms: Vec<String>) -> Authorization {
    Authorization::Granted(DestroyAuthorization { vms })
}
