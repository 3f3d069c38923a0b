//! .env ファイルの読み込み

use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// `.env` ファイルを読み込む
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    let vars = parse_env(&content);
    debug!(path = %path.display(), count = vars.len(), "Loaded env file");
    Ok(vars)
}

/// `KEY=VALUE` 形式の行を解釈する
///
/// 空行と `#` で始まる行は無視し、`=` を含まない行は読み飛ばします。
/// 値を囲む引用符（`"` または `'`）は取り除きます。
pub fn parse_env(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            debug!(line = index + 1, "Skipping env line without '='");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
