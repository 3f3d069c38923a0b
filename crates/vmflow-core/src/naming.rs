//! 命名規則
//!
//! VM名・ホスト名は `<prefix>-YYYYmmdd-HHMMSS` 形式です。

use chrono::{DateTime, Local};
use regex::Regex;

/// タイムスタンプ部分のフォーマット
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// ホスト名が `<prefix>-YYYYmmdd-HHMMSS` に一致するか
pub fn hostname_matches(prefix: &str, hostname: &str) -> bool {
    let pattern = format!(r"^{}-\d{{8}}-\d{{6}}$", regex::escape(prefix));
    Regex::new(&pattern)
        .map(|re| re.is_match(hostname.trim()))
        .unwrap_or(false)
}
