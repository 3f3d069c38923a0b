//! 設定時の検証

use super::{EXPECTED_COMPONENTS, ValidationReport};
use serde_yaml::Value;

/// 非推奨の datasource 指定
const DATASOURCE_DIRECTIVE: &str = "datasource_list";

/// 推奨セクション
const RECOMMENDED_SECTIONS: &[&str] = &["users", "hostname", "packages", "runcmd"];

/// テンプレートと生成済み user-data をまとめて検証する
pub fn validate_config(template: &str, user_data: &str) -> ValidationReport {
    let mut report = ValidationReport::new();
    check_template_source(template, &mut report);
    check_document(user_data, &mut report);
    report
}

/// 生成済み user-data のみを検証する
pub fn validate_document(user_data: &str) -> ValidationReport {
    let mut report = ValidationReport::new();
    check_document(user_data, &mut report);
    report
}

/// テンプレートソースの検証
pub fn check_template_source(template: &str, report: &mut ValidationReport) {
    if template
        .lines()
        .any(|line| line.trim_start().starts_with(DATASOURCE_DIRECTIVE))
    {
        report.add_error(
            "Found 'datasource_list' in user-data template; it belongs in system config only",
        );
    }

    if !template.trim_start().starts_with("#cloud-config") {
        report.add_warning("Cloud-config header not found in template");
    }

    for (open, close) in [("{{", "}}"), ("{%", "%}")] {
        let opened = template.matches(open).count();
        let closed = template.matches(close).count();
        if opened != closed {
            report.add_warning(format!(
                "Unbalanced template delimiters: {opened} '{open}' vs {closed} '{close}'"
            ));
        }
    }

    if report.errors.is_empty() {
        report.add_info("Template source check passed");
    }
}

/// 生成済み user-data の検証
pub fn check_document(user_data: &str, report: &mut ValidationReport) {
    let document: Value = match serde_yaml::from_str(user_data) {
        Ok(value) => value,
        Err(e) => {
            report.add_error(format!("Generated user-data has invalid YAML syntax: {e}"));
            return;
        }
    };

    let Some(mapping) = document.as_mapping() else {
        report.add_error("Generated user-data is not a YAML mapping");
        return;
    };
    report.add_info("Generated user-data has valid YAML syntax");

    if mapping.contains_key(DATASOURCE_DIRECTIVE) {
        report.add_error("Generated user-data contains 'datasource_list'");
    }

    for section in RECOMMENDED_SECTIONS {
        if !mapping.contains_key(*section) {
            report.add_warning(format!("Missing recommended section: {section}"));
        }
    }

    if let Some(runcmd) = mapping.get("runcmd") {
        let commands = flatten(runcmd).to_ascii_lowercase();
        for component in EXPECTED_COMPONENTS {
            if !component
                .install_markers
                .iter()
                .any(|marker| commands.contains(marker))
            {
                report.add_warning(format!(
                    "No {} installation commands found in runcmd",
                    component.name
                ));
            }
        }
    }
}

// runcmd の要素は文字列またはリスト
fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Sequence(items) => items.iter().map(flatten).collect::<Vec<_>>().join("\n"),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}
