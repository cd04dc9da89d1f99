use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Converter configuration. A loaded file replaces it wholesale, so every
/// section and key must be present in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    pub parsing_rules: ParsingRules,
    pub output_settings: OutputSettings,
    pub validation: ValidationRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingRules {
    /// Date heading; capture group 1 is the section date.
    pub date_pattern: String,
    /// Entry boundary inside a date section.
    pub entry_pattern: String,
    pub header_name_extraction: bool,
    pub field_patterns: Vec<FieldPattern>,
    /// Tried in order against the first line of each entry.
    pub header_name_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPattern {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// File name template; `{timestamp}` expands to `YYYYMMDD_HHMMSS`.
    pub excel_filename: String,
    pub sheet_name: String,
    pub include_summary: bool,
    pub auto_resize_columns: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub required_fields: Vec<String>,
    pub amount_validation: bool,
    pub date_validation: bool,
}

fn field(name: &str, pattern: &str) -> FieldPattern {
    FieldPattern {
        name: name.to_string(),
        pattern: pattern.to_string(),
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            parsing_rules: ParsingRules {
                date_pattern: r"## (\d{4}-\d{2}-\d{2})".to_string(),
                entry_pattern: "### ".to_string(),
                header_name_extraction: true,
                field_patterns: vec![
                    field("姓名", r"姓名[：:]\s*([^；;]+)"),
                    field("交易笔数", r"交易笔数[：:]\s*([^；;]+)"),
                    field("交易金额", r"交易金额[：:]\s*([^；;]+)"),
                    field("交易日期", r"交易日期[：:]\s*([^；;]+)"),
                    field("交易时间", r"交易时间[：:]\s*([^；;]+)"),
                    field("交易流水号", r"交易流水号[/订单号/交易单号/流水号]*[：:]\s*([^；;]+)"),
                    field("支付方式", r"支付方式[：:]\s*([^；;]+)"),
                    field("商户", r"商户[：:]\s*([^；;]+)"),
                    field("备注", r"备注[：:]\s*([^；;]+)"),
                ],
                header_name_patterns: vec![
                    r"^客户姓名[：:]\s*(.+?)(?:\s|$)".to_string(),
                    r"^姓名[：:]\s*(.+?)(?:\s|$)".to_string(),
                    r"^(.+?)(?:\s|$)".to_string(),
                ],
            },
            output_settings: OutputSettings {
                excel_filename: "转换结果_{timestamp}.xlsx".to_string(),
                sheet_name: "交易记录".to_string(),
                include_summary: true,
                auto_resize_columns: true,
            },
            validation: ValidationRules {
                required_fields: vec!["姓名".to_string(), "交易金额".to_string()],
                amount_validation: true,
                date_validation: true,
            },
        }
    }
}

impl ConverterConfig {
    /// Replace the pattern of an existing field, or append a new field.
    pub fn set_field_pattern(&mut self, name: &str, pattern: &str) {
        let patterns = &mut self.parsing_rules.field_patterns;
        match patterns.iter_mut().find(|f| f.name == name) {
            Some(f) => f.pattern = pattern.to_string(),
            None => patterns.push(field(name, pattern)),
        }
    }

    pub fn output_file_name(&self, now: NaiveDateTime) -> String {
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        self.output_settings
            .excel_filename
            .replace("{timestamp}", &stamp)
    }
}

/// Load a configuration file. A missing file falls back to the defaults; a
/// present file must deserialize completely.
pub fn load_config(path: &Path) -> Result<ConverterConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(ConverterConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_config(config: &ConverterConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
