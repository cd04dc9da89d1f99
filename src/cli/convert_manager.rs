use std::path::{Path, PathBuf};

use crossterm::event::KeyCode;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table, TableState},
    Frame,
};
use regex::Regex;
use tracing::info;

use crate::cli::convert::{convert, preview};
use crate::error::Result;
use crate::exporter::clean_amount;
use crate::models::{TransactionRecord, AMOUNT_FIELD, DATE_FIELD, NAME_FIELD, PAYMENT_FIELD};
use crate::parser::CompiledRules;
use crate::settings::{expand_home, load_config, save_config, ConverterConfig};
use crate::tui::{
    amount_span, run_view, wrap_text, View, ViewAction, ERROR_STYLE, FOCUS_STYLE, FOOTER_STYLE,
    HEADER_STYLE,
};

const FIELD_INPUT: usize = 0;
const FIELD_OUTPUT: usize = 1;
const FIELD_CONFIG: usize = 2;
const FIELD_CUSTOM: usize = 3;
const TOGGLE_SUMMARY: usize = 4;
const TOGGLE_RESIZE: usize = 5;
const TOGGLE_AMOUNT: usize = 6;
const FIELD_COUNT: usize = 7;

const PREVIEW_LIMIT: usize = 100;
const REMARK_WIDTH: usize = 24;
const REMARK_FIELD: &str = "备注";

enum Screen {
    Form,
    Preview { records: Vec<TransactionRecord>, total: usize },
    Result(ConvertResult),
}

struct ConvertResult {
    message: String,
    is_error: bool,
}

pub struct ConverterScreen {
    config: ConverterConfig,
    input: String,
    output_dir: String,
    config_path: String,
    custom: String,
    custom_fields: Vec<(String, String)>,
    include_summary: bool,
    auto_resize: bool,
    validate_amounts: bool,
    focused: usize,
    screen: Screen,
    log: Vec<String>,
    table_state: TableState,
}

impl ConverterScreen {
    pub fn new(
        config: ConverterConfig,
        input: Option<String>,
        output: Option<String>,
        config_path: Option<String>,
    ) -> Self {
        let output_dir = output.unwrap_or_else(|| {
            input
                .as_deref()
                .and_then(|i| Path::new(i).parent())
                .map(|p| p.to_string_lossy().to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| ".".to_string())
        });
        let mut screen = Self {
            include_summary: config.output_settings.include_summary,
            auto_resize: config.output_settings.auto_resize_columns,
            validate_amounts: config.validation.amount_validation,
            config,
            input: input.unwrap_or_default(),
            output_dir,
            config_path: config_path.unwrap_or_default(),
            custom: String::new(),
            custom_fields: Vec::new(),
            focused: FIELD_INPUT,
            screen: Screen::Form,
            log: Vec::new(),
            table_state: TableState::default(),
        };
        screen.push_log("Ready");
        screen
    }

    /// The loaded configuration with the toggles and custom fields applied.
    pub fn effective_config(&self) -> ConverterConfig {
        let mut cfg = self.config.clone();
        cfg.output_settings.include_summary = self.include_summary;
        cfg.output_settings.auto_resize_columns = self.auto_resize;
        cfg.validation.amount_validation = self.validate_amounts;
        for (name, pattern) in &self.custom_fields {
            cfg.set_field_pattern(name, pattern);
        }
        cfg
    }

    fn push_log(&mut self, msg: &str) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("[{stamp}] {msg}"));
    }

    fn sync_toggles(&mut self) {
        self.include_summary = self.config.output_settings.include_summary;
        self.auto_resize = self.config.output_settings.auto_resize_columns;
        self.validate_amounts = self.config.validation.amount_validation;
    }

    fn input_path(&self) -> Option<PathBuf> {
        let raw = self.input.trim();
        if raw.is_empty() {
            return None;
        }
        Some(expand_home(raw))
    }

    fn text_field(&mut self) -> Option<&mut String> {
        match self.focused {
            FIELD_INPUT => Some(&mut self.input),
            FIELD_OUTPUT => Some(&mut self.output_dir),
            FIELD_CONFIG => Some(&mut self.config_path),
            FIELD_CUSTOM => Some(&mut self.custom),
            _ => None,
        }
    }

    fn toggle(&mut self) {
        match self.focused {
            TOGGLE_SUMMARY => self.include_summary = !self.include_summary,
            TOGGLE_RESIZE => self.auto_resize = !self.auto_resize,
            TOGGLE_AMOUNT => self.validate_amounts = !self.validate_amounts,
            _ => {}
        }
    }

    fn add_custom_field(&mut self) {
        match parse_custom_field(&self.custom) {
            Ok((name, pattern)) => {
                self.push_log(&format!("Custom field {name} added"));
                match self.custom_fields.iter_mut().find(|(n, _)| *n == name) {
                    Some(existing) => existing.1 = pattern,
                    None => self.custom_fields.push((name, pattern)),
                }
                self.custom.clear();
            }
            Err(msg) => self.push_log(&msg),
        }
    }

    fn run_preview(&mut self) {
        let Some(input) = self.input_path() else {
            self.push_log("Input file is required");
            return;
        };
        let cfg = self.effective_config();
        if let Ok(rules) = CompiledRules::new(&cfg.parsing_rules) {
            let invalid = rules.invalid_fields();
            if !invalid.is_empty() {
                let msg = format!("Invalid field patterns ignored: {}", invalid.join(", "));
                self.push_log(&msg);
            }
        }
        match preview(&input, &cfg) {
            Ok(mut records) => {
                let total = records.len();
                records.truncate(PREVIEW_LIMIT);
                self.push_log(&format!("Preview: {total} records"));
                self.table_state = TableState::default();
                if !records.is_empty() {
                    self.table_state.select(Some(0));
                }
                self.screen = Screen::Preview { records, total };
            }
            Err(e) => self.push_log(&format!("Preview failed: {e}")),
        }
    }

    fn run_convert(&mut self) {
        let Some(input) = self.input_path() else {
            self.push_log("Input file is required");
            return;
        };
        if !input.exists() {
            self.push_log(&format!("File not found: {}", input.display()));
            return;
        }
        let cfg = self.effective_config();
        let dir = match self.output_dir.trim() {
            "" => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            d => expand_home(d),
        };
        let output = dir.join(cfg.output_file_name(chrono::Local::now().naive_local()));

        let result = match convert(&input, &output, &cfg) {
            Ok(report) => {
                info!(records = report.records, output = %report.output.display(), "converted");
                ConvertResult {
                    message: format!(
                        "{} records written\n{}",
                        report.records,
                        report.output.display()
                    ),
                    is_error: false,
                }
            }
            Err(e) => ConvertResult {
                message: format!("Conversion failed: {e}"),
                is_error: true,
            },
        };
        let summary = result.message.lines().next().unwrap_or_default().to_string();
        self.push_log(&summary);
        self.screen = Screen::Result(result);
    }

    fn save_current_config(&mut self) {
        let raw = self.config_path.trim();
        if raw.is_empty() {
            self.push_log("Config file path is required");
            return;
        }
        let path = expand_home(raw);
        match save_config(&self.effective_config(), &path) {
            Ok(()) => self.push_log(&format!("Saved config {}", path.display())),
            Err(e) => self.push_log(&format!("Save failed: {e}")),
        }
    }

    fn load_current_config(&mut self) {
        let raw = self.config_path.trim();
        if raw.is_empty() {
            self.push_log("Config file path is required");
            return;
        }
        let path = expand_home(raw);
        if !path.exists() {
            self.push_log(&format!("Config not found: {}", path.display()));
            return;
        }
        match load_config(&path) {
            Ok(cfg) => {
                self.config = cfg;
                self.custom_fields.clear();
                self.sync_toggles();
                self.push_log(&format!("Loaded config {}", path.display()));
            }
            Err(e) => self.push_log(&format!("Load failed: {e}")),
        }
    }

    fn handle_form_key(&mut self, code: KeyCode) -> ViewAction {
        match code {
            KeyCode::Esc => return ViewAction::Close,
            KeyCode::Tab | KeyCode::Down => self.focused = (self.focused + 1) % FIELD_COUNT,
            KeyCode::BackTab | KeyCode::Up => {
                self.focused = (self.focused + FIELD_COUNT - 1) % FIELD_COUNT
            }
            KeyCode::F(2) => self.run_preview(),
            KeyCode::F(3) => self.save_current_config(),
            KeyCode::F(4) => self.load_current_config(),
            KeyCode::Enter if self.focused == FIELD_CUSTOM => self.add_custom_field(),
            KeyCode::Enter => self.run_convert(),
            KeyCode::Delete if self.focused == FIELD_CUSTOM => {
                if let Some((name, _)) = self.custom_fields.pop() {
                    self.push_log(&format!("Custom field {name} removed"));
                }
            }
            KeyCode::Char(' ') if self.focused >= TOGGLE_SUMMARY => self.toggle(),
            KeyCode::Char(c) => {
                if let Some(field) = self.text_field() {
                    field.push(c);
                }
            }
            KeyCode::Backspace => {
                if let Some(field) = self.text_field() {
                    field.pop();
                }
            }
            _ => {}
        }
        ViewAction::Continue
    }

    fn handle_preview_key(&mut self, code: KeyCode, len: usize) {
        let selected = self.table_state.selected().unwrap_or(0);
        match code {
            KeyCode::Esc | KeyCode::Char('q') => self.screen = Screen::Form,
            KeyCode::Down | KeyCode::Char('j') if selected + 1 < len => {
                self.table_state.select(Some(selected + 1));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.table_state.select(Some(selected.saturating_sub(1)));
            }
            KeyCode::PageDown => {
                self.table_state
                    .select(Some((selected + 10).min(len.saturating_sub(1))));
            }
            KeyCode::PageUp => self.table_state.select(Some(selected.saturating_sub(10))),
            _ => {}
        }
    }

    fn draw_form(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect) {
        let [form_area, log_area] =
            Layout::vertical([Constraint::Length(15), Constraint::Fill(1)]).areas(content_area);

        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                " Convert a Transaction Log",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        let texts = [
            (FIELD_INPUT, "Input file     ", &self.input),
            (FIELD_OUTPUT, "Output folder  ", &self.output_dir),
            (FIELD_CONFIG, "Config file    ", &self.config_path),
            (FIELD_CUSTOM, "Custom field   ", &self.custom),
        ];
        for (idx, label, value) in texts {
            let is_focused = self.focused == idx;
            let label_style = if is_focused {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let cursor = if is_focused { "_" } else { "" };
            lines.push(Line::from(vec![
                Span::styled(format!("   {label}"), label_style),
                Span::styled(
                    format!("{value}{cursor}"),
                    if is_focused { FOCUS_STYLE } else { Style::default() },
                ),
            ]));
        }

        let custom = if self.custom_fields.is_empty() {
            "(none)".to_string()
        } else {
            self.custom_fields
                .iter()
                .map(|(n, _)| n.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(Line::from(Span::styled(
            format!("                  {custom}"),
            FOOTER_STYLE,
        )));
        lines.push(Line::from(""));

        let toggles = [
            (TOGGLE_SUMMARY, "Include summary sheets", self.include_summary),
            (TOGGLE_RESIZE, "Auto-resize columns", self.auto_resize),
            (TOGGLE_AMOUNT, "Validate amounts", self.validate_amounts),
        ];
        for (idx, label, on) in toggles {
            let mark = if on { "x" } else { " " };
            let style = if self.focused == idx {
                FOCUS_STYLE.add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            lines.push(Line::from(Span::styled(format!("   [{mark}] {label}"), style)));
        }

        frame.render_widget(Paragraph::new(lines), form_area);

        let visible = log_area.height.saturating_sub(1) as usize;
        let start = self.log.len().saturating_sub(visible);
        let mut log_lines = vec![Line::from(Span::styled(" Log", FOOTER_STYLE))];
        for entry in &self.log[start..] {
            let style = if entry.contains("failed") || entry.contains("not found") {
                ERROR_STYLE
            } else {
                Style::default()
            };
            log_lines.push(Line::from(Span::styled(format!("   {entry}"), style)));
        }
        frame.render_widget(Paragraph::new(log_lines), log_area);

        let hints = if self.focused == FIELD_CUSTOM {
            " name=regex  Enter=add  Del=remove last  Tab=next  Esc=quit"
        } else {
            " Tab/Up/Down=fields  Space=toggle  F2=preview  F3=save config  F4=load config  Enter=convert  Esc=quit"
        };
        frame.render_widget(Paragraph::new(hints).style(FOOTER_STYLE), hints_area);
    }

    fn draw_preview(&mut self, frame: &mut Frame, content_area: Rect, hints_area: Rect) {
        let Screen::Preview { records, total } = &self.screen else {
            return;
        };
        let [title_area, table_area] =
            Layout::vertical([Constraint::Length(2), Constraint::Fill(1)]).areas(content_area);

        frame.render_widget(
            Paragraph::new(format!(
                " Preview: showing {} of {} records",
                records.len(),
                total
            ))
            .style(Style::default().add_modifier(Modifier::BOLD)),
            title_area,
        );

        let rows: Vec<Row> = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let (remark, line_count) = wrap_text(record.value(REMARK_FIELD), REMARK_WIDTH);
                Row::new(vec![
                    Cell::from(format!("{}", i + 1)),
                    Cell::from(record.value(DATE_FIELD).to_string()),
                    Cell::from(record.value(NAME_FIELD).to_string()),
                    Cell::from(record.value(AMOUNT_FIELD).to_string()),
                    Cell::from(amount_span(clean_amount(record.value(AMOUNT_FIELD)), 12)),
                    Cell::from(record.value(PAYMENT_FIELD).to_string()),
                    Cell::from(remark),
                ])
                .height(line_count)
            })
            .collect();

        let widths = [
            Constraint::Length(4),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Fill(1),
        ];
        let header = ["#", "日期", "姓名", "交易金额", "金额", "支付方式", "备注"];
        let table = Table::new(rows, widths)
            .header(Row::new(header).style(HEADER_STYLE).bottom_margin(1))
            .column_spacing(1)
            .row_highlight_style(Style::default().bg(Color::DarkGray));

        frame.render_stateful_widget(table, table_area, &mut self.table_state);
        frame.render_widget(
            Paragraph::new(" Up/Down/PgUp/PgDn=scroll  Esc=back").style(FOOTER_STYLE),
            hints_area,
        );
    }

    fn draw_result(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect) {
        let Screen::Result(result) = &self.screen else {
            return;
        };
        let style = if result.is_error {
            ERROR_STYLE
        } else {
            Style::default().fg(Color::Green)
        };

        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                " Conversion Result",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];
        for line in result.message.lines() {
            lines.push(Line::from(Span::styled(format!("   {line}"), style)));
        }
        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(" Esc=back to form").style(FOOTER_STYLE),
            hints_area,
        );
    }
}

impl View for ConverterScreen {
    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();

        let [header_area, sep, content_area, hints_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(1),
        ])
        .areas(area);

        frame.render_widget(
            Paragraph::new(" ledgerkit \u{00b7} markdown converter").style(HEADER_STYLE),
            header_area,
        );
        let sep_line = "\u{2501}".repeat(area.width as usize);
        frame.render_widget(
            Paragraph::new(sep_line.as_str()).style(Style::default().fg(Color::DarkGray)),
            sep,
        );

        match self.screen {
            Screen::Form => self.draw_form(frame, content_area, hints_area),
            Screen::Preview { .. } => self.draw_preview(frame, content_area, hints_area),
            Screen::Result(_) => self.draw_result(frame, content_area, hints_area),
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> ViewAction {
        match &self.screen {
            Screen::Form => self.handle_form_key(code),
            Screen::Preview { records, .. } => {
                let len = records.len();
                self.handle_preview_key(code, len);
                ViewAction::Continue
            }
            Screen::Result(_) => {
                if matches!(code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                    self.screen = Screen::Form;
                }
                ViewAction::Continue
            }
        }
    }
}

/// Parse `name=regex`. The pattern must compile and the name must be non-empty.
pub fn parse_custom_field(raw: &str) -> std::result::Result<(String, String), String> {
    let Some((name, pattern)) = raw.split_once('=') else {
        return Err("Custom field must be name=regex".to_string());
    };
    let (name, pattern) = (name.trim(), pattern.trim());
    if name.is_empty() || pattern.is_empty() {
        return Err("Custom field must be name=regex".to_string());
    }
    Regex::new(pattern).map_err(|e| format!("Invalid pattern for {name}: {e}"))?;
    Ok((name.to_string(), pattern.to_string()))
}

pub fn run(
    config: ConverterConfig,
    input: Option<String>,
    output: Option<String>,
    config_path: Option<String>,
) -> Result<()> {
    let mut screen = ConverterScreen::new(config, input, output, config_path);
    run_view(&mut screen)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "## 2025-02-01\n### 张三\n交易金额：100.50元；\n支付方式：微信；\n备注：老客户；\n### 李四\n交易金额：20元；\n";

    fn screen_with_input(dir: &Path) -> ConverterScreen {
        let input = dir.join("log.md");
        std::fs::write(&input, LOG).unwrap();
        ConverterScreen::new(
            ConverterConfig::default(),
            Some(input.to_string_lossy().to_string()),
            None,
            Some(dir.join("cfg.json").to_string_lossy().to_string()),
        )
    }

    fn type_text(screen: &mut ConverterScreen, text: &str) {
        for c in text.chars() {
            screen.handle_key(KeyCode::Char(c));
        }
    }

    #[test]
    fn test_prefill_output_dir_from_input() {
        let screen = ConverterScreen::new(
            ConverterConfig::default(),
            Some("/data/logs/march.md".into()),
            None,
            None,
        );
        assert_eq!(screen.output_dir, "/data/logs");
        let bare = ConverterScreen::new(ConverterConfig::default(), Some("march.md".into()), None, None);
        assert_eq!(bare.output_dir, ".");
    }

    #[test]
    fn test_parse_custom_field() {
        assert_eq!(
            parse_custom_field(" 订单号 = 订单号[：:]\\s*(\\d+) ").unwrap(),
            ("订单号".to_string(), "订单号[：:]\\s*(\\d+)".to_string())
        );
        assert!(parse_custom_field("no separator").is_err());
        assert!(parse_custom_field("=abc").is_err());
        assert!(parse_custom_field("x=(").unwrap_err().contains("Invalid pattern"));
    }

    #[test]
    fn test_effective_config_applies_toggles_and_custom_fields() {
        let mut screen = ConverterScreen::new(ConverterConfig::default(), None, None, None);
        screen.focused = TOGGLE_SUMMARY;
        screen.handle_key(KeyCode::Char(' '));
        screen.focused = TOGGLE_AMOUNT;
        screen.handle_key(KeyCode::Char(' '));
        screen.focused = FIELD_CUSTOM;
        type_text(&mut screen, "备注=备注[：:]\\s*(.+)");
        screen.handle_key(KeyCode::Enter);
        type_text(&mut screen, "渠道=渠道[：:]\\s*(\\S+)");
        screen.handle_key(KeyCode::Enter);

        let cfg = screen.effective_config();
        assert!(!cfg.output_settings.include_summary);
        assert!(cfg.output_settings.auto_resize_columns);
        assert!(!cfg.validation.amount_validation);
        let patterns = &cfg.parsing_rules.field_patterns;
        let remark = patterns.iter().find(|f| f.name == "备注").unwrap();
        assert_eq!(remark.pattern, "备注[：:]\\s*(.+)");
        assert_eq!(patterns.last().unwrap().name, "渠道");
        assert_eq!(patterns.len(), ConverterConfig::default().parsing_rules.field_patterns.len() + 1);
        // the base configuration is untouched
        assert!(screen.config.output_settings.include_summary);

        screen.handle_key(KeyCode::Delete);
        assert_eq!(screen.custom_fields.len(), 1);
    }

    #[test]
    fn test_space_types_in_text_fields() {
        let mut screen = ConverterScreen::new(ConverterConfig::default(), None, None, None);
        type_text(&mut screen, "my log.md");
        assert_eq!(screen.input, "my log.md");
        screen.handle_key(KeyCode::Backspace);
        assert_eq!(screen.input, "my log.m");
        assert!(screen.include_summary);
    }

    #[test]
    fn test_preview_lists_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut screen = screen_with_input(dir.path());
        screen.handle_key(KeyCode::F(2));
        match &screen.screen {
            Screen::Preview { records, total } => {
                assert_eq!(*total, 2);
                assert_eq!(records[0].value("姓名"), "张三");
            }
            _ => panic!("expected preview"),
        }
        screen.handle_key(KeyCode::Down);
        assert_eq!(screen.table_state.selected(), Some(1));
        screen.handle_key(KeyCode::Down);
        assert_eq!(screen.table_state.selected(), Some(1));
        screen.handle_key(KeyCode::Esc);
        assert!(matches!(screen.screen, Screen::Form));
    }

    #[test]
    fn test_convert_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut screen = screen_with_input(dir.path());
        screen.handle_key(KeyCode::Enter);
        match &screen.screen {
            Screen::Result(result) => {
                assert!(!result.is_error, "{}", result.message);
                assert!(result.message.starts_with("2 records"));
            }
            _ => panic!("expected result"),
        }
        let written: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "xlsx"))
            .collect();
        assert_eq!(written.len(), 1);
        assert!(screen.log.last().unwrap().contains("2 records written"));
    }

    #[test]
    fn test_convert_without_input_logs_error() {
        let mut screen = ConverterScreen::new(ConverterConfig::default(), None, None, None);
        screen.handle_key(KeyCode::Enter);
        assert!(matches!(screen.screen, Screen::Form));
        assert!(screen.log.last().unwrap().ends_with("Input file is required"));
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut screen = screen_with_input(dir.path());
        screen.focused = TOGGLE_RESIZE;
        screen.handle_key(KeyCode::Char(' '));
        screen.handle_key(KeyCode::F(3));
        let saved = load_config(&dir.path().join("cfg.json")).unwrap();
        assert!(!saved.output_settings.auto_resize_columns);

        let mut fresh = screen_with_input(dir.path());
        assert!(fresh.auto_resize);
        fresh.handle_key(KeyCode::F(4));
        assert!(!fresh.auto_resize);
        assert!(fresh.log.last().unwrap().contains("Loaded config"));
    }

    #[test]
    fn test_log_lines_are_timestamped() {
        let screen = ConverterScreen::new(ConverterConfig::default(), None, None, None);
        let first = &screen.log[0];
        assert!(first.starts_with('['));
        assert_eq!(&first[9..], "] Ready");
    }
}
