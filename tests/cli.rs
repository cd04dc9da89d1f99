use std::path::Path;

use assert_cmd::Command;
use calamine::{open_workbook_auto, Data, Reader};
use predicates::prelude::*;
use rust_xlsxwriter::Workbook;

fn ledgerkit() -> Command {
    Command::cargo_bin("ledgerkit").unwrap()
}

/// Order register: title row, header row, then (created, customer id) rows.
fn write_register(path: &Path, orders: &[(&str, u32)]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1").unwrap();
    sheet.write_string(0, 0, "订单登记").unwrap();
    for col in 0..20u16 {
        sheet.write_string(1, col, format!("列{}", col + 1)).unwrap();
    }
    for (i, (created, id)) in orders.iter().enumerate() {
        let row = 2 + i as u32;
        sheet.write_string(row, 0, format!("A{row}")).unwrap();
        sheet.write_string(row, 2, *created).unwrap();
        sheet.write_number(row, 6, *id as f64).unwrap();
    }
    workbook.save(path).unwrap();
}

fn marks(path: &Path) -> Vec<String> {
    let mut wb = open_workbook_auto(path).unwrap();
    let range = wb.worksheet_range("Sheet1").unwrap();
    range
        .rows()
        .skip(2)
        .map(|r| match r.get(19) {
            Some(Data::String(s)) => s.clone(),
            _ => String::new(),
        })
        .collect()
}

#[test]
fn mark_labels_new_and_existing_customers() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("orders.xlsx");
    let output = dir.path().join("marked.xlsx");
    write_register(
        &input,
        &[
            ("2024-11-02 09:00:00", 101),
            ("2025-01-05 10:00:00", 101),
            ("2025-02-10 12:30:00", 202),
        ],
    );

    ledgerkit()
        .args(["mark", input.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"))
        .stdout(predicate::str::contains("新增"));

    assert_eq!(marks(&output), vec!["存量", "存量", "新增"]);
}

#[test]
fn mark_respects_cutoff_override() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("orders.xlsx");
    write_register(&input, &[("2024-11-02 09:00:00", 7), ("2024-12-01 09:00:00", 8)]);

    ledgerkit()
        .args(["mark", input.to_str().unwrap(), "--cutoff", "2024-11-15"])
        .assert()
        .success();

    assert_eq!(marks(&input), vec!["存量", "新增"]);
}

#[test]
fn mark_missing_sheet_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("orders.xlsx");
    write_register(&input, &[("2025-01-05 10:00:00", 1)]);

    ledgerkit()
        .args(["mark", input.to_str().unwrap(), "--sheet", "Orders"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Orders"));
}

#[test]
fn mark_refuses_legacy_workbook_formats() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("orders.xls");
    std::fs::write(&input, b"not touched").unwrap();

    ledgerkit()
        .args(["mark", input.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".xlsx"));

    assert_eq!(std::fs::read(&input).unwrap(), b"not touched");
}

#[test]
fn mark_without_workbook_in_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    ledgerkit()
        .current_dir(dir.path())
        .arg("mark")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn convert_headless_writes_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("log.md");
    std::fs::write(
        &input,
        "## 2025-03-01\n### 张三\n交易金额：1,200元；\n支付方式：微信；\n### 李四\n交易金额：80元；\n支付方式：现金；\n",
    )
    .unwrap();
    let output = dir.path().join("out.xlsx");

    ledgerkit()
        .args([
            "convert",
            input.to_str().unwrap(),
            "--no-gui",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 records"));

    let mut wb = open_workbook_auto(&output).unwrap();
    let names = wb.sheet_names();
    assert_eq!(names, vec!["交易记录", "按日期汇总", "按支付方式汇总", "按客户汇总"]);
}

#[test]
fn convert_without_records_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.md");
    std::fs::write(&input, "# nothing here\n").unwrap();

    ledgerkit()
        .args(["convert", input.to_str().unwrap(), "--no-gui", "--no-summary"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf").join("converter.json");

    ledgerkit()
        .args(["config", "init", path.to_str().unwrap()])
        .assert()
        .success();
    assert!(path.exists());

    ledgerkit()
        .args(["config", "show", "-c", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sheet_name\": \"交易记录\""));
}

#[test]
fn partial_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(&path, r#"{"output_settings": {"include_summary": false}}"#).unwrap();

    ledgerkit()
        .args(["config", "show", "-c", path.to_str().unwrap()])
        .assert()
        .code(1);
}
