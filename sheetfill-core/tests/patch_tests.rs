mod common;

use common::{MockXlsx, part_names, raw_entries, read_part};
use sheetfill_core::{
    BatchJob, CellUpdate, Package, PatchError, SharedStringTable, TemplatePatcher, UpdateStatus,
    WorksheetTree, generate, generate_batch,
};

const SHEET1: &str = "xl/worksheets/sheet1.xml";
const SHEET2: &str = "xl/worksheets/sheet2.xml";
const SST: &str = "xl/sharedStrings.xml";

fn cell_of(bytes: &[u8], part: &str, coordinate: &str) -> sheetfill_core::CellView {
    let xml = read_part(bytes, part);
    let tree = WorksheetTree::parse(xml.as_bytes(), part).expect("worksheet parses");
    tree.cell(coordinate)
        .expect("valid coordinate")
        .unwrap_or_else(|| panic!("cell {} missing", coordinate))
}

fn strings_of(bytes: &[u8]) -> SharedStringTable {
    let xml = read_part(bytes, SST);
    SharedStringTable::parse(xml.as_bytes(), SST).expect("shared strings parse")
}

#[test]
fn test_new_row_without_shared_strings() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", r#"<row r="1"><c r="A1" t="str"><v>Header</v></c></row>"#)
        .build();

    let out = generate(
        &template,
        &[CellUpdate::new("B3", "Hello"), CellUpdate::new("C3", 42)],
        None,
    )?;

    let xml = read_part(&out, SHEET1);
    assert!(xml.contains(
        r#"<row r="3"><c r="B3" t="str"><v>Hello</v></c><c r="C3"><v>42</v></c></row>"#
    ));
    assert!(!part_names(&out).iter().any(|p| p == SST));
    Ok(())
}

#[test]
fn test_text_integer_float_round_trip() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#)
        .shared_strings(&["Label"])
        .build();

    let out = generate(
        &template,
        &[
            CellUpdate::new("B2", "MSN12345"),
            CellUpdate::new("C2", 1234567890123_i64),
            CellUpdate::new("D2", 3.25),
        ],
        Some("Sheet1"),
    )?;

    let text = cell_of(&out, SHEET1, "B2");
    assert_eq!(text.cell_type.as_deref(), Some("s"));
    let index: usize = text.value.unwrap().parse()?;
    assert_eq!(strings_of(&out).get(index), Some("MSN12345"));

    let int = cell_of(&out, SHEET1, "C2");
    assert_eq!(int.cell_type, None);
    assert_eq!(int.value.as_deref(), Some("1234567890123"));

    let float = cell_of(&out, SHEET1, "D2");
    assert_eq!(float.cell_type, None);
    assert_eq!(float.value.as_deref(), Some("3.25"));
    Ok(())
}

#[test]
fn test_shared_string_dedup_across_cells() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", "")
        .shared_strings(&["Existing"])
        .build();

    let out = generate(
        &template,
        &[CellUpdate::new("B2", "Dup"), CellUpdate::new("C2", "Dup")],
        None,
    )?;

    let b2 = cell_of(&out, SHEET1, "B2");
    let c2 = cell_of(&out, SHEET1, "C2");
    assert_eq!(b2.value, c2.value);
    assert_eq!(b2.value.as_deref(), Some("1"));

    let strings = strings_of(&out);
    assert_eq!(strings.len(), 2);
    let sst = read_part(&out, SST);
    assert!(sst.contains(r#"count="2" uniqueCount="2""#));
    Ok(())
}

#[test]
fn test_shared_strings_append_only() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet(
            "Sheet1",
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>"#,
        )
        .shared_strings(&["alpha", "beta"])
        .build();

    let out = generate(
        &template,
        &[
            CellUpdate::new("A2", "gamma"),
            CellUpdate::new("B2", "beta"),
            CellUpdate::new("C2", "delta"),
            CellUpdate::new("D2", "gamma"),
        ],
        None,
    )?;

    let strings = strings_of(&out);
    let all: Vec<_> = (0..strings.len()).filter_map(|i| strings.get(i)).collect();
    assert_eq!(all, vec!["alpha", "beta", "gamma", "delta"]);

    assert_eq!(cell_of(&out, SHEET1, "A1").value.as_deref(), Some("0"));
    assert_eq!(cell_of(&out, SHEET1, "B1").value.as_deref(), Some("1"));
    assert_eq!(cell_of(&out, SHEET1, "A2").value.as_deref(), Some("2"));
    assert_eq!(cell_of(&out, SHEET1, "B2").value.as_deref(), Some("1"));
    assert_eq!(cell_of(&out, SHEET1, "C2").value.as_deref(), Some("3"));
    assert_eq!(cell_of(&out, SHEET1, "D2").value.as_deref(), Some("2"));
    Ok(())
}

#[test]
fn test_untouched_parts_are_byte_identical() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", r#"<row r="1"><c r="A1" s="1" t="s"><v>0</v></c></row>"#)
        .sheet("Sheet2", r#"<row r="4"><c r="D4"><v>9</v></c></row>"#)
        .shared_strings(&["Label"])
        .build();

    let out = generate(&template, &[CellUpdate::new("B2", "fresh")], Some("Sheet2"))?;

    let before = raw_entries(&template);
    let after = raw_entries(&out);
    assert_eq!(part_names(&template), part_names(&out));
    for (name, data) in &before {
        if name == SHEET2 || name == SST {
            assert_ne!(after.get(name), Some(data), "{} should change", name);
        } else {
            assert_eq!(after.get(name), Some(data), "{} should be untouched", name);
        }
    }

    let original = Package::open(template.clone())?;
    let patched = Package::open(out)?;
    for (a, b) in original.parts().iter().zip(patched.parts()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.compression, b.compression, "compression of {}", a.name);
        assert_eq!(a.unix_mode, b.unix_mode, "mode of {}", a.name);
    }
    Ok(())
}

#[test]
fn test_shared_strings_untouched_without_new_text() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", "")
        .shared_strings(&["Known"])
        .build();

    let out = generate(
        &template,
        &[CellUpdate::new("A1", "Known"), CellUpdate::new("A2", 5)],
        None,
    )?;

    assert_eq!(raw_entries(&template).get(SST), raw_entries(&out).get(SST));
    assert_eq!(cell_of(&out, SHEET1, "A1").value.as_deref(), Some("0"));
    Ok(())
}

#[test]
fn test_formula_cells_are_left_alone() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet(
            "Sheet1",
            r#"<row r="1"><c r="A1"><v>2</v></c><c r="B1"><f>A1*2</f><v>4</v></c></row>"#,
        )
        .build();
    let patcher = TemplatePatcher::new(template)?;

    let outcome =
        patcher.generate_with_outcome(&[CellUpdate::new("B1", 100), CellUpdate::new("A1", 3)], None)?;
    assert_eq!(
        outcome.statuses,
        vec![
            ("B1".to_string(), UpdateStatus::SkippedFormula),
            ("A1".to_string(), UpdateStatus::Applied),
        ]
    );
    assert_eq!(outcome.skipped_formulas(), vec!["B1"]);

    let b1 = cell_of(&outcome.bytes, SHEET1, "B1");
    assert_eq!(b1.formula.as_deref(), Some("A1*2"));
    assert_eq!(b1.value.as_deref(), Some("4"));
    assert_eq!(cell_of(&outcome.bytes, SHEET1, "A1").value.as_deref(), Some("3"));
    Ok(())
}

#[test]
fn test_out_of_order_updates_keep_rows_and_cells_sorted() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", r#"<row r="1"><c r="A1"><v>1</v></c></row><row r="9"><c r="C9"><v>1</v></c></row>"#)
        .build();

    let out = generate(
        &template,
        &[
            CellUpdate::new("D5", "d"),
            CellUpdate::new("B5", "b"),
            CellUpdate::new("AA5", "aa"),
            CellUpdate::new("Z5", "z"),
            CellUpdate::new("B5", "b again"),
        ],
        None,
    )?;

    let xml = read_part(&out, SHEET1);
    let tree = WorksheetTree::parse(xml.as_bytes(), SHEET1)?;
    assert_eq!(tree.row_numbers(), vec![1, 5, 9]);

    let row5: Vec<String> = tree
        .cells()?
        .into_iter()
        .filter(|c| c.reference.row == 5)
        .map(|c| c.reference.to_string())
        .collect();
    assert_eq!(row5, vec!["B5", "D5", "Z5", "AA5"]);
    assert_eq!(xml.matches(r#"r="B5""#).count(), 1);
    assert_eq!(cell_of(&out, SHEET1, "B5").value.as_deref(), Some("b again"));
    Ok(())
}

#[test]
fn test_unknown_sheet() {
    let template = MockXlsx::new().sheet("Sheet1", "").build();
    let err = generate(&template, &[CellUpdate::new("A1", 1)], Some("DoesNotExist")).unwrap_err();
    assert!(matches!(&err, PatchError::SheetNotFound(name) if name == "DoesNotExist"));
    assert!(err.is_request_error());
}

#[test]
fn test_sheet_names_are_case_sensitive() {
    let template = MockXlsx::new().sheet("Sheet1", "").build();
    let err = generate(&template, &[CellUpdate::new("A1", 1)], Some("sheet1")).unwrap_err();
    assert!(matches!(err, PatchError::SheetNotFound(_)));
}

#[test]
fn test_invalid_coordinate() {
    let template = MockXlsx::new().sheet("Sheet1", "").build();
    let err = generate(&template, &[CellUpdate::new("3B", "x")], None).unwrap_err();
    assert!(matches!(&err, PatchError::CellReferenceInvalid(c) if c == "3B"));
    assert!(err.is_request_error());
}

#[test]
fn test_control_characters_are_rejected() {
    let inline = MockXlsx::new().sheet("Sheet1", "").build();
    let err = generate(&inline, &[CellUpdate::new("A1", "a\u{1}b\u{b}c")], None).unwrap_err();
    assert!(matches!(&err, PatchError::InvalidValue(c) if c == "A1"));
    assert!(err.is_request_error());

    let shared = MockXlsx::new()
        .sheet("Sheet1", "")
        .shared_strings(&["Label"])
        .build();
    let err = generate(&shared, &[CellUpdate::new("B2", "form\u{c}feed")], None).unwrap_err();
    assert!(matches!(err, PatchError::InvalidValue(c) if c == "B2"));
}

#[test]
fn test_carriage_returns_round_trip() -> anyhow::Result<()> {
    let text = "line1\r\nline2";

    let inline = MockXlsx::new().sheet("Sheet1", "").build();
    let out = generate(&inline, &[CellUpdate::new("A1", text)], None)?;
    assert!(read_part(&out, SHEET1).contains("<v>line1&#13;\nline2</v>"));
    assert_eq!(cell_of(&out, SHEET1, "A1").value.as_deref(), Some(text));

    let shared = MockXlsx::new()
        .sheet("Sheet1", "")
        .shared_strings(&["Label"])
        .build();
    let out = generate(&shared, &[CellUpdate::new("A1", text)], None)?;
    assert!(read_part(&out, SST).contains("line1&#13;\nline2"));
    assert_eq!(strings_of(&out).get(1), Some(text));
    Ok(())
}

#[test]
fn test_empty_updates_and_bad_packages() {
    let template = MockXlsx::new().sheet("Sheet1", "").build();
    assert!(matches!(generate(&template, &[], None), Err(PatchError::NoUpdates)));

    let err = generate(b"PK not really", &[CellUpdate::new("A1", 1)], None).unwrap_err();
    assert!(matches!(err, PatchError::NotAZipPackage(_)));
    assert!(!err.is_request_error());
}

#[test]
fn test_missing_sheet_data_is_malformed() {
    let template = MockXlsx::new()
        .raw_sheet(
            "Sheet1",
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"/>"#,
        )
        .build();
    let err = generate(&template, &[CellUpdate::new("A1", 1)], None).unwrap_err();
    assert!(matches!(err, PatchError::MalformedWorksheet(path, _) if path == SHEET1));
}

#[test]
fn test_second_sheet_by_name_and_default_first() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("First", "")
        .sheet("Second", "")
        .build();

    let out = generate(&template, &[CellUpdate::new("A1", "two")], Some("Second"))?;
    assert!(read_part(&out, SHEET2).contains("<v>two</v>"));
    assert!(!read_part(&out, SHEET1).contains("<v>two</v>"));

    let out = generate(&template, &[CellUpdate::new("A1", "one")], None)?;
    assert!(read_part(&out, SHEET1).contains("<v>one</v>"));
    Ok(())
}

#[test]
fn test_workbook_without_root_relationships() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", "")
        .without_root_rels()
        .build();
    let out = generate(&template, &[CellUpdate::new("A1", 1)], None)?;
    assert!(read_part(&out, SHEET1).contains("<v>1</v>"));
    Ok(())
}

#[test]
fn test_batch_keeps_order_and_isolates_failures() -> anyhow::Result<()> {
    let template = MockXlsx::new()
        .sheet("Sheet1", "")
        .shared_strings(&[])
        .build();

    let jobs: Vec<BatchJob> = (0..8)
        .map(|i| BatchJob {
            sheet_name: None,
            updates: vec![CellUpdate::new("A1", format!("doc {}", i))],
        })
        .chain(std::iter::once(BatchJob {
            sheet_name: Some("Missing".to_string()),
            updates: vec![CellUpdate::new("A1", 1)],
        }))
        .collect();

    let results = generate_batch(&template, &jobs)?;
    assert_eq!(results.len(), 9);
    for (i, result) in results.iter().take(8).enumerate() {
        let bytes = result.as_ref().expect("job succeeds");
        assert_eq!(strings_of(bytes).get(0), Some(format!("doc {}", i).as_str()));
    }
    assert!(matches!(results[8], Err(PatchError::SheetNotFound(_))));
    Ok(())
}

#[test]
fn test_patcher_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("Template.xlsx");
    MockXlsx::new()
        .sheet("Maintenance Template", "")
        .write_to(&input_path)?;

    let patcher = TemplatePatcher::from_file(&input_path)?;
    let out = patcher.generate(&[CellUpdate::new("C6", "MSN-42")], Some("Maintenance Template"))?;

    let output_path = dir.path().join("out.xlsx");
    std::fs::write(&output_path, &out)?;
    let bytes = std::fs::read(&output_path)?;
    assert_eq!(cell_of(&bytes, SHEET1, "C6").value.as_deref(), Some("MSN-42"));
    Ok(())
}
