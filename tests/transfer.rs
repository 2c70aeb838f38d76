use std::fs;
use std::path::{Path, PathBuf};

use calamine::{DataType, Reader, Xlsx, open_workbook};
use catalog_append::{
    ColumnShape, ShapeConfig, SkipReason, ToolError, TransferEvent, TransferRequest, transfer,
};
use rust_xlsxwriter::{Format, Formula, Workbook, Worksheet};
use tempfile::{TempDir, tempdir};

#[derive(Clone, Copy)]
enum V<'a> {
    S(&'a str),
    N(f64),
    Link(&'a str, &'a str),
    Blank,
}

use V::{Blank, Link, N, S};

fn write_row(worksheet: &mut Worksheet, row: u32, values: &[V<'_>]) {
    for (col, value) in values.iter().enumerate() {
        let col = col as u16;
        match *value {
            S(text) => {
                worksheet.write_string(row, col, text).expect("string written");
            }
            N(number) => {
                worksheet.write_number(row, col, number).expect("number written");
            }
            Link(url, text) => {
                worksheet
                    .write_url_with_text(row, col, url, text)
                    .expect("hyperlink written");
            }
            Blank => {}
        }
    }
}

fn source_header() -> Vec<V<'static>> {
    vec![
        Blank,
        Blank,
        S("Family"),
        S("Part No"),
        S("Short Description"),
        Blank,
        Blank,
        S("PVPR (no IVA)"),
    ]
}

fn write_source(path: &Path, sheets: &[(&str, Vec<Vec<V<'_>>>)]) {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet named");
        write_row(worksheet, 0, &source_header());
        for (idx, row) in rows.iter().enumerate() {
            write_row(worksheet, idx as u32 + 1, row);
        }
    }
    workbook.save(path).expect("source saved");
}

fn destination_header() -> Vec<V<'static>> {
    vec![
        S("Id"),
        S("Brand"),
        S("Part Number"),
        S("Manufacturer Code"),
        S("Description"),
        S("Stock"),
        S("Notes"),
        S("Price"),
        S("Category"),
        S("Link"),
    ]
}

fn write_destination(path: &Path, keys: &[&str]) {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Catalog").expect("sheet named");
    write_row(worksheet, 0, &destination_header());
    for (idx, key) in keys.iter().enumerate() {
        write_row(
            worksheet,
            idx as u32 + 1,
            &[Blank, Blank, S(*key), S(*key), S("existing")],
        );
    }
    workbook.save(path).expect("destination saved");
}

fn cdeh(
    prefix: &'static str,
    key: V<'static>,
    description: &'static str,
    extra: V<'static>,
) -> Vec<V<'static>> {
    vec![Blank, Blank, S(prefix), key, S(description), Blank, Blank, extra]
}

struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    destination: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempdir().expect("temporary directory");
    let source = dir.path().join("source.xlsx");
    let destination = dir.path().join("destination.xlsx");
    Fixture {
        _dir: dir,
        source,
        destination,
    }
}

fn run(
    fixture: &Fixture,
    sheets: &[&str],
    config: &ShapeConfig,
) -> catalog_append::Result<catalog_append::TransferResult> {
    let sheets: Vec<String> = sheets.iter().map(|s| s.to_string()).collect();
    transfer(&TransferRequest {
        source: &fixture.source,
        destination: &fixture.destination,
        sheets: &sheets,
        config,
    })
}

fn read_range(path: &Path, sheet: &str) -> calamine::Range<DataType> {
    let mut workbook: Xlsx<_> = open_workbook(path).expect("workbook opened");
    workbook
        .worksheet_range(sheet)
        .expect("sheet present")
        .expect("sheet read")
}

/// Text of a cell by 1-based row and zero-based column.
fn text(range: &calamine::Range<DataType>, row: u32, col: u32) -> String {
    range
        .get_value((row - 1, col))
        .map(|value| value.to_string())
        .unwrap_or_default()
}

const C: u32 = 2;
const D: u32 = 3;
const E: u32 = 4;
const H: u32 = 7;
const J: u32 = 9;

#[test]
fn appends_new_key_and_skips_existing_one() {
    let fx = fixture();
    write_destination(&fx.destination, &["A1"]);
    write_source(
        &fx.source,
        &[(
            "PriceList",
            vec![
                cdeh("Fam", S("A1"), "Short Desc", N(12.5)),
                cdeh(
                    "Fam",
                    Link("https://example.com/parts/B2", "B2"),
                    "Short Desc",
                    N(12.5),
                ),
            ],
        )],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");

    assert_eq!((result.copied, result.duplicates, result.invalid), (1, 1, 0));
    let range = read_range(&fx.destination, "Catalog");
    assert_eq!(text(&range, 2, C), "A1");
    assert_eq!(text(&range, 2, E), "existing");
    assert_eq!(text(&range, 3, C), "B2");
    assert_eq!(text(&range, 3, D), "B2");
    assert_eq!(text(&range, 3, E), "Fam - Short Desc");
    assert_eq!(range.get_value((2, H)), Some(&DataType::Float(12.5)));
    assert_eq!(text(&range, 3, J), "https://example.com/parts/B2");
    assert_eq!(text(&range, 1, C), "Part Number");
}

#[test]
fn header_rows_and_blank_cells_are_invalid() {
    let fx = fixture();
    write_destination(&fx.destination, &[]);
    write_source(
        &fx.source,
        &[(
            "PriceList",
            vec![
                cdeh("Family", S("Part No"), "Short Description", S("PVPR (no IVA)")),
                cdeh("Fam", S("K1"), "Desc", Blank),
                cdeh("Fam", S("K2"), "Desc", N(5.0)),
            ],
        )],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");

    assert_eq!((result.copied, result.duplicates, result.invalid), (1, 0, 2));
    let range = read_range(&fx.destination, "Catalog");
    assert_eq!(text(&range, 2, C), "K2");
    assert_eq!(text(&range, 2, J), "");
}

#[test]
fn cefh_uses_column_e_as_key() {
    let fx = fixture();
    write_destination(&fx.destination, &["EXISTING"]);
    write_source(
        &fx.source,
        &[(
            "Options",
            vec![
                vec![
                    Blank,
                    Blank,
                    S("Opt"),
                    Link("https://example.com/d", "D-VALUE"),
                    S("E-KEY"),
                    S("Option Desc"),
                    Blank,
                    N(9.0),
                ],
                vec![
                    Blank,
                    Blank,
                    S("Opt"),
                    S("D-VALUE"),
                    S("EXISTING"),
                    S("Option Desc"),
                    Blank,
                    N(9.0),
                ],
            ],
        )],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cefh, ["Options"]);

    let result = run(&fx, &["Options"], &config).expect("transfer succeeded");

    assert_eq!((result.copied, result.duplicates), (1, 1));
    let range = read_range(&fx.destination, "Catalog");
    assert_eq!(text(&range, 3, C), "E-KEY");
    assert_eq!(text(&range, 3, D), "E-KEY");
    assert_eq!(text(&range, 3, E), "Opt - Option Desc");
    assert_eq!(text(&range, 3, J), "");
}

#[test]
fn cder_reads_seventeenth_column_and_skips_narrow_sheets() {
    let fx = fixture();
    write_destination(&fx.destination, &[]);
    let mut wide = vec![Blank, Blank, S("Store"), S("W1"), S("Wide Desc")];
    wide.resize(16, Blank);
    wide.push(N(42.0));
    assert_eq!(wide.len(), 17);
    write_source(
        &fx.source,
        &[
            ("Narrow", vec![cdeh("Store", S("N1"), "Narrow Desc", N(1.0))]),
            ("Wide", vec![wide]),
        ],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cder, ["Narrow", "Wide"]);

    let result = run(&fx, &["Narrow", "Wide"], &config).expect("transfer succeeded");

    assert_eq!(result.copied, 1);
    assert_eq!(result.insufficient, 1);
    assert_eq!(result.invalid, 1);
    let range = read_range(&fx.destination, "Catalog");
    assert_eq!(text(&range, 2, C), "W1");
    assert_eq!(range.get_value((1, H)), Some(&DataType::Float(42.0)));
}

#[test]
fn unlisted_sheets_are_ignored_when_another_is_eligible() {
    let fx = fixture();
    write_destination(&fx.destination, &[]);
    write_source(
        &fx.source,
        &[
            ("Notes", vec![cdeh("Fam", S("X1"), "Desc", N(1.0))]),
            ("PriceList", vec![cdeh("Fam", S("P1"), "Desc", N(1.0))]),
        ],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["Notes", "PriceList"], &config).expect("transfer succeeded");

    assert_eq!(result.copied, 1);
    assert!(result.events.contains(&TransferEvent::SheetIgnored {
        sheet: "Notes".into()
    }));
    assert!(result.events.iter().any(|event| matches!(
        event,
        TransferEvent::Inserted { key, destination_row: 2, .. } if key == "P1"
    )));
}

#[test]
fn duplicate_events_carry_the_key() {
    let fx = fixture();
    write_destination(&fx.destination, &["A1"]);
    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("A1"), "Desc", N(1.0))])],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");

    assert!(result.events.contains(&TransferEvent::Skipped {
        sheet: "PriceList".into(),
        shape: ColumnShape::Cdeh,
        source_row: 2,
        reason: SkipReason::DuplicateKey,
        key: Some("A1".into()),
    }));
}

#[test]
fn no_eligible_sheets_fails_before_writing() {
    let fx = fixture();
    write_destination(&fx.destination, &["A1"]);
    write_source(
        &fx.source,
        &[("Notes", vec![cdeh("Fam", S("X1"), "Desc", N(1.0))])],
    );
    let before = fs::read(&fx.destination).expect("destination read");
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let error = run(&fx, &["Notes"], &config).unwrap_err();

    assert!(matches!(error, ToolError::NoEligibleSheets { .. }));
    assert_eq!(fs::read(&fx.destination).expect("destination read"), before);
}

#[test]
fn empty_selection_is_rejected() {
    let fx = fixture();
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);
    let error = run(&fx, &[], &config).unwrap_err();
    assert!(matches!(error, ToolError::EmptySelection));
}

#[test]
fn unreadable_destination_is_reported() {
    let fx = fixture();
    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("A1"), "Desc", N(1.0))])],
    );
    fs::write(&fx.destination, b"not a workbook").expect("garbage written");
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let error = run(&fx, &["PriceList"], &config).unwrap_err();

    assert!(matches!(error, ToolError::DestinationUnreadable { .. }));
    assert_eq!(
        fs::read(&fx.destination).expect("destination read"),
        b"not a workbook"
    );
}

#[test]
fn unreadable_source_is_reported() {
    let fx = fixture();
    write_destination(&fx.destination, &[]);
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let error = run(&fx, &["PriceList"], &config).unwrap_err();

    assert!(matches!(error, ToolError::UnreadableWorkbook { .. }));
}

#[test]
fn missing_source_sheet_is_reported_before_writing() {
    let fx = fixture();
    write_destination(&fx.destination, &[]);
    write_source(
        &fx.source,
        &[("Other", vec![cdeh("Fam", S("A1"), "Desc", N(1.0))])],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let error = run(&fx, &["PriceList"], &config).unwrap_err();

    assert!(matches!(error, ToolError::MissingSheet(name) if name == "PriceList"));
}

#[test]
fn nothing_to_copy_leaves_destination_byte_identical() {
    let fx = fixture();
    write_destination(&fx.destination, &["A1"]);
    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("A1"), "Desc", N(1.0))])],
    );
    let before = fs::read(&fx.destination).expect("destination read");
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");

    assert_eq!(result.copied, 0);
    assert_eq!(fs::read(&fx.destination).expect("destination read"), before);
}

#[test]
fn other_sheets_and_formulas_survive_a_transfer() {
    let fx = fixture();
    let mut workbook = Workbook::new();
    let catalog = workbook.add_worksheet();
    catalog.set_name("Catalog").expect("sheet named");
    write_row(catalog, 0, &destination_header());
    write_row(catalog, 1, &[Blank, Blank, S("A1"), S("A1"), S("existing")]);
    catalog
        .write_formula(1, 10, Formula::new("=1+2").set_result("3"))
        .expect("formula written");
    let notes = workbook.add_worksheet();
    notes.set_name("Notes").expect("sheet named");
    notes.write_string(0, 0, "keep me").expect("note written");
    workbook.save(&fx.destination).expect("destination saved");

    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("B2"), "Desc", N(3.5))])],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");
    assert_eq!(result.copied, 1);

    let mut reader: Xlsx<_> = open_workbook(&fx.destination).expect("workbook opened");
    assert_eq!(reader.sheet_names().to_vec(), ["Catalog", "Notes"]);
    let formulas = reader
        .worksheet_formula("Catalog")
        .expect("sheet present")
        .expect("formulas read");
    assert_eq!(formulas.get_value((1, 10)).map(String::as_str), Some("1+2"));
    let notes = reader
        .worksheet_range("Notes")
        .expect("sheet present")
        .expect("sheet read");
    assert_eq!(text(&notes, 1, 0), "keep me");
    let catalog = read_range(&fx.destination, "Catalog");
    assert_eq!(text(&catalog, 3, C), "B2");
}

#[test]
fn destination_formatting_survives_a_transfer() {
    let fx = fixture();
    let mut workbook = Workbook::new();
    let catalog = workbook.add_worksheet();
    catalog.set_name("Catalog").expect("sheet named");
    write_row(catalog, 0, &destination_header());
    let bold = Format::new().set_bold();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    catalog
        .write_string_with_format(1, 2, "A1", &bold)
        .expect("styled key written");
    catalog.write_string(1, 3, "A1").expect("key written");
    catalog
        .write_number_with_format(1, 5, 45413.0, &date)
        .expect("date written");
    workbook.save(&fx.destination).expect("destination saved");

    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("B2"), "Desc", N(3.5))])],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");
    assert_eq!(result.copied, 1);

    let range = read_range(&fx.destination, "Catalog");
    assert_eq!(range.get_value((1, 5)), Some(&DataType::DateTime(45413.0)));
    assert_eq!(text(&range, 3, C), "B2");

    let book = umya_spreadsheet::reader::xlsx::read(&fx.destination).expect("workbook read");
    let sheet = book.get_sheet_by_name("Catalog").expect("sheet present");
    let key = sheet.get_cell("C2").expect("styled cell present");
    let font = key.get_style().get_font().expect("font kept");
    assert!(*font.get_bold());
}

#[cfg(unix)]
#[test]
fn failed_save_leaves_destination_unchanged() {
    use std::os::unix::fs::PermissionsExt;

    let fx = fixture();
    write_destination(&fx.destination, &["A1"]);
    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("B2"), "Desc", N(1.0))])],
    );
    let before = fs::read(&fx.destination).expect("destination read");
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);
    let dir = fx
        .destination
        .parent()
        .expect("destination directory")
        .to_path_buf();

    fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).expect("directory read-only");
    // Privileged users write through directory permissions.
    let writable = fs::File::create(dir.join("write-check")).is_ok();
    let outcome = (!writable).then(|| run(&fx, &["PriceList"], &config));
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("permissions restored");
    let Some(outcome) = outcome else {
        return;
    };

    let error = outcome.unwrap_err();
    assert!(matches!(
        error,
        ToolError::PermissionDenied(_) | ToolError::DestinationLocked(_)
    ));
    assert_eq!(fs::read(&fx.destination).expect("destination read"), before);
}

#[test]
fn rows_go_to_the_active_sheet() {
    let fx = fixture();
    let mut workbook = Workbook::new();
    let cover = workbook.add_worksheet();
    cover.set_name("Cover").expect("sheet named");
    cover.write_string(0, 0, "cover page").expect("cover written");
    let catalog = workbook.add_worksheet();
    catalog.set_name("Catalog").expect("sheet named");
    catalog.set_active(true);
    write_row(catalog, 0, &destination_header());
    workbook.save(&fx.destination).expect("destination saved");

    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("B2"), "Desc", N(3.5))])],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    run(&fx, &["PriceList"], &config).expect("transfer succeeded");

    let catalog = read_range(&fx.destination, "Catalog");
    assert_eq!(text(&catalog, 2, C), "B2");
    let cover = read_range(&fx.destination, "Cover");
    assert_eq!(text(&cover, 1, 0), "cover page");
    assert_eq!(text(&cover, 2, C), "");
}

#[test]
fn result_serialises_to_json() {
    let fx = fixture();
    write_destination(&fx.destination, &[]);
    write_source(
        &fx.source,
        &[("PriceList", vec![cdeh("Fam", S("B2"), "Desc", N(3.5))])],
    );
    let config = ShapeConfig::new().with_sheets(ColumnShape::Cdeh, ["PriceList"]);

    let result = run(&fx, &["PriceList"], &config).expect("transfer succeeded");
    let json = serde_json::to_value(&result).expect("result serialised");

    assert_eq!(json["copied"], 1);
    assert_eq!(json["events"][0]["event"], "sheet_started");
    assert_eq!(json["events"][0]["shape"], "CDEH");
    assert_eq!(json["events"][1]["event"], "inserted");
    assert_eq!(json["events"][1]["destination_row"], 2);
}
