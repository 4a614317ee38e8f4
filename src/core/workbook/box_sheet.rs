//! Box-mark sheet: one block of free-text rows per destination.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{SheetData, Workbook};
use crate::core::matching::normalize::to_halfwidth;
use crate::core::pld::CITY_KEYS;
use crate::models::ShipmentEntry;

/// Sheet name of the box-mark table
pub const BOX_SHEET_NAME: &str = "箱唛";

/// Store names recognised in the sheet header, in priority order
pub const STORE_KEYS: [&str; 4] = ["三只梨", "兽无人机", "外星人", "兽"];

/// Header marker of multi-store sheets, which get no store subfolder
const MULTI_STORE_MARKER: &str = "店箱唛";

/// Columns A..I are read for each row
const ROW_WIDTH: usize = 9;

static SEQUENCE_NO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"序号\D*(\d{1,3})").expect("valid sequence regex"));
static PO_IN_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{6,})").expect("valid po regex"));
static PO_CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{6,})").expect("valid po cell regex"));
static SUPPLIER_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-.]").expect("valid supplier regex"));

/// Visible sheet named "箱唛", else the first visible one containing it,
/// else the first visible sheet
pub fn find_box_sheet(workbook: &Workbook) -> Option<&SheetData> {
    workbook
        .visible_sheets()
        .find(|s| s.name.trim() == BOX_SHEET_NAME)
        .or_else(|| workbook.visible_sheets().find(|s| s.name.contains(BOX_SHEET_NAME)))
        .or_else(|| workbook.visible_sheets().next())
}

/// Store subfolder named in header rows 1-3, columns A-E
pub fn decide_store_subfolder(sheet: &SheetData) -> Option<&'static str> {
    let header = (0..3)
        .flat_map(|r| (0..5).map(move |c| (r, c)))
        .map(|(r, c)| sheet.cell(r, c))
        .collect::<Vec<_>>()
        .join(" ");
    if header.contains(MULTI_STORE_MARKER) {
        return None;
    }
    STORE_KEYS.iter().find(|k| header.contains(**k)).copied()
}

#[derive(Default)]
struct PendingEntry {
    city: Option<&'static str>,
    po: Option<String>,
    supplier: Option<String>,
    depot: Option<String>,
    sequence_no: Option<String>,
}

impl PendingEntry {
    /// Complete entries only: city, PO, supplier and depot are required
    fn finish(self) -> Option<ShipmentEntry> {
        Some(ShipmentEntry {
            city: self.city?.to_string(),
            po: self.po?,
            supplier: self.supplier?,
            depot: self.depot?,
            sequence_no: self.sequence_no,
        })
    }
}

/// Parse every destination block of the box-mark sheet
///
/// A row mentioning "目的地" opens a block; supplier, PO and depot rows fill
/// it. Incomplete blocks are dropped.
pub fn parse_entries(sheet: &SheetData) -> Vec<ShipmentEntry> {
    let mut entries = Vec::new();
    let mut current: Option<PendingEntry> = None;

    for row in 0..sheet.height() {
        let cells: Vec<String> = (0..ROW_WIDTH).map(|c| sheet.cell(row, c)).collect();
        let filled: Vec<&str> = cells.iter().map(String::as_str).filter(|v| !v.is_empty()).collect();
        let line = filled.join(" ");

        if line.contains("目的地") {
            if let Some(entry) = current.take().and_then(PendingEntry::finish) {
                entries.push(entry);
            }
            current = Some(PendingEntry {
                city: CITY_KEYS.iter().find(|k| line.contains(**k)).copied(),
                sequence_no: SEQUENCE_NO.captures(&line).map(|c| c[1].to_string()),
                ..Default::default()
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        if line.contains("供应商简码") || line.contains("供应商代码") || line.contains("商家名称") {
            if let Some(last) = filled.last() {
                let code = SUPPLIER_STRIP.replace_all(&to_halfwidth(last), "").to_string();
                if !code.is_empty() {
                    entry.supplier = Some(code);
                }
            }
            continue;
        }

        if line.contains("采购单号") || line.to_uppercase().contains("PO") {
            let po = PO_IN_LINE
                .captures(&line)
                .or_else(|| cells.iter().find_map(|v| PO_CELL.captures(v)))
                .map(|c| c[1].to_string());
            if po.is_some() {
                entry.po = po;
            }
            continue;
        }

        if line.contains("目的库房") || line.contains("目的仓") {
            if let Some(last) = filled.last() {
                let depot = last.replace("；；", "；").trim().to_string();
                if depot != "#N/A" {
                    entry.depot = Some(depot);
                }
            }
        }
    }

    if let Some(entry) = current.and_then(PendingEntry::finish) {
        entries.push(entry);
    }
    debug!(sheet = %sheet.name, entries = entries.len(), "box-mark entries parsed");
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workbook::tests::sheet_from_rows;
    use std::path::Path;

    fn box_rows() -> SheetData {
        sheet_from_rows(
            "箱唛",
            &[
                &["兽 3C 箱唛"],
                &["", ""],
                &[""],
                &["目的地：北京", "序号：3"],
                &["供应商简码", "ＡＢ-12 "],
                &["采购单号", "PO# 12345678"],
                &["目的库房", "北京京东亚一；；仓"],
                &["目的地", "上海"],
                &["商家名称", "XYZ"],
                &["采购单号", "98765432"],
                &["目的库房", "#N/A"],
                &["目的地", "广州"],
                &["供应商代码", "G1"],
                &["PO", "", "555555"],
                &["目的仓", "广州东莞仓-CHN"],
            ],
        )
    }

    #[test]
    fn test_parse_entries() {
        let entries = parse_entries(&box_rows());
        assert_eq!(entries.len(), 2);

        assert_eq!(
            entries[0],
            ShipmentEntry {
                city: "北京".to_string(),
                po: "12345678".to_string(),
                supplier: "AB-12".to_string(),
                depot: "北京京东亚一；仓".to_string(),
                sequence_no: Some("3".to_string()),
            }
        );
        // 上海 has no valid depot and is dropped
        assert_eq!(entries[1].city, "广州");
        assert_eq!(entries[1].po, "555555");
        assert_eq!(entries[1].depot, "广州东莞仓-CHN");
        assert_eq!(entries[1].sequence_no, None);
    }

    #[test]
    fn test_rows_before_first_destination_ignored() {
        let sheet = sheet_from_rows("箱唛", &[&["采购单号", "11111111"], &["目的地", "未知城"]]);
        assert!(parse_entries(&sheet).is_empty());
    }

    #[test]
    fn test_store_subfolder() {
        assert_eq!(decide_store_subfolder(&box_rows()), Some("兽"));
        let drone = sheet_from_rows("箱唛", &[&["", "兽无人机"]]);
        assert_eq!(decide_store_subfolder(&drone), Some("兽无人机"));
        let multi = sheet_from_rows("箱唛", &[&["兽"], &["四店箱唛"]]);
        assert_eq!(decide_store_subfolder(&multi), None);
        // column F is outside the header area
        let far = sheet_from_rows("箱唛", &[&["", "", "", "", "", "外星人"]]);
        assert_eq!(decide_store_subfolder(&far), None);
    }

    #[test]
    fn test_find_box_sheet() {
        let mut hidden = sheet_from_rows("箱唛", &[&["x"]]);
        hidden.visible = false;
        let wb = Workbook::from_sheets(
            Path::new("b.xlsx"),
            vec![hidden, sheet_from_rows("配货表", &[&["x"]]), sheet_from_rows("兽箱唛", &[&["x"]])],
        );
        assert_eq!(find_box_sheet(&wb).map(|s| s.name.as_str()), Some("兽箱唛"));

        let wb = Workbook::from_sheets(Path::new("b.xlsx"), vec![sheet_from_rows("配货表", &[&["x"]])]);
        assert_eq!(find_box_sheet(&wb).map(|s| s.name.as_str()), Some("配货表"));
        assert!(find_box_sheet(&Workbook::from_sheets(Path::new("b.xlsx"), vec![])).is_none());
    }
}
