//! Workbook access for the distribution sheets.
//!
//! Every sheet is loaded once into memory; the readers below work on
//! absolute 0-based (row, column) positions.

pub mod box_sheet;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader, SheetVisible};
use chrono::Local;
use tracing::{debug, info};

use crate::core::matching::normalize::{is_numeric, to_halfwidth};
use crate::core::pld::scanner::looks_like_mmdd;
use crate::models::{ColumnLayout, ItemRow, LabelBoxError, LabelCategory, MatchingConfig};

/// One worksheet with its cells
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub visible: bool,
    pub range: Range<Data>,
}

impl SheetData {
    pub fn new(name: &str, visible: bool, range: Range<Data>) -> Self {
        Self {
            name: name.to_string(),
            visible,
            range,
        }
    }

    /// Trimmed text of the cell at absolute `(row, col)`; "" when empty
    pub fn cell(&self, row: usize, col: usize) -> String {
        let (Ok(r), Ok(c)) = (u32::try_from(row), u32::try_from(col)) else {
            return String::new();
        };
        self.range
            .get_value((r, c))
            .map(cell_text)
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Number of rows counted from row 0
    pub fn height(&self) -> usize {
        self.range.end().map(|(r, _)| r as usize + 1).unwrap_or(0)
    }

    /// Number of columns counted from column 0
    pub fn width(&self) -> usize {
        self.range.end().map(|(_, c)| c as usize + 1).unwrap_or(0)
    }
}

/// Text of a cell; whole floats print without a fraction
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// All sheets of an opened workbook, in workbook order
#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    sheets: Vec<SheetData>,
}

impl Workbook {
    /// Open an xlsx/xlsm workbook and load every sheet
    pub fn open(path: &Path) -> Result<Self, LabelBoxError> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| LabelBoxError::Workbook(format!("无法打开工作簿 {}: {}", path.display(), e)))?;

        let metadata: Vec<(String, bool)> = workbook
            .sheets_metadata()
            .iter()
            .map(|s| (s.name.clone(), s.visible == SheetVisible::Visible))
            .collect();

        let mut sheets = Vec::with_capacity(metadata.len());
        for (name, visible) in metadata {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| LabelBoxError::Workbook(format!("读取工作表 {} 失败: {}", name, e)))?;
            sheets.push(SheetData {
                name,
                visible,
                range,
            });
        }

        info!(path = %path.display(), sheets = sheets.len(), "workbook opened");
        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    /// Workbook built from in-memory sheets
    pub fn from_sheets(path: &Path, sheets: Vec<SheetData>) -> Self {
        Self {
            path: path.to_path_buf(),
            sheets,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheets(&self) -> &[SheetData] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetData> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn visible_sheets(&self) -> impl Iterator<Item = &SheetData> {
        self.sheets.iter().filter(|s| s.visible)
    }
}

/// Canonical sheet → real sheet name, in the configured order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetMap {
    entries: Vec<(String, Option<String>)>,
}

impl SheetMap {
    pub fn real_name(&self, canonical: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| c == canonical)
            .and_then(|(_, real)| real.as_deref())
    }

    /// `(canonical, real)` for every canonical sheet
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(c, r)| (c.as_str(), r.as_deref()))
    }

    /// Canonical names without a matching sheet
    pub fn unresolved(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, r)| r.is_none())
            .map(|(c, _)| c.as_str())
            .collect()
    }
}

/// Resolve the expected sheets through their aliases by exact trimmed name
pub fn resolve_sheet_names(workbook: &Workbook, config: &MatchingConfig) -> SheetMap {
    let entries = config
        .expected_sheets
        .iter()
        .map(|expected| {
            let hit = config.aliases_of(expected).into_iter().find_map(|alias| {
                workbook
                    .sheets()
                    .iter()
                    .find(|s| s.name.trim() == alias)
                    .map(|s| s.name.clone())
            });
            (expected.clone(), hit)
        })
        .collect();
    let map = SheetMap { entries };
    debug!(unresolved = ?map.unresolved(), "sheet names resolved");
    map
}

/// Row predicate applied to filtered sheets
///
/// The default keeps every row. Font colours are not exposed by the workbook
/// reader, so the red-text exclusion of the operators' sheets cannot be
/// evaluated here.
pub trait RowFilter {
    fn keep(&self, _sheet: &SheetData, _row: usize) -> bool {
        true
    }
}

/// Keeps every row
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl RowFilter for KeepAll {}

/// Item rows of a distribution sheet
///
/// Rows with a non-numeric SKU (totals, notes) are skipped; duplicates of
/// (identifier, SKU, category) are kept once.
pub fn read_item_rows(sheet: &SheetData, columns: &ColumnLayout, filter: &dyn RowFilter) -> Vec<ItemRow> {
    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for row in columns.first_data_row..sheet.height() {
        let identifier = sheet.cell(row, columns.identifier);
        let sku = sheet.cell(row, columns.sku);
        let category = sheet.cell(row, columns.category);
        if identifier.is_empty() && sku.is_empty() && category.is_empty() {
            continue;
        }
        if !is_numeric(&sku) || !filter.keep(sheet, row) {
            continue;
        }
        if seen.insert((identifier.clone(), sku.clone(), category.clone())) {
            rows.push(ItemRow::new(&identifier, &sku, &category, row + 1));
        }
    }
    rows
}

/// Trimmed text of cell B1
pub fn read_b1(sheet: &SheetData) -> String {
    sheet.cell(0, 1)
}

fn has_3c_token(text: &str) -> bool {
    let s = to_halfwidth(text).to_lowercase();
    s.contains("3c") || s.contains("3 c")
}

fn has_toy_token(text: &str) -> bool {
    let s = to_halfwidth(text).to_lowercase();
    s.contains("玩具") || s.contains("toy")
}

/// Vote over the B1 cells: only toy votes give toy, everything else 3C
pub fn decide_label_category<S: AsRef<str>>(b1_values: &[S]) -> LabelCategory {
    let (mut votes_3c, mut votes_toy) = (0, 0);
    for b1 in b1_values.iter().map(|v| v.as_ref().trim()).filter(|v| !v.is_empty()) {
        if has_3c_token(b1) {
            votes_3c += 1;
        }
        if has_toy_token(b1) {
            votes_toy += 1;
        }
    }
    if votes_toy > 0 && votes_3c == 0 {
        LabelCategory::Toy
    } else {
        LabelCategory::ThreeC
    }
}

/// MMDD tag of the run and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTag {
    pub mmdd: String,
    pub source: String,
}

/// First MMDD-looking window of the digits in `text`
pub fn mmdd_from_digits(text: &str) -> Option<String> {
    let digits: Vec<u8> = text.bytes().filter(u8::is_ascii_digit).collect();
    digits
        .windows(4)
        .find(|w| looks_like_mmdd(w))
        .map(|w| String::from_utf8_lossy(w).to_string())
}

/// MMDD of a serial number: chars `[-7..-3]`, else any digit window
pub fn mmdd_from_serial(serial: &str) -> Option<String> {
    let s = to_halfwidth(serial);
    let chars: Vec<char> = s.trim().chars().collect();
    if chars.len() >= 7 {
        let window: String = chars[chars.len() - 7..chars.len() - 3].iter().collect();
        if window.len() == 4 && looks_like_mmdd(window.as_bytes()) {
            return Some(window);
        }
    }
    mmdd_from_digits(&chars.iter().collect::<String>())
}

/// Date tag from the serial-number column of the expected sheets, falling
/// back to today's date
pub fn extract_date_tag(workbook: &Workbook, sheets: &SheetMap, columns: &ColumnLayout) -> DateTag {
    for (_, real) in sheets.iter() {
        let Some(sheet) = real.and_then(|r| workbook.sheet(r)) else {
            continue;
        };
        for row in columns.first_data_row..sheet.height() {
            let serial = sheet.cell(row, columns.serial);
            if serial.is_empty() {
                continue;
            }
            if let Some(mmdd) = mmdd_from_serial(&serial) {
                let source = format!("{} 第{}行 D 列：{} → {}", sheet.name, row + 1, serial, mmdd);
                return DateTag { mmdd, source };
            }
        }
    }

    let mmdd = Local::now().format("%m%d").to_string();
    DateTag {
        source: format!("未在 D 列 SN 中找到，回退当天：{}", mmdd),
        mmdd,
    }
}
