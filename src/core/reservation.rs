//! Reservation table (预定表): SKU × city quantities transposed into rows.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use rust_xlsxwriter::{Format, FormatAlign, Workbook as XlsxWorkbook, XlsxError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::matching::normalize::is_numeric;
use crate::core::pld::CITY_KEYS;
use crate::core::workbook::{SheetData, SheetMap, Workbook};
use crate::models::{ColumnLayout, LabelBoxError, MatchingConfig};

/// First city column (G)
pub const CITY_START_COL: usize = 6;

pub const SHEET_NAME: &str = "预定表";

const HEADERS: [&str; 4] = ["商品编号", "配送中心名称", "有限预订数量", "备注"];

const MAX_COLUMN_WIDTH: usize = 50;

static NUMBERED_CITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^({})-?(\d+)$", CITY_KEYS.join("|"))).expect("valid city regex")
});

/// A city column header: standard city, or city followed by digits
/// (`北京2`, `北京-2`) which maps to the city with the header kept as remark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityColumn {
    pub col: usize,
    pub city: &'static str,
    pub remark: String,
}

/// Parse one header cell
pub fn parse_city_header(header: &str) -> Option<(&'static str, String)> {
    let header = header.trim();
    if let Some(city) = CITY_KEYS.iter().copied().find(|c| *c == header) {
        return Some((city, String::new()));
    }
    let caps = NUMBERED_CITY.captures(header)?;
    let city = CITY_KEYS.iter().copied().find(|c| *c == &caps[1])?;
    Some((city, format!("{}{}", city, &caps[2])))
}

/// City columns from G rightwards, stopping at the first empty or non-city header
pub fn city_columns(sheet: &SheetData) -> Vec<CityColumn> {
    let mut columns = Vec::new();
    for col in CITY_START_COL..sheet.width() {
        let header = sheet.cell(0, col);
        if header.is_empty() {
            break;
        }
        match parse_city_header(&header) {
            Some((city, remark)) => columns.push(CityColumn { col, city, remark }),
            None => break,
        }
    }
    columns
}

/// One output row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRow {
    pub sku: String,
    pub city: String,
    pub quantity: i64,
    pub remark: String,
    #[serde(skip)]
    sheet_order: usize,
    #[serde(skip)]
    city_order: usize,
}

fn parse_quantity(text: &str) -> i64 {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().map(|f| f.trunc() as i64))
        .unwrap_or(0)
}

/// Rows with quantity > 0 of one sheet; SKUs are numeric and unique
pub fn read_sheet_rows(sheet: &SheetData, sheet_order: usize, columns: &ColumnLayout) -> Vec<ReservationRow> {
    let cities = city_columns(sheet);
    debug!(sheet = %sheet.name, cities = ?cities.iter().map(|c| c.city).collect::<Vec<_>>(), "city columns");

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for row in columns.first_data_row..sheet.height() {
        let sku = sheet.cell(row, columns.sku);
        if !is_numeric(&sku) || !seen.insert(sku.clone()) {
            continue;
        }
        for column in &cities {
            let quantity = parse_quantity(&sheet.cell(row, column.col));
            if quantity > 0 {
                rows.push(ReservationRow {
                    sku: sku.clone(),
                    city: column.city.to_string(),
                    quantity,
                    remark: column.remark.clone(),
                    sheet_order,
                    city_order: CITY_KEYS.iter().position(|c| *c == column.city).unwrap_or(usize::MAX),
                });
            }
        }
    }
    rows
}

/// Rows of every reservation sheet, sorted by sheet, city order, then SKU
pub fn collect_rows(workbook: &Workbook, sheets: &SheetMap, config: &MatchingConfig) -> Vec<ReservationRow> {
    let mut rows = Vec::new();
    for (order, canonical) in config.reservation_sheets.iter().enumerate() {
        let Some(sheet) = sheets.real_name(canonical).and_then(|r| workbook.sheet(r)) else {
            warn!(sheet = %canonical, "reservation sheet not found, skipped");
            continue;
        };
        let sheet_rows = read_sheet_rows(sheet, order, &config.columns);
        info!(sheet = %sheet.name, rows = sheet_rows.len(), "reservation rows read");
        rows.extend(sheet_rows);
    }
    rows.sort_by(|a, b| {
        (a.sheet_order, a.city_order, &a.sku).cmp(&(b.sheet_order, b.city_order, &b.sku))
    });
    rows
}

/// `<base>/<MMDD>-3C预定表.xlsx`, with a `_HHMMSS` suffix when the file exists
pub fn output_path(base: &Path, mmdd: &str) -> PathBuf {
    let path = base.join(format!("{}-3C预定表.xlsx", mmdd));
    if !path.exists() {
        return path;
    }
    base.join(format!("{}-3C预定表_{}.xlsx", mmdd, Local::now().format("%H%M%S")))
}

/// Display width: non-ASCII characters count double
fn display_width(text: &str) -> usize {
    text.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}

fn xlsx_err(e: XlsxError) -> LabelBoxError {
    LabelBoxError::Reservation(e.to_string())
}

/// Write the rows to a single-sheet workbook
pub fn write_table(rows: &[ReservationRow], path: &Path) -> Result<(), LabelBoxError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut workbook = XlsxWorkbook::new();
    let centered = Format::new()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME).map_err(xlsx_err)?;

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| display_width(h)).collect();
    for (col, header) in HEADERS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *header, &centered)
            .map_err(xlsx_err)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_string_with_format(r, 0, &row.sku, &centered).map_err(xlsx_err)?;
        sheet.write_string_with_format(r, 1, &row.city, &centered).map_err(xlsx_err)?;
        sheet
            .write_number_with_format(r, 2, row.quantity as f64, &centered)
            .map_err(xlsx_err)?;
        sheet.write_string_with_format(r, 3, &row.remark, &centered).map_err(xlsx_err)?;

        let cells = [row.sku.clone(), row.city.clone(), row.quantity.to_string(), row.remark.clone()];
        for (w, text) in widths.iter_mut().zip(cells.iter()) {
            *w = (*w).max(display_width(text));
        }
    }

    for (col, width) in widths.iter().enumerate() {
        let width = (width + 2).min(MAX_COLUMN_WIDTH);
        sheet.set_column_width(col as u16, width as f64).map_err(xlsx_err)?;
    }

    workbook.save(path).map_err(xlsx_err)?;
    Ok(())
}

/// Result of a reservation-only run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationOutcome {
    pub output_path: PathBuf,
    pub total_rows: usize,
}

/// Collect, then write `<MMDD>-3C预定表.xlsx` under `base`
pub fn generate_reservation_table(
    workbook: &Workbook,
    sheets: &SheetMap,
    config: &MatchingConfig,
    base: &Path,
    mmdd: &str,
) -> Result<ReservationOutcome, LabelBoxError> {
    let rows = collect_rows(workbook, sheets, config);
    if rows.is_empty() {
        return Err(LabelBoxError::Reservation("未提取到任何预定数据".to_string()));
    }
    let path = output_path(base, mmdd);
    write_table(&rows, &path)?;
    info!(path = %path.display(), rows = rows.len(), "reservation table written");
    Ok(ReservationOutcome {
        output_path: path,
        total_rows: rows.len(),
    })
}
