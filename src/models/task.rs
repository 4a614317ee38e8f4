use serde::{Deserialize, Serialize};
use std::fmt;

/// Label category of a workbook, decides which template trees are used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelCategory {
    #[serde(rename = "3C")]
    ThreeC,
    #[serde(rename = "玩具")]
    Toy,
}

impl LabelCategory {
    /// "3C" / "玩具"
    pub fn short_name(self) -> &'static str {
        match self {
            LabelCategory::ThreeC => "3C",
            LabelCategory::Toy => "玩具",
        }
    }

    /// Label template folder name: "3C标签" / "玩具标签"
    pub fn label_dir_name(self) -> &'static str {
        match self {
            LabelCategory::ThreeC => "3C标签",
            LabelCategory::Toy => "玩具标签",
        }
    }

    /// Box-mark template folder name: "3C箱唛" / "玩具箱唛"
    pub fn box_dir_name(self) -> &'static str {
        match self {
            LabelCategory::ThreeC => "3C箱唛",
            LabelCategory::Toy => "玩具箱唛",
        }
    }
}

impl fmt::Display for LabelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// One product row of a distribution sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRow {
    pub identifier: String,
    pub sku: String,
    pub category: String,
    /// 1-based spreadsheet row
    pub row: usize,
}

impl ItemRow {
    pub fn new(identifier: &str, sku: &str, category: &str, row: usize) -> Self {
        Self {
            identifier: identifier.to_string(),
            sku: sku.to_string(),
            category: category.to_string(),
            row,
        }
    }

    /// Identifier used for matching; falls back to the row number when blank
    pub fn display_identifier(&self) -> String {
        if !self.identifier.is_empty() {
            self.identifier.clone()
        } else if self.row > 0 {
            format!("(第{}行)", self.row)
        } else {
            "(未知)".to_string()
        }
    }
}

/// One destination record of the box-mark sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEntry {
    pub city: String,
    pub po: String,
    pub supplier: String,
    pub depot: String,
    #[serde(default)]
    pub sequence_no: Option<String>,
}

/// Semantic field inside a template buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    PurchaseOrder,
    Supplier,
    SequenceNo,
    Depot,
    CityDisplay,
    SerialDate,
}

impl FieldKind {
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::PurchaseOrder => "采购单号",
            FieldKind::Supplier => "商家名称",
            FieldKind::SequenceNo => "箱唛序号",
            FieldKind::Depot => "目的库房",
            FieldKind::CityDisplay => "目的城市",
            FieldKind::SerialDate => "SN日期",
        }
    }
}

/// Byte range `[start, end)` of one field inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRegion {
    pub kind: FieldKind,
    pub start: usize,
    pub end: usize,
}

impl FieldRegion {
    pub fn new(kind: FieldKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    pub fn width(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// A field that was rewritten, with the locator that found it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub region: FieldRegion,
    /// Short description of the locating method, e.g. "字段标签法"
    pub method: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({})@{}-{}",
            self.region.kind.label(),
            self.method,
            self.region.start,
            self.region.end
        )
    }
}

/// Outcome of patching one template buffer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub changes: Vec<FieldChange>,
    pub warnings: Vec<String>,
    pub debug: Vec<String>,
}

impl PatchReport {
    pub fn record(&mut self, kind: FieldKind, method: &str, start: usize, end: usize) {
        self.changes.push(FieldChange {
            region: FieldRegion::new(kind, start, end),
            method: method.to_string(),
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.debug.push(message.into());
    }

    pub fn count(&self, kind: FieldKind) -> usize {
        self.changes.iter().filter(|c| c.region.kind == kind).count()
    }

    /// One-line "修改：..." summary for logs
    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            return "无".to_string();
        }
        self.changes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// An item row for which no template could be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingItem {
    pub sheet: String,
    pub identifier: String,
    pub sku: String,
    pub category: String,
    pub row: usize,
    /// First few candidate filenames that were tried
    pub candidates_preview: Vec<String>,
    pub candidates_total: usize,
    /// Propeller template name that was forced but not present
    #[serde(default)]
    pub forced_name: Option<String>,
}

impl MissingItem {
    pub fn describe(&self) -> String {
        let mut text = format!("{}（候选：{}", self.identifier, self.candidates_preview.join(", "));
        if self.candidates_total > self.candidates_preview.len() {
            text.push_str(&format!(" …共{}项", self.candidates_total));
        }
        text.push('）');
        if let Some(name) = &self.forced_name {
            text.push_str(&format!(" ← 螺旋桨映射未命中：{}", name));
        }
        text
    }
}
