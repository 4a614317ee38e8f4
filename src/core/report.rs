//! Plain-text run logs written next to the outputs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::models::{LabelBoxError, LabelCategory, MissingItem, PatchReport};

pub const LABEL_LOG_NAME: &str = "标签拷贝日志.txt";
pub const BOX_LOG_NAME: &str = "箱唛处理日志.txt";

const RULE_WIDTH: usize = 60;

/// Copy results of one distribution sheet
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetStats {
    pub sheet: String,
    pub folder: String,
    pub expected: usize,
    pub copied: usize,
    pub missing: Vec<MissingItem>,
}

/// A sold-out identifier that was cleaned before matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldOutHit {
    pub sheet: String,
    pub raw: String,
    pub cleaned: String,
}

/// Everything the label stage reports
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelStats {
    pub template_dir: PathBuf,
    pub output_root: PathBuf,
    pub sheets: Vec<SheetStats>,
    pub sold_out: Vec<SoldOutHit>,
    /// Fallback notes and per-file errors
    pub details: Vec<String>,
}

impl LabelStats {
    pub fn total_expected(&self) -> usize {
        self.sheets.iter().map(|s| s.expected).sum()
    }

    pub fn total_copied(&self) -> usize {
        self.sheets.iter().map(|s| s.copied).sum()
    }

    pub fn total_missing(&self) -> usize {
        self.sheets.iter().map(|s| s.missing.len()).sum()
    }

    /// Missing propeller rows across all sheets
    pub fn propeller_missing(&self) -> Vec<&MissingItem> {
        self.sheets
            .iter()
            .flat_map(|s| s.missing.iter())
            .filter(|m| m.forced_name.is_some())
            .collect()
    }
}

/// One box-mark output, or a city that had no template
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BoxRecord {
    Patched {
        city: String,
        file: PathBuf,
        report: PatchReport,
    },
    Skipped {
        city: String,
        reason: String,
    },
}

impl BoxRecord {
    /// Records with warnings or without a template count as "needs checking"
    pub fn needs_check(&self) -> bool {
        match self {
            BoxRecord::Patched { report, .. } => !report.warnings.is_empty(),
            BoxRecord::Skipped { .. } => true,
        }
    }
}

/// Everything the box-mark stage reports
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxStats {
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
    pub store: Option<String>,
    pub records: Vec<BoxRecord>,
}

impl BoxStats {
    pub fn ok_count(&self) -> usize {
        self.records.iter().filter(|r| !r.needs_check()).count()
    }

    pub fn warn_count(&self) -> usize {
        self.records.iter().filter(|r| r.needs_check()).count()
    }
}

/// Header lines shared by both logs
#[derive(Debug, Clone)]
pub struct LogHeader {
    pub workbook: PathBuf,
    pub mmdd: String,
    pub date_source: String,
    pub category: LabelCategory,
}

impl LogHeader {
    fn lines(&self) -> Vec<String> {
        vec![
            format!("版本：{}", env!("CARGO_PKG_VERSION")),
            format!("执行时间：{}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            format!("工作簿：{}", self.workbook.display()),
        ]
    }
}

/// Label copy log text
pub fn label_log_text(header: &LogHeader, stats: &LabelStats) -> String {
    let mut out = header.lines();
    out.push(format!("SN提取日期（MMDD）：{}", header.mmdd));
    out.push(format!("SN日期来源：{}", header.date_source));
    out.push(format!(
        "判定标签类型：{}（模板来源：{}）",
        header.category.label_dir_name(),
        stats.template_dir.display()
    ));
    out.push("=".repeat(40));

    for sheet in &stats.sheets {
        out.push(format!(
            "【{} → {}】应生成：{}  复制文件数：{}",
            sheet.sheet, sheet.folder, sheet.expected, sheet.copied
        ));
        if !sheet.missing.is_empty() {
            out.push("  未找到的编号/候选（候选仅展示前5条）：".to_string());
            out.extend(sheet.missing.iter().map(|m| format!("    - {}", m.describe())));
        }
    }

    if !stats.sold_out.is_empty() {
        out.push(String::new());
        out.push("含“售止”的编号已自动清洗：".to_string());
        out.extend(
            stats
                .sold_out
                .iter()
                .map(|h| format!("  [{}] {} -> {}", h.sheet, h.raw, h.cleaned)),
        );
    }
    if !stats.details.is_empty() {
        out.push(String::new());
        out.push("详细信息/兜底记录/错误：".to_string());
        out.extend(stats.details.iter().cloned());
    }
    out.join("\n") + "\n"
}

/// Box-mark log text
pub fn box_log_text(header: &LogHeader, stats: &BoxStats) -> String {
    let mut out = header.lines();
    out.push(format!(
        "类型：{}  |  模板目录：{}",
        header.category.short_name(),
        stats.template_dir.display()
    ));
    out.push(format!("输出目录：{}", stats.output_dir.display()));
    out.push(format!(
        "生成成功：{}  |  有提示/检查：{}",
        stats.ok_count(),
        stats.warn_count()
    ));
    out.push("-".repeat(RULE_WIDTH));

    let mut debug_lines = Vec::new();
    for record in &stats.records {
        match record {
            BoxRecord::Patched { city, file, report } => {
                let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                out.push(format!("[{}] {}", city, name));
                out.push(format!("  修改：{}", report.summary()));
                if !report.warnings.is_empty() {
                    out.push(format!("  提示：{}", report.warnings.join("; ")));
                }
                if !report.debug.is_empty() {
                    debug_lines.push(format!("[{}] {} -> {}", city, name, report.debug.join(" | ")));
                }
            }
            BoxRecord::Skipped { city, reason } => out.push(format!("[跳过] {}：{}", city, reason)),
        }
    }

    if !debug_lines.is_empty() {
        out.push(String::new());
        out.push("[调试]".to_string());
        out.extend(debug_lines);
    }
    out.join("\n") + "\n"
}

/// `标签统计_<MMDD>.txt` text
pub fn statistics_text(mmdd: &str, stats: &LabelStats) -> String {
    let mut out = vec![
        "标签处理统计报告".to_string(),
        format!("生成时间：{}", mmdd),
        format!("应该生成：{} 个", stats.total_expected()),
        format!("已生成：{} 个", stats.total_copied()),
        format!("缺少：{} 个", stats.total_missing()),
        "=".repeat(80),
        String::new(),
    ];

    if stats.total_missing() == 0 {
        out.push("所有标签都已成功生成！".to_string());
        return out.join("\n") + "\n";
    }

    out.push("缺少的标签详情：".to_string());
    out.push(String::new());
    for sheet in stats.sheets.iter().filter(|s| !s.missing.is_empty()) {
        out.push(format!("【{}】", sheet.sheet));
        for (i, m) in sheet.missing.iter().enumerate() {
            let sku = if m.sku.is_empty() { m.identifier.as_str() } else { m.sku.as_str() };
            let mut line = format!("{}. SKU: {}", i + 1, sku);
            if !m.category.is_empty() {
                line.push_str(&format!(" ({})", m.category));
            }
            line.push_str(&format!(" 第{}行", m.row));
            out.push(line);
        }
        out.push(String::new());
    }
    out.join("\n") + "\n"
}

/// Write `text` to `dir/name`, creating `dir`
pub fn write_log(dir: &Path, name: &str, text: &str) -> Result<PathBuf, LabelBoxError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, text).map_err(|e| {
        LabelBoxError::Io(std::io::Error::new(
            e.kind(),
            format!("写入日志 {} 失败: {}", path.display(), e),
        ))
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldKind;
    use tempfile::TempDir;

    fn missing(sheet: &str, id: &str, forced: Option<&str>) -> MissingItem {
        MissingItem {
            sheet: sheet.to_string(),
            identifier: id.to_string(),
            sku: "1001".to_string(),
            category: "螺旋桨".to_string(),
            row: 7,
            candidates_preview: vec![format!("{}.pld", id)],
            candidates_total: 1,
            forced_name: forced.map(str::to_string),
        }
    }

    fn header() -> LogHeader {
        LogHeader {
            workbook: PathBuf::from("/data/配货.xlsx"),
            mmdd: "1028".to_string(),
            date_source: "兽配货表 第2行".to_string(),
            category: LabelCategory::ThreeC,
        }
    }

    fn stats() -> LabelStats {
        LabelStats {
            template_dir: PathBuf::from("/tpl/标签模板/3C标签"),
            output_root: PathBuf::from("/out/1028-3C标签"),
            sheets: vec![
                SheetStats {
                    sheet: "梨配货表".to_string(),
                    folder: "三只梨".to_string(),
                    expected: 3,
                    copied: 2,
                    missing: vec![missing("梨配货表", "Q1", Some("三只梨螺旋桨.pld"))],
                },
                SheetStats {
                    sheet: "兽仓库配货表".to_string(),
                    folder: "兽".to_string(),
                    expected: 1,
                    copied: 1,
                    missing: vec![],
                },
            ],
            sold_out: vec![SoldOutHit {
                sheet: "兽仓库配货表".to_string(),
                raw: "A1售止".to_string(),
                cleaned: "A1".to_string(),
            }],
            details: vec!["[数字前缀兜底] [兽仓库配货表] 123 -> 命中 1 个".to_string()],
        }
    }

    #[test]
    fn test_label_totals() {
        let s = stats();
        assert_eq!(s.total_expected(), 4);
        assert_eq!(s.total_copied(), 3);
        assert_eq!(s.total_missing(), 1);
        assert_eq!(s.propeller_missing().len(), 1);
    }

    #[test]
    fn test_label_log_lists_missing_once() {
        let text = label_log_text(&header(), &stats());
        assert!(text.contains("【梨配货表 → 三只梨】应生成：3  复制文件数：2"));
        assert_eq!(text.matches("Q1（候选").count(), 1);
        assert!(text.contains("螺旋桨映射未命中：三只梨螺旋桨.pld"));
        assert!(text.contains("[兽仓库配货表] A1售止 -> A1"));
        assert!(text.contains("[数字前缀兜底]"));
    }

    #[test]
    fn test_statistics_text() {
        let text = statistics_text("1028", &stats());
        assert!(text.contains("应该生成：4 个"));
        assert!(text.contains("缺少：1 个"));
        assert!(text.contains("1. SKU: 1001 (螺旋桨) 第7行"));

        let done = statistics_text("1028", &LabelStats::default());
        assert!(done.contains("所有标签都已成功生成！"));
    }

    #[test]
    fn test_box_log_counts_and_debug() {
        let mut report = PatchReport::default();
        report.record(FieldKind::PurchaseOrder, "星号法", 10, 18);
        report.note("city_mode=split");
        let mut warned = PatchReport::default();
        warned.warn("未找到商家名称");

        let stats = BoxStats {
            template_dir: PathBuf::from("/tpl/箱唛模板/3C箱唛"),
            output_dir: PathBuf::from("/out/1028-3C箱唛/兽"),
            store: Some("兽".to_string()),
            records: vec![
                BoxRecord::Patched { city: "北京".to_string(), file: PathBuf::from("/out/北京箱唛.pld"), report },
                BoxRecord::Patched { city: "上海".to_string(), file: PathBuf::from("/out/上海箱唛.pld"), report: warned },
                BoxRecord::Skipped { city: "德州".to_string(), reason: "未找到对应模板".to_string() },
            ],
        };
        assert_eq!(stats.ok_count(), 1);
        assert_eq!(stats.warn_count(), 2);

        let text = box_log_text(&header(), &stats);
        assert!(text.contains("生成成功：1  |  有提示/检查：2"));
        assert!(text.contains("  修改：采购单号(星号法)@10-18"));
        assert!(text.contains("  提示：未找到商家名称"));
        assert!(text.contains("[跳过] 德州：未找到对应模板"));
        assert!(text.contains("[调试]\n[北京] 北京箱唛.pld -> city_mode=split"));
    }

    #[test]
    fn test_write_log_creates_dir() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir.path().join("日志"), LABEL_LOG_NAME, "x").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "x");
    }
}
