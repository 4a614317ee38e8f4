use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::compression::archive_folder;
use crate::core::file_ops::{
    find_city_template, numbered_output_path, resolve_box_template_dir, resolve_label_template_dir,
    OutputLayout, TemplateIndex,
};
use crate::core::matching::{normalize, PropellerCatalog, ProductCodeStore, TemplateResolver, SOLD_OUT_MARKER};
use crate::core::pld::{patch_file, run_patch_step, DatePatchSummary};
use crate::core::report::{
    box_log_text, label_log_text, statistics_text, write_log, BoxRecord, BoxStats, LabelStats, LogHeader,
    SheetStats, SoldOutHit, BOX_LOG_NAME, LABEL_LOG_NAME,
};
use crate::core::reservation::{generate_reservation_table, ReservationOutcome};
use crate::core::workbook::box_sheet::{decide_store_subfolder, find_box_sheet, parse_entries};
use crate::core::workbook::{
    decide_label_category, extract_date_tag, read_b1, read_item_rows, resolve_sheet_names, KeepAll, RowFilter,
    SheetMap, Workbook,
};
use crate::models::{LabelBoxError, LabelCategory, OutputMode, RunConfig, SheetFolder, TypeMode};
use crate::utils::progress::ProgressSink;

/// 一次批处理的结果
///
/// 失败时 `error` / `traceback` 有值，已完成阶段的统计仍然保留。
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub error: Option<String>,
    /// 错误链（或 panic 信息）
    pub traceback: Option<String>,
    pub mmdd: Option<String>,
    pub date_source: Option<String>,
    /// 实际使用的类型
    pub category: Option<LabelCategory>,
    pub auto_detected: Option<LabelCategory>,
    /// 强制类型与自动识别结果不一致
    pub type_mismatch: bool,
    pub labels: Option<LabelStats>,
    pub date_patch: Option<DatePatchSummary>,
    pub box_marks: Option<BoxStats>,
    pub reservation: Option<ReservationOutcome>,
    pub archives: Vec<PathBuf>,
    pub log_files: Vec<PathBuf>,
    pub statistics_file: Option<PathBuf>,
}

impl RunResult {
    fn fail(&mut self, err: &LabelBoxError) {
        self.success = false;
        self.error = Some(err.to_string());
        self.traceback = Some(error_chain(err));
    }

    fn panicked(message: String) -> Self {
        Self {
            success: false,
            error: Some("处理过程中发生未预期的错误".to_string()),
            traceback: Some(message),
            ..Default::default()
        }
    }

    /// 完成提示文本
    pub fn summary_text(&self) -> String {
        if !self.success {
            return format!("处理失败：{}", self.error.as_deref().unwrap_or("未知错误"));
        }
        let mut lines = vec![
            format!("标签类型：{}", self.category.map(|c| c.short_name()).unwrap_or("N/A")),
            format!("日期标识：{}", self.mmdd.as_deref().unwrap_or("N/A")),
        ];
        if let Some(reservation) = &self.reservation {
            lines.push(format!("预定表行数：{}", reservation.total_rows));
            lines.push(format!("输出文件：{}", reservation.output_path.display()));
            return lines.join("\n");
        }
        if let Some(labels) = &self.labels {
            lines.push("标签统计：".to_string());
            lines.push(format!("  应该生成：{} 个", labels.total_expected()));
            lines.push(format!("  已生成：{} 个", labels.total_copied()));
            if labels.total_missing() > 0 {
                lines.push(format!("  缺少：{} 个", labels.total_missing()));
            }
        }
        if let Some(boxes) = &self.box_marks {
            lines.push(format!("箱唛：成功 {} 个，警告 {} 个", boxes.ok_count(), boxes.warn_count()));
        }
        if !self.archives.is_empty() {
            lines.push(format!("ZIP：{} 个", self.archives.len()));
        }
        lines.join("\n")
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {}", cause));
        source = cause.source();
    }
    lines.join("\n")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// 转发到调用方，同时保留全部日志行（用于"生成日志文件"）
struct Journal<'a> {
    inner: &'a dyn ProgressSink,
    lines: Mutex<Vec<String>>,
}

impl<'a> Journal<'a> {
    fn new(inner: &'a dyn ProgressSink) -> Self {
        Self {
            inner,
            lines: Mutex::new(Vec::new()),
        }
    }

    fn text(&self) -> String {
        self.lines.lock().map(|lines| lines.join("\n")).unwrap_or_default()
    }
}

impl ProgressSink for Journal<'_> {
    fn progress(&self, value: u8, text: &str) {
        self.inner.progress(value, text);
    }

    fn log(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
        self.inner.log(message);
    }

    fn finished(&self, success: bool) {
        self.inner.finished(success);
    }
}

/// 处理一个配货工作簿：标签复制、日期批改、箱唛生成、打包
///
/// # Arguments
/// * `config` - 本次运行配置
/// * `sink` - 进度与日志接收方
///
/// # Returns
/// * 运行结果；任何错误或 panic 都转成 `success: false`
pub fn process_workbook(config: &RunConfig, sink: &dyn ProgressSink) -> RunResult {
    process_workbook_with(config, sink, &KeepAll)
}

/// 同 [`process_workbook`]，过滤表（如 兽无人机拆2）的行经 `row_filter` 筛选
pub fn process_workbook_with(config: &RunConfig, sink: &dyn ProgressSink, row_filter: &dyn RowFilter) -> RunResult {
    let journal = Journal::new(sink);
    info!(workbook = %config.workbook_path.display(), mode = ?config.output_mode, "batch started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut result = RunResult::default();
        let status = run_stages(config, &journal, row_filter, &mut result);
        (result, status)
    }));

    let result = match outcome {
        Ok((mut result, Ok(()))) => {
            result.success = true;
            result
        }
        Ok((mut result, Err(e))) => {
            error!(error = %e, "batch failed");
            journal.log(&format!("✗ 处理失败：{}", e));
            result.fail(&e);
            result
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "batch panicked");
            journal.log(&format!("✗ 未预期的错误：{}", message));
            RunResult::panicked(message)
        }
    };

    if result.success && config.save_log {
        save_operator_log(config, &result, &journal);
    }
    info!(success = result.success, "batch finished");
    result
}

/// 在后台线程运行批处理，结束时调用 `sink.finished`
pub fn spawn_batch(config: RunConfig, sink: Arc<dyn ProgressSink>) -> JoinHandle<RunResult> {
    thread::spawn(move || {
        let result = process_workbook(&config, sink.as_ref());
        sink.finished(result.success);
        result
    })
}

// 日志文件名：1027-3C标签箱唛-处理日志.txt
fn save_operator_log(config: &RunConfig, result: &RunResult, journal: &Journal<'_>) {
    let (Some(mmdd), Some(category)) = (&result.mmdd, result.category) else {
        return;
    };
    let path = config
        .resolved_output_base()
        .join(format!("{}-{}标签箱唛-处理日志.txt", mmdd, category.short_name()));
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(&path, journal.text()));
    match written {
        Ok(()) => journal.log(&format!("日志已保存：{}", path.display())),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "operator log not saved");
            journal.log(&format!("保存日志失败：{}", e));
        }
    }
}

/// 工作簿预检结果，供运行前确认类型
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookInfo {
    /// (标准表名, 实际表名)
    pub sheets: Vec<(String, Option<String>)>,
    pub detected: LabelCategory,
    pub mmdd: String,
    pub date_source: String,
    pub box_sheet: Option<String>,
    pub box_store: Option<String>,
    pub box_entries: usize,
}

/// 只读预检：识别工作表、类型、日期和箱唛条目数，不写任何文件
pub fn inspect_workbook(config: &RunConfig) -> Result<WorkbookInfo, String> {
    let workbook = Workbook::open(&config.workbook_path)?;
    let sheets = resolve_sheet_names(&workbook, &config.matching);
    let tag = extract_date_tag(&workbook, &sheets, &config.matching.columns);
    let box_sheet = find_box_sheet(&workbook);

    Ok(WorkbookInfo {
        sheets: sheets
            .iter()
            .map(|(canonical, real)| (canonical.to_string(), real.map(str::to_string)))
            .collect(),
        detected: detect_category(&workbook, &sheets),
        mmdd: tag.mmdd,
        date_source: tag.source,
        box_sheet: box_sheet.map(|s| s.name.clone()),
        box_store: box_sheet.and_then(decide_store_subfolder).map(str::to_string),
        box_entries: box_sheet.map(|s| parse_entries(s).len()).unwrap_or(0),
    })
}

fn detect_category(workbook: &Workbook, sheets: &SheetMap) -> LabelCategory {
    let b1_values: Vec<String> = sheets
        .iter()
        .filter_map(|(_, real)| real.and_then(|r| workbook.sheet(r)))
        .map(read_b1)
        .collect();
    decide_label_category(&b1_values)
}

fn run_stages(
    config: &RunConfig,
    sink: &dyn ProgressSink,
    row_filter: &dyn RowFilter,
    result: &mut RunResult,
) -> Result<(), LabelBoxError> {
    // === Step 1: 打开工作簿 ===
    sink.progress(10, "正在读取Excel文件...");
    sink.log(&format!("工作簿：{}", config.workbook_path.display()));
    let workbook = Workbook::open(&config.workbook_path)?;
    debug!(sheets = ?workbook.sheet_names(), "workbook sheets");

    // === Step 2: 识别工作表 ===
    sink.progress(15, "正在识别工作表...");
    let sheets = resolve_sheet_names(&workbook, &config.matching);
    for (canonical, real) in sheets.iter() {
        match real {
            Some(real) => sink.log(&format!("  {} → {}", canonical, real)),
            None => sink.log(&format!("  {}：未找到", canonical)),
        }
    }

    // === Step 3: 判定标签类型 ===
    sink.progress(20, "正在判定标签类型...");
    let detected = detect_category(&workbook, &sheets);
    let category = match config.type_mode {
        TypeMode::Auto => detected,
        TypeMode::ThreeC => LabelCategory::ThreeC,
        TypeMode::Toy => LabelCategory::Toy,
    };
    result.auto_detected = Some(detected);
    result.category = Some(category);
    result.type_mismatch = config.type_mode != TypeMode::Auto && category != detected;
    sink.log(&format!("标签类型：{}（自动识别：{}）", category, detected));
    if result.type_mismatch {
        warn!(used = %category, detected = %detected, "forced type differs from detected type");
        sink.log("[提示] 所选类型与自动识别结果不一致");
    }

    // === Step 4: 提取日期标识 ===
    sink.progress(25, "正在提取日期标识...");
    let tag = extract_date_tag(&workbook, &sheets, &config.matching.columns);
    sink.log(&format!("SN提取日期（MMDD）：{}", tag.mmdd));
    sink.log(&format!("SN日期来源：{}", tag.source));
    result.mmdd = Some(tag.mmdd.clone());
    result.date_source = Some(tag.source.clone());

    let base = config.resolved_output_base();
    if config.output_mode == OutputMode::Reservation {
        return generate_reservation(config, &workbook, &sheets, category, &base, &tag.mmdd, sink, result);
    }

    let layout = OutputLayout::new(&base, &tag.mmdd, category);
    let header = LogHeader {
        workbook: config.workbook_path.clone(),
        mmdd: tag.mmdd.clone(),
        date_source: tag.source.clone(),
        category,
    };

    // === Step 5: 标签复制 + 日期批改 ===
    if config.output_mode.generates_labels() {
        let stats = generate_labels(config, &workbook, &sheets, category, &layout, row_filter, sink)?;

        sink.progress(60, "正在批改标签日期...");
        sink.log("\n=== 批量修改标签日期 ===");
        let summary = run_patch_step(&stats.output_root, &tag.mmdd, false, config.make_backup)?;
        sink.log(&summary.summary_text());
        if summary.failures() > 0 {
            sink.log(&format!("[警告] {} 个文件日期批改失败，详见报告", summary.failures()));
        }
        keep_log(result, sink, summary.save_report(&layout.log_dir()));
        keep_log(
            result,
            sink,
            write_log(&layout.log_dir(), LABEL_LOG_NAME, &label_log_text(&header, &stats)),
        );

        let stats_path = layout.statistics_path();
        match fs::write(&stats_path, statistics_text(&tag.mmdd, &stats)) {
            Ok(()) => result.statistics_file = Some(stats_path),
            Err(e) => {
                warn!(path = %stats_path.display(), error = %e, "statistics report not written");
                sink.log(&format!("[警告] 统计报告写入失败：{}", e));
            }
        }

        result.date_patch = Some(summary);
        result.labels = Some(stats);
    }

    // === Step 6: 箱唛 ===
    if config.output_mode.generates_box_marks() {
        sink.progress(70, "开始生成箱唛...");
        sink.log("\n=== 开始生成箱唛 ===");
        if let Some(stats) = generate_box_marks(config, &workbook, category, &layout, sink)? {
            keep_log(
                result,
                sink,
                write_log(&layout.log_dir(), BOX_LOG_NAME, &box_log_text(&header, &stats)),
            );
            result.box_marks = Some(stats);
        }
    }

    sink.progress(95, "处理完成...");

    // === Step 7: 打包 ===
    if config.create_zip {
        sink.progress(97, "正在打包ZIP...");
        sink.log("\n=== 打包ZIP文件 ===");
        result.archives = archive_outputs(&layout, result.labels.is_some(), result.box_marks.is_some(), sink);
        sink.log(&format!("ZIP打包完成，共生成 {} 个压缩包", result.archives.len()));
    }

    sink.progress(100, "✓ 全部完成！");
    Ok(())
}

fn keep_log(result: &mut RunResult, sink: &dyn ProgressSink, written: Result<PathBuf, LabelBoxError>) {
    match written {
        Ok(path) => result.log_files.push(path),
        Err(e) => {
            warn!(error = %e, "log file not written");
            sink.log(&format!("[警告] 日志写入失败：{}", e));
        }
    }
}

/// 表 → 店铺文件夹；店铺筛选只在结果非空时生效
pub(crate) fn label_folders(config: &RunConfig, category: LabelCategory) -> Vec<&SheetFolder> {
    let all = match category {
        LabelCategory::ThreeC => &config.matching.label_folders_3c,
        LabelCategory::Toy => &config.matching.label_folders_toy,
    };
    if config.selected_shops.is_empty() {
        return all.iter().collect();
    }
    let selected: Vec<&SheetFolder> = all
        .iter()
        .filter(|f| config.selected_shops.contains(&f.folder))
        .collect();
    if selected.is_empty() {
        all.iter().collect()
    } else {
        selected
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// 读取螺旋桨映射文件；损坏时只告警，继续使用内置映射和模板文件名
fn load_product_map(path: &Path, sink: &dyn ProgressSink) -> ProductCodeStore {
    match ProductCodeStore::load(path) {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "product-code map unreadable, ignored");
            sink.log(&format!("[警告] 螺旋桨映射文件读取失败，已忽略：{}", e));
            ProductCodeStore::new()
        }
    }
}

fn generate_labels(
    config: &RunConfig,
    workbook: &Workbook,
    sheets: &SheetMap,
    category: LabelCategory,
    layout: &OutputLayout,
    row_filter: &dyn RowFilter,
    sink: &dyn ProgressSink,
) -> Result<LabelStats, LabelBoxError> {
    sink.log("\n=== 开始生成标签 ===");
    let template_dir =
        resolve_label_template_dir(&config.template_root, category.label_dir_name()).require("标签模板目录")?;
    sink.log(&format!("标签模板目录：{}", template_dir.display()));

    let index = TemplateIndex::build(&template_dir)?;
    let store = match &config.product_map_path {
        Some(path) => load_product_map(path, sink),
        None => ProductCodeStore::new(),
    };
    let catalog = PropellerCatalog::build(&index, &config.matching, &store);
    let resolver = TemplateResolver::new(&index, &catalog, &config.matching);
    info!(templates = index.len(), mappings = catalog.len(), "label templates indexed");

    let mut stats = LabelStats {
        template_dir,
        output_root: layout.label_root(),
        ..Default::default()
    };
    fs::create_dir_all(&stats.output_root)?;

    let folders = label_folders(config, category);
    if !config.selected_shops.is_empty() {
        let names: Vec<&str> = folders.iter().map(|f| f.folder.as_str()).collect();
        sink.log(&format!("已启用店铺筛选，只处理：{}", names.join(", ")));
    }

    sink.progress(30, "正在复制标签文件...");
    for folder in folders {
        let Some(sheet) = sheets.real_name(&folder.sheet).and_then(|r| workbook.sheet(r)) else {
            sink.log(&format!("  跳过：{}（未找到工作表）", folder.sheet));
            continue;
        };
        sink.log(&format!("\n处理工作表：{} → {}", folder.sheet, folder.folder));

        let filter: &dyn RowFilter = if config.matching.is_filtered(&folder.sheet) {
            row_filter
        } else {
            &KeepAll
        };
        let rows = read_item_rows(sheet, &config.matching.columns, filter);
        sink.log(&format!("  读取行数：{} 个（已过滤非数字SKU）", rows.len()));

        let dest = stats.output_root.join(&folder.folder);
        let mut sheet_stats = SheetStats {
            sheet: folder.sheet.clone(),
            folder: folder.folder.clone(),
            expected: rows.len(),
            ..Default::default()
        };

        for row in &rows {
            if row.identifier.contains(SOLD_OUT_MARKER) {
                stats.sold_out.push(SoldOutHit {
                    sheet: folder.sheet.clone(),
                    raw: row.identifier.clone(),
                    cleaned: normalize(&row.identifier),
                });
            }

            let resolution = match resolver.resolve(&folder.sheet, row) {
                Ok(resolution) => resolution,
                Err(missing) => {
                    sink.log(&format!("  [缺少] SKU {}：{}", missing.sku, missing.describe()));
                    sheet_stats.missing.push(missing);
                    continue;
                }
            };

            if let (Some(name), Some(strategy)) = (&resolution.forced_name, resolution.propeller_strategy) {
                sink.log(&format!("  [螺旋桨] SKU {} → 匹配到：{}", row.sku, name));
                debug!(sku = %row.sku, strategy, "propeller mapping");
            }
            if resolution.via_numeric_prefix {
                stats.details.push(format!(
                    "[数字前缀兜底] [{}] {} -> 命中 {} 个",
                    folder.sheet,
                    row.display_identifier(),
                    resolution.matches.len()
                ));
            }

            for src in &resolution.matches {
                match layout.copy_into(src, &dest) {
                    Ok(_) => sheet_stats.copied += 1,
                    Err(e) => {
                        let line = format!("[复制失败] {} -> {}：{}", file_name(src), dest.display(), e);
                        warn!(file = %src.display(), error = %e, "template copy failed");
                        sink.log(&format!("  {}", line));
                        stats.details.push(line);
                    }
                }
            }
        }

        sink.log(&format!("  ✓ 已复制 {} 个文件", sheet_stats.copied));
        info!(
            sheet = %folder.sheet,
            expected = sheet_stats.expected,
            copied = sheet_stats.copied,
            missing = sheet_stats.missing.len(),
            "sheet processed"
        );
        stats.sheets.push(sheet_stats);
    }

    sink.log(&format!("\n标签复制完成，共复制 {} 个文件", stats.total_copied()));
    let propeller_missing = stats.propeller_missing();
    if !propeller_missing.is_empty() {
        sink.log(&format!("\n[警告] 发现 {} 个螺旋桨文件未找到：", propeller_missing.len()));
        for item in propeller_missing {
            sink.log(&format!("  - {} / SKU: {} / ID: {}", item.sheet, item.sku, item.identifier));
        }
    }
    Ok(stats)
}

fn generate_box_marks(
    config: &RunConfig,
    workbook: &Workbook,
    category: LabelCategory,
    layout: &OutputLayout,
    sink: &dyn ProgressSink,
) -> Result<Option<BoxStats>, LabelBoxError> {
    let Some(sheet) = find_box_sheet(workbook) else {
        sink.log("✗ 未找到箱唛工作表");
        return Ok(None);
    };
    let store = decide_store_subfolder(sheet);
    let entries = parse_entries(sheet);
    if entries.is_empty() {
        sink.log("✗ 箱唛工作表中未识别到有效条目");
        return Ok(None);
    }
    sink.log(&format!("识别到 {} 个箱唛条目", entries.len()));

    let template_dir =
        resolve_box_template_dir(&config.template_root, category.box_dir_name()).require("箱唛模板目录")?;
    sink.log(&format!("箱唛模板目录：{}", template_dir.display()));

    let output_dir = layout.box_dir(store);
    fs::create_dir_all(&output_dir)?;
    sink.log(&format!("箱唛输出目录：{}", output_dir.display()));

    let mut stats = BoxStats {
        template_dir,
        output_dir,
        store: store.map(str::to_string),
        records: Vec::with_capacity(entries.len()),
    };
    let mut city_counts: HashMap<&str, usize> = HashMap::new();

    sink.progress(75, "正在生成箱唛文件...");
    for entry in &entries {
        let Some(template) = find_city_template(&stats.template_dir, &entry.city) else {
            sink.log(&format!("  跳过 {}：未找到模板", entry.city));
            stats.records.push(BoxRecord::Skipped {
                city: entry.city.clone(),
                reason: "未找到对应模板".to_string(),
            });
            continue;
        };

        let occurrence = city_counts.entry(entry.city.as_str()).or_insert(0);
        let out = numbered_output_path(&stats.output_dir, &template, *occurrence);
        *occurrence += 1;

        match patch_file(&template, &out, entry) {
            Ok(report) => {
                if report.warnings.is_empty() {
                    sink.log(&format!("  ✓ [{}] {}", entry.city, file_name(&out)));
                } else {
                    sink.log(&format!("  [{}] {} - 有警告", entry.city, file_name(&out)));
                }
                debug!(city = %entry.city, file = %out.display(), changes = %report.summary(), "box mark patched");
                stats.records.push(BoxRecord::Patched {
                    city: entry.city.clone(),
                    file: out,
                    report,
                });
            }
            Err(e) => {
                warn!(city = %entry.city, error = %e, "box mark not written");
                sink.log(&format!("  ✗ [{}] {}：{}", entry.city, file_name(&out), e));
                stats.records.push(BoxRecord::Skipped {
                    city: entry.city.clone(),
                    reason: format!("改写失败：{}", e),
                });
            }
        }
    }

    sink.log(&format!(
        "\n箱唛生成完成：成功 {} 个，警告 {} 个",
        stats.ok_count(),
        stats.warn_count()
    ));
    Ok(Some(stats))
}

#[allow(clippy::too_many_arguments)]
fn generate_reservation(
    config: &RunConfig,
    workbook: &Workbook,
    sheets: &SheetMap,
    category: LabelCategory,
    base: &Path,
    mmdd: &str,
    sink: &dyn ProgressSink,
    result: &mut RunResult,
) -> Result<(), LabelBoxError> {
    if category != LabelCategory::ThreeC {
        return Err(LabelBoxError::InvalidConfig(format!(
            "预定表仅支持3C类型，当前类型：{}",
            category
        )));
    }
    sink.progress(60, "正在生成预定表...");
    sink.log("\n=== 生成预定表 ===");
    let outcome = generate_reservation_table(workbook, sheets, &config.matching, base, mmdd)?;
    sink.log(&format!("预定表行数：{}", outcome.total_rows));
    sink.log(&format!("输出文件：{}", outcome.output_path.display()));
    result.reservation = Some(outcome);
    sink.progress(100, "✓ 全部完成！");
    Ok(())
}

fn archive_outputs(layout: &OutputLayout, labels: bool, boxes: bool, sink: &dyn ProgressSink) -> Vec<PathBuf> {
    let mut folders = Vec::new();
    if labels {
        folders.push(layout.label_root());
    }
    if boxes {
        folders.push(layout.box_root());
    }

    folders
        .into_iter()
        .filter(|folder| folder.is_dir())
        .filter_map(|folder| match archive_folder(&folder) {
            Ok(path) => {
                sink.log(&format!("  ✓ 已打包：{}", file_name(&path)));
                Some(path)
            }
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "archive failed");
                sink.log(&format!("✗ ZIP打包失败：{}", e));
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::progress::{ChannelProgress, NoopProgress, RunEvent};
    use tempfile::TempDir;

    #[test]
    fn test_label_folders_shop_filter() {
        let mut config = RunConfig::new("a.xlsx", "t");
        assert_eq!(label_folders(&config, LabelCategory::ThreeC).len(), 5);
        assert_eq!(label_folders(&config, LabelCategory::Toy).len(), 2);

        config.selected_shops = vec!["三只梨".to_string(), "兽".to_string()];
        let folders: Vec<&str> = label_folders(&config, LabelCategory::ThreeC)
            .iter()
            .map(|f| f.folder.as_str())
            .collect();
        assert_eq!(folders, vec!["三只梨", "兽"]);

        // 筛选结果为空时不生效
        config.selected_shops = vec!["不存在".to_string()];
        assert_eq!(label_folders(&config, LabelCategory::Toy).len(), 2);
    }

    #[test]
    fn test_error_chain_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let chain = error_chain(&LabelBoxError::Io(io));
        assert_eq!(chain, "IO error: gone\nCaused by: gone");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_missing_workbook_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let mut config = RunConfig::new(dir.path().join("none.xlsx"), dir.path());
        config.output_base = Some(dir.path().join("out"));

        let result = process_workbook(&config, &NoopProgress);
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().starts_with("Workbook error"));
        assert!(result.traceback.is_some());
        assert!(result.mmdd.is_none());
        assert!(result.summary_text().starts_with("处理失败"));
    }

    #[test]
    fn test_spawn_batch_reports_finished() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig::new(dir.path().join("none.xlsx"), dir.path());
        let (sink, rx) = ChannelProgress::new();

        let result = spawn_batch(config, Arc::new(sink)).join().unwrap();
        assert!(!result.success);

        let events: Vec<RunEvent> = rx.try_iter().collect();
        assert_eq!(events.first(), Some(&RunEvent::Progress { value: 10, text: "正在读取Excel文件...".to_string() }));
        assert_eq!(events.last(), Some(&RunEvent::Finished { success: false }));
    }

    #[test]
    fn test_broken_product_map_is_ignored_with_warning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("product_code_map.json");
        fs::write(&path, "{not json").unwrap();

        let journal = Journal::new(&NoopProgress);
        let store = load_product_map(&path, &journal);
        assert!(store.is_empty());
        assert!(journal.text().contains("螺旋桨映射文件读取失败"));

        fs::write(&path, r#"{"100999": "兽螺旋桨.pld"}"#).unwrap();
        assert_eq!(load_product_map(&path, &journal).get("100999"), Some("兽螺旋桨.pld"));
    }

    #[test]
    fn test_journal_keeps_lines() {
        let journal = Journal::new(&NoopProgress);
        journal.log("a");
        journal.progress(50, "ignored");
        journal.log("b");
        assert_eq!(journal.text(), "a\nb");
    }
}
