//! Box-mark patching: rewrite one template for one shipment entry.
//!
//! The patch is an ordered list of named steps over one exclusively borrowed
//! [`PldBuffer`]. Steps never fail; a field that cannot be located becomes a
//! warning in the [`PatchReport`].

use std::ops::Range;
use std::path::Path;

use tracing::{debug, warn};

use super::buffer::PldBuffer;
use super::city::{city_meta, find_city_display, CityDisplay};
use super::locator::{
    find_ascii_word_after, find_bounded_token, find_depot_by_city_anchor, find_depot_field_window,
    find_label_positions, find_longest_digit_runs, find_next_digits_after, find_po_after_labels,
    find_star_po_spans, LABEL_LOOKAHEAD, SUPPLIER_PLACEHOLDER,
};
use crate::models::{FieldKind, LabelBoxError, PatchReport, ShipmentEntry};

/// Mutable state shared by the steps of one patch run
pub struct PatchContext<'a> {
    pub entry: &'a ShipmentEntry,
    pub report: PatchReport,
    po_hits: usize,
}

impl<'a> PatchContext<'a> {
    fn new(entry: &'a ShipmentEntry) -> Self {
        Self {
            entry,
            report: PatchReport::default(),
            po_hits: 0,
        }
    }
}

pub type PatchStep = fn(&mut PldBuffer, &mut PatchContext<'_>);

/// Steps in application order
pub const PATCH_STEPS: &[(&str, PatchStep)] = &[
    ("star_po", patch_star_po),
    ("labelled_po", patch_labelled_po),
    ("fallback_po", patch_fallback_po),
    ("supplier", patch_supplier),
    ("sequence_no", patch_sequence_no),
    ("depot", patch_depot),
    ("city_display", patch_city_display),
    ("verify_po", verify_po),
];

/// Apply every step to `buf` and return what changed
pub fn patch_buffer(buf: &mut PldBuffer, entry: &ShipmentEntry) -> PatchReport {
    let original_len = buf.len();
    let mut ctx = PatchContext::new(entry);
    for (name, step) in PATCH_STEPS {
        let before = ctx.report.changes.len();
        step(buf, &mut ctx);
        debug!(step = *name, changes = ctx.report.changes.len() - before, "patch step done");
    }
    debug_assert_eq!(buf.len(), original_len);
    ctx.report
}

/// Read `src`, patch it for `entry` and write the result to `out`
///
/// # Arguments
/// * `src` - City template
/// * `out` - Output path (parent directories are created)
/// * `entry` - Values to write
pub fn patch_file(src: &Path, out: &Path, entry: &ShipmentEntry) -> Result<PatchReport, LabelBoxError> {
    let mut buf = PldBuffer::read(src)?;
    let report = patch_buffer(&mut buf, entry);
    buf.write(out)?;

    for w in &report.warnings {
        warn!(file = %out.display(), "{}", w);
    }
    Ok(report)
}

fn write_ascii(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>, kind: FieldKind, method: &str, range: Range<usize>, text: &str) {
    if buf.overwrite_ascii_fit(range.clone(), text) {
        ctx.report.record(kind, method, range.start, range.end);
    }
}

fn write_gbk(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>, kind: FieldKind, method: &str, range: Range<usize>, text: &str) {
    if buf.overwrite_gbk_fit(range.clone(), text) {
        ctx.report.record(kind, method, range.start, range.end);
    }
}

fn patch_star_po(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    let spans = find_star_po_spans(buf.as_bytes());
    if spans.is_empty() {
        ctx.report.note("no star-number pattern found");
        return;
    }
    ctx.report.note(format!(
        "star-number positions: {:?}",
        spans.iter().map(|r| r.start).collect::<Vec<_>>()
    ));
    let po = ctx.entry.po.clone();
    for range in spans {
        write_ascii(buf, ctx, FieldKind::PurchaseOrder, "*num*", range, &po);
        ctx.po_hits += 1;
    }
}

fn patch_labelled_po(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    let regions = find_po_after_labels(buf.as_bytes());
    if regions.is_empty() {
        ctx.report.note("no digits found after '采购单号'");
        return;
    }
    let po = ctx.entry.po.clone();
    for range in regions {
        write_ascii(buf, ctx, FieldKind::PurchaseOrder, "标签附近", range, &po);
        ctx.po_hits += 1;
    }
}

fn patch_fallback_po(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    if ctx.po_hits > 0 {
        return;
    }
    let runs = find_longest_digit_runs(buf.as_bytes(), 2);
    if runs.is_empty() {
        ctx.report.warn("未找到可替换的采购单号区域（请检查模板）");
        return;
    }
    let po = ctx.entry.po.clone();
    for range in runs {
        write_ascii(buf, ctx, FieldKind::PurchaseOrder, "兜底最长数字", range, &po);
        ctx.po_hits += 1;
    }
}

fn patch_supplier(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    let supplier = ctx.entry.supplier.clone();
    let words: Vec<Range<usize>> = find_label_positions(buf.as_bytes(), "商家名称")
        .into_iter()
        .filter_map(|pos| find_ascii_word_after(buf.as_bytes(), pos, LABEL_LOOKAHEAD))
        .collect();
    if !words.is_empty() {
        for range in words {
            write_ascii(buf, ctx, FieldKind::Supplier, "标签附近", range, &supplier);
        }
        return;
    }

    match find_bounded_token(buf.as_bytes(), SUPPLIER_PLACEHOLDER) {
        Some(range) => write_ascii(buf, ctx, FieldKind::Supplier, "兜底", range, &supplier),
        None => ctx.report.warn("未找到可替换的商家名称区域"),
    }
}

fn patch_sequence_no(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    let Some(no) = ctx.entry.sequence_no.clone() else {
        return;
    };
    let runs: Vec<Range<usize>> = find_label_positions(buf.as_bytes(), "箱唛序号")
        .into_iter()
        .flat_map(|pos| find_next_digits_after(buf.as_bytes(), pos, LABEL_LOOKAHEAD, 1, 6, true))
        .collect();
    if runs.is_empty() {
        ctx.report.warn("未找到可替换的箱唛序号区域");
        return;
    }
    for range in runs {
        write_ascii(buf, ctx, FieldKind::SequenceNo, "标签附近", range, &no);
    }
}

type DepotStrategy = fn(&[u8], &ShipmentEntry) -> Option<(Range<usize>, &'static str)>;

fn depot_by_field_label(buf: &[u8], _entry: &ShipmentEntry) -> Option<(Range<usize>, &'static str)> {
    find_depot_field_window(buf).map(|r| (r, "字段标签法"))
}

fn depot_by_city_anchor(buf: &[u8], entry: &ShipmentEntry) -> Option<(Range<usize>, &'static str)> {
    find_depot_by_city_anchor(buf, &entry.city).map(|r| (r, "城市锚点"))
}

// field label first, city anchor as fallback
const DEPOT_STRATEGIES: &[DepotStrategy] = &[depot_by_field_label, depot_by_city_anchor];

fn is_guangzhou_dongguan(entry: &ShipmentEntry) -> bool {
    entry.city == "广州" && entry.depot.contains("东莞")
}

fn patch_depot(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    let special = is_guangzhou_dongguan(ctx.entry);
    let found = DEPOT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(buf.as_bytes(), ctx.entry));

    match found {
        Some((range, method)) => {
            let method = if special {
                format!("广州特例-{}", method)
            } else {
                method.to_string()
            };
            let depot = ctx.entry.depot.clone();
            write_gbk(buf, ctx, FieldKind::Depot, &method, range, &depot);
        }
        None if special => ctx.report.warn("广州特例：未定位到目的库房（字段/城市锚点均未命中）"),
        None => ctx.report.warn("未定位到目的库房（字段/城市锚点均未命中）"),
    }
}

fn patch_city_display(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    let Some(meta) = city_meta(&ctx.entry.city) else {
        ctx.report.warn(format!("未知目的城市：{}", ctx.entry.city));
        return;
    };
    let Some(display) = find_city_display(buf.as_bytes(), meta) else {
        ctx.report.warn("未定位到目的城市显示（模板版式/编码异常）");
        return;
    };

    let mode = display.mode_name();
    match display {
        CityDisplay::Split { province, city } => {
            ctx.report.note(format!("city-display mode={} prov@{:?} city@{:?}", mode, province, city));
            write_gbk(buf, ctx, FieldKind::CityDisplay, "省段", province, meta.prov_disp);
            write_gbk(buf, ctx, FieldKind::CityDisplay, "市段", city, meta.city_only);
        }
        CityDisplay::Combined(window) => {
            ctx.report.note(format!("city-display mode={} win@{:?}", mode, window));
            write_gbk(buf, ctx, FieldKind::CityDisplay, "合并段", window, meta.combined);
        }
        CityDisplay::CityOnly(window) => {
            ctx.report.note(format!("city-display mode={} win@{:?}", mode, window));
            write_gbk(buf, ctx, FieldKind::CityDisplay, "仅市段", window, meta.city_only);
            ctx.report.warn("模板为仅市名段：已只写市名；如需省份请换含省段模板。");
        }
    }
}

fn verify_po(buf: &mut PldBuffer, ctx: &mut PatchContext<'_>) {
    if !buf.contains(ctx.entry.po.as_bytes()) {
        ctx.report.warn("改写后未检测到新采购单号明文（条码对象可能以非明文保存）");
    }
}
