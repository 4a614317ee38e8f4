//! 标签日期改写：把标签模板中的 SN 日期段和独立 MMDD 改成批次日期
//!
//! Passes per printable-ASCII span, in order:
//! 1. SN tokens (`[A-Za-z]{1,10}[0-9]{10,}`): the 4 digits starting 7 from the
//!    end of the digit run
//! 2. standalone MMDD tokens with a keyword within 80 bytes
//! 3. every standalone MMDD token in the span
//!
//! and finally every standalone MMDD token of the whole buffer.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Local;
use regex::bytes::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::buffer::PldBuffer;
use super::scanner::{find_ascii_spans, standalone_mmdd, DEFAULT_MIN_SPAN};
use crate::core::file_ops::FileScanner;
use crate::models::LabelBoxError;

// SN 序列号：字母前缀 + 至少 10 位数字
static SN_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]{1,10})([0-9]{10,})").expect("valid SN token regex"));

const DATE_KEYWORDS: [&[u8]; 4] = [b"----", b"SN", "序列号".as_bytes(), "日期".as_bytes()];
const KEYWORD_RADIUS: usize = 80;

pub const REPORT_FILE_NAME: &str = "patch_pld_report.txt";

/// Rewrites per pass for one buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateCounts {
    pub sn: usize,
    pub keyword: usize,
    pub corner: usize,
    pub bytes: usize,
}

impl DateCounts {
    pub fn total(&self) -> usize {
        self.sn + self.keyword + self.corner + self.bytes
    }

    fn add(&mut self, other: &DateCounts) {
        self.sn += other.sn;
        self.keyword += other.keyword;
        self.corner += other.corner;
        self.bytes += other.bytes;
    }
}

/// Parse a 4-digit MMDD tag into the bytes written into templates
pub fn parse_mmdd(mmdd: &str) -> Result<[u8; 4], LabelBoxError> {
    let bytes = mmdd.as_bytes();
    if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(LabelBoxError::InvalidConfig(format!("日期标记必须是4位数字: {}", mmdd)));
    }
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn patch_sn_tokens(buf: &mut PldBuffer, span: std::ops::Range<usize>, mmdd: &[u8; 4]) -> usize {
    let targets: Vec<usize> = SN_TOKEN
        .captures_iter(&buf.as_bytes()[span.clone()])
        .filter_map(|caps| caps.get(2))
        .map(|digits| span.start + digits.start() + digits.len() - 7)
        .collect();
    targets
        .into_iter()
        .filter(|&at| buf.overwrite(at..at + 4, mmdd))
        .count()
}

fn has_keyword_near(block: &[u8], at: usize) -> bool {
    let left = at.saturating_sub(KEYWORD_RADIUS);
    let right = (at + 4 + KEYWORD_RADIUS).min(block.len());
    let context = &block[left..right];
    DATE_KEYWORDS
        .iter()
        .any(|k| context.windows(k.len()).any(|w| w == *k))
}

fn patch_keyword_dates(buf: &mut PldBuffer, span: std::ops::Range<usize>, mmdd: &[u8; 4]) -> usize {
    let block = &buf.as_bytes()[span.clone()];
    let targets: Vec<usize> = standalone_mmdd(block)
        .into_iter()
        .filter(|&at| has_keyword_near(block, at))
        .map(|at| span.start + at)
        .collect();
    targets
        .into_iter()
        .filter(|&at| buf.overwrite(at..at + 4, mmdd))
        .count()
}

fn patch_standalone_dates(buf: &mut PldBuffer, span: std::ops::Range<usize>, mmdd: &[u8; 4]) -> usize {
    let targets: Vec<usize> = standalone_mmdd(&buf.as_bytes()[span.clone()])
        .into_iter()
        .map(|at| span.start + at)
        .collect();
    targets
        .into_iter()
        .filter(|&at| buf.overwrite(at..at + 4, mmdd))
        .count()
}

/// Rewrite every date position of `buf` to `mmdd`
pub fn patch_dates(buf: &mut PldBuffer, mmdd: &[u8; 4]) -> DateCounts {
    let mut counts = DateCounts::default();
    for span in find_ascii_spans(buf.as_bytes(), DEFAULT_MIN_SPAN) {
        counts.sn += patch_sn_tokens(buf, span.clone(), mmdd);
        counts.keyword += patch_keyword_dates(buf, span.clone(), mmdd);
        counts.corner += patch_standalone_dates(buf, span, mmdd);
    }
    let whole = 0..buf.len();
    counts.bytes = patch_standalone_dates(buf, whole, mmdd);
    counts
}

/// Result of one label file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePatchOutcome {
    pub file: PathBuf,
    pub counts: DateCounts,
    pub changed: bool,
    pub wrote: bool,
    pub backup: Option<PathBuf>,
}

/// Patch one label file in place
///
/// # Arguments
/// * `path` - Label template to rewrite
/// * `mmdd` - Target date tag
/// * `dry_run` - Count only, never write
/// * `make_backup` - Keep `<file>.pld.bak`; an existing backup is left untouched
pub fn process_pld_file(
    path: &Path,
    mmdd: &[u8; 4],
    dry_run: bool,
    make_backup: bool,
) -> Result<DatePatchOutcome, LabelBoxError> {
    let original = std::fs::read(path)?;
    let mut buf = PldBuffer::new(original.clone());
    let counts = patch_dates(&mut buf, mmdd);
    let changed = buf.as_bytes() != original.as_slice();

    let mut wrote = false;
    let mut backup = None;
    if changed && !dry_run {
        if make_backup {
            let mut name = path.as_os_str().to_os_string();
            name.push(".bak");
            let bak = PathBuf::from(name);
            if !bak.exists() {
                std::fs::write(&bak, &original)?;
            }
            backup = Some(bak);
        }
        std::fs::write(path, buf.as_bytes())?;
        wrote = true;
    }

    Ok(DatePatchOutcome {
        file: path.to_path_buf(),
        counts,
        changed,
        wrote,
        backup,
    })
}

/// One line of the batch report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DatePatchRow {
    Ok(DatePatchOutcome),
    Failed { file: PathBuf, error: String },
}

/// Totals of one date-patch batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePatchSummary {
    pub base_dir: PathBuf,
    pub mmdd: String,
    pub dry_run: bool,
    pub make_backup: bool,
    pub counts: DateCounts,
    pub files: usize,
    pub written: usize,
    pub rows: Vec<DatePatchRow>,
}

impl DatePatchSummary {
    pub fn failures(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r, DatePatchRow::Failed { .. }))
            .count()
    }

    /// Short multi-line summary shown to the operator
    pub fn summary_text(&self) -> String {
        let backup = if self.make_backup && !self.dry_run { "开" } else { "关或预览" };
        format!(
            "目录：{}\n目标MMDD：{}\n模式：{}；备份：{}\n共处理文件：{}\nSN改：{}  |  关键字/整行改：{}  |  独立4位改：{}  |  字节兜底改：{}\n实际写入文件数：{}\n",
            self.base_dir.display(),
            self.mmdd,
            if self.dry_run { "预览(不写回)" } else { "写回" },
            backup,
            self.files,
            self.counts.sn,
            self.counts.keyword,
            self.counts.corner,
            self.counts.bytes,
            self.written,
        )
    }

    /// Full report with one row per file
    pub fn report_text(&self) -> String {
        let mut lines = vec![
            format!("[批处理时间] {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
            self.summary_text(),
        ];
        for row in &self.rows {
            match row {
                DatePatchRow::Ok(o) => lines.push(format!(
                    "[OK] {} | SN:{}  文本:{}  角标:{}  字节:{}  写入:{}  备份:{}",
                    o.file.display(),
                    o.counts.sn,
                    o.counts.keyword,
                    o.counts.corner,
                    o.counts.bytes,
                    o.wrote,
                    o.backup.as_ref().map(|b| b.display().to_string()).unwrap_or_default(),
                )),
                DatePatchRow::Failed { file, error } => {
                    lines.push(format!("[错误] {} -> {}", file.display(), error))
                }
            }
        }
        lines.join("\n")
    }

    /// Write the report into `dir` and return its path
    pub fn save_report(&self, dir: &Path) -> Result<PathBuf, LabelBoxError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        std::fs::write(&path, self.report_text())?;
        Ok(path)
    }
}

fn describe_failure(err: &LabelBoxError) -> String {
    match err {
        LabelBoxError::Io(e) if e.kind() == ErrorKind::PermissionDenied => {
            "无权访问（可能被占用）".to_string()
        }
        other => other.to_string(),
    }
}

/// Date-patch every `.pld` below `base_dir` (sorted); per-file failures are
/// recorded and the batch continues
pub fn run_patch_step(
    base_dir: &Path,
    mmdd: &str,
    dry_run: bool,
    make_backup: bool,
) -> Result<DatePatchSummary, LabelBoxError> {
    let tag = parse_mmdd(mmdd)?;
    let scanner = FileScanner::new();
    let targets = scanner.scan_files_by_extension(base_dir, "pld")?;

    let mut summary = DatePatchSummary {
        base_dir: base_dir.to_path_buf(),
        mmdd: mmdd.to_string(),
        dry_run,
        make_backup,
        counts: DateCounts::default(),
        files: 0,
        written: 0,
        rows: Vec::with_capacity(targets.len()),
    };

    for (path, relative) in targets {
        match process_pld_file(&path, &tag, dry_run, make_backup) {
            Ok(outcome) => {
                debug!(file = %relative.display(), total = outcome.counts.total(), "日期改写");
                summary.counts.add(&outcome.counts);
                summary.files += 1;
                if outcome.wrote {
                    summary.written += 1;
                }
                summary.rows.push(DatePatchRow::Ok(outcome));
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "日期改写失败");
                summary.rows.push(DatePatchRow::Failed {
                    file: path,
                    error: describe_failure(&e),
                });
            }
        }
    }

    info!(
        files = summary.files,
        written = summary.written,
        failures = summary.failures(),
        "日期改写完成"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TAG: [u8; 4] = *b"1028";

    #[test]
    fn test_sn_token_date_digits() {
        // digits 20250915001: the 4 digits starting 7 from the end are 0915
        let mut buf = PldBuffer::new(b"\x00SNAB20250915001\x00".to_vec());
        let counts = patch_dates(&mut buf, &TAG);
        assert_eq!(buf.as_bytes(), b"\x00SNAB20251028001\x00");
        assert_eq!(counts.sn, 1);
    }

    #[test]
    fn test_keyword_adjacent_and_plain_tokens() {
        let mut buf = PldBuffer::new(b"\x01---- 0915 ----\x01".to_vec());
        let counts = patch_dates(&mut buf, &TAG);
        assert_eq!(buf.as_bytes(), b"\x01---- 1028 ----\x01");
        assert_eq!(counts.keyword, 1);
        // the corner and byte passes see the rewritten token again
        assert_eq!(counts.corner, 1);
        assert_eq!(counts.bytes, 1);
    }

    #[test]
    fn test_non_date_tokens_untouched() {
        let original = b"\x00QTY 9999 BOX 1332 CODE 123456\x00".to_vec();
        let mut buf = PldBuffer::new(original.clone());
        let counts = patch_dates(&mut buf, &TAG);
        assert_eq!(buf.as_bytes(), &original[..]);
        assert_eq!(counts.total(), 0);
    }

    #[test]
    fn test_short_spans_still_reach_byte_pass() {
        // "0915" alone is shorter than a span but is caught by the whole-buffer pass
        let mut buf = PldBuffer::new(b"\x000915\x00".to_vec());
        let counts = patch_dates(&mut buf, &TAG);
        assert_eq!(buf.as_bytes(), b"\x001028\x00");
        assert_eq!(counts.bytes, 1);
        assert_eq!(counts.corner, 0);
    }

    #[test]
    fn test_parse_mmdd() {
        assert_eq!(parse_mmdd("0101").unwrap(), *b"0101");
        assert!(parse_mmdd("101").is_err());
        assert!(parse_mmdd("10a1").is_err());
    }

    #[test]
    fn test_backup_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("标签.pld");
        fs::write(&path, b"\x00SN 0915 label\x00").unwrap();

        let first = process_pld_file(&path, b"0101", false, true).unwrap();
        assert!(first.wrote);
        let bak = first.backup.clone().unwrap();
        assert!(bak.to_string_lossy().ends_with(".pld.bak"));
        assert_eq!(fs::read(&bak).unwrap(), b"\x00SN 0915 label\x00");

        let second = process_pld_file(&path, b"0202", false, true).unwrap();
        assert!(second.wrote);
        // first backup wins
        assert_eq!(fs::read(&bak).unwrap(), b"\x00SN 0915 label\x00");
        assert_eq!(fs::read(&path).unwrap(), b"\x00SN 0202 label\x00");
    }

    #[test]
    fn test_dry_run_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.pld");
        fs::write(&path, b"\x00SN 0915 label\x00").unwrap();
        let outcome = process_pld_file(&path, b"0101", true, true).unwrap();
        assert!(outcome.changed);
        assert!(!outcome.wrote);
        assert!(outcome.backup.is_none());
        assert_eq!(fs::read(&path).unwrap(), b"\x00SN 0915 label\x00");
    }

    #[test]
    fn test_run_patch_step_report() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("兽")).unwrap();
        fs::write(dir.path().join("兽/b.pld"), b"\x00SN 0915 label\x00").unwrap();
        fs::write(dir.path().join("a.PLD"), b"\x00nothing here\x00").unwrap();
        fs::write(dir.path().join("notes.txt"), b"0915").unwrap();

        let summary = run_patch_step(dir.path(), "1028", false, false).unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.failures(), 0);
        assert_eq!(fs::read(dir.path().join("notes.txt")).unwrap(), b"0915");

        let report = summary.report_text();
        assert!(report.contains("共处理文件：2"));
        assert!(report.contains("实际写入文件数：1"));
        let saved = summary.save_report(&dir.path().join("日志")).unwrap();
        assert!(saved.ends_with(REPORT_FILE_NAME));
    }
}
