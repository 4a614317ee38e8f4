use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A template file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Path relative to the scan root (used for ordering)
    pub relative_path: PathBuf,
    pub path: PathBuf,
}

/// Recursive file scanner for label template trees
///
/// Walks directories without following links, filters by extension
/// (case-insensitive) and returns files sorted by relative path so that
/// "first occurrence wins" rules are deterministic.
pub struct FileScanner {
    supported_extensions: Vec<&'static str>,
    excluded_names: Vec<&'static str>,
}

impl FileScanner {
    /// Scanner for `.pld` templates; the copy log written next to them is skipped
    pub fn new() -> Self {
        Self {
            supported_extensions: vec!["pld"],
            excluded_names: vec!["拷贝结果日志.txt"],
        }
    }

    /// Scan a directory recursively for supported files
    ///
    /// # Arguments
    /// * `root_path` - Root directory to scan
    ///
    /// # Returns
    /// * Vector of `TemplateFile` sorted by relative path
    pub fn scan(&self, root_path: &Path) -> Result<Vec<TemplateFile>, std::io::Error> {
        walk_sorted(root_path, |path| self.is_supported(path))
    }

    /// Check if a file is supported based on extension and exclusions
    pub fn is_supported(&self, path: &Path) -> bool {
        if !self
            .supported_extensions
            .iter()
            .any(|ext| has_extension(path, ext))
        {
            return false;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        !self.excluded_names.iter().any(|ex| ex.to_lowercase() == name)
    }

    /// 扫描目录中指定扩展名的所有文件（不做文件名排除）
    ///
    /// 返回按相对路径排序的 (绝对路径, 相对路径) 列表
    pub fn scan_files_by_extension(&self, root_path: &Path, extension: &str) -> Result<Vec<(PathBuf, PathBuf)>, std::io::Error> {
        let extension = extension.trim_start_matches('.');
        Ok(walk_sorted(root_path, |path| has_extension(path, extension))?
            .into_iter()
            .map(|f| (f.path, f.relative_path))
            .collect())
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

/// Files below `root_path` accepted by `keep`, sorted by relative path
fn walk_sorted(root_path: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<TemplateFile>, std::io::Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !keep(path) {
            continue;
        }

        let relative_path = path
            .strip_prefix(root_path)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("相对路径计算失败: {}", e)))?
            .to_path_buf();

        files.push(TemplateFile {
            relative_path,
            path: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_structure() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();

        fs::create_dir_all(base.join("3C标签/三只梨")).unwrap();
        fs::create_dir_all(base.join("3C标签/兽")).unwrap();

        fs::write(base.join("3C标签/三只梨/A100.pld"), b"pld").unwrap();
        fs::write(base.join("3C标签/兽/B200.PLD"), b"pld").unwrap();
        fs::write(base.join("3C标签/C300.pld"), b"pld").unwrap();

        // ignored
        fs::write(base.join("readme.txt"), b"text").unwrap();
        fs::write(base.join("3C标签/拷贝结果日志.txt"), b"log").unwrap();
        fs::write(base.join("3C标签/A100.pld.bak"), b"bak").unwrap();

        temp_dir
    }

    #[test]
    fn test_scan_finds_templates() {
        let temp_dir = create_test_structure();
        let scanner = FileScanner::new();

        let files = scanner.scan(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.path.ends_with(&f.relative_path)));
    }

    #[test]
    fn test_scan_sorts_by_path() {
        let temp_dir = create_test_structure();
        let files = FileScanner::new().scan(temp_dir.path()).unwrap();

        for i in 0..files.len() - 1 {
            assert!(files[i].relative_path <= files[i + 1].relative_path);
        }
    }

    #[test]
    fn test_is_supported() {
        let scanner = FileScanner::new();

        assert!(scanner.is_supported(Path::new("a.pld")));
        assert!(scanner.is_supported(Path::new("B.PLD")));
        assert!(!scanner.is_supported(Path::new("a.pld.bak")));
        assert!(!scanner.is_supported(Path::new("拷贝结果日志.txt")));
        assert!(!scanner.is_supported(Path::new("no_extension")));
    }

    #[test]
    fn test_scan_files_by_extension() {
        let temp_dir = create_test_structure();
        let files = FileScanner::new()
            .scan_files_by_extension(temp_dir.path(), ".pld")
            .unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|(abs, rel)| abs.ends_with(rel)));
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(FileScanner::new().scan(temp_dir.path()).unwrap().is_empty());
    }
}
