use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{LabelBoxError, LabelCategory};

/// Output directory layout of one batch run
///
/// - `<base>/<MMDD>-<kind>标签/<shop>/` - copied label templates
/// - `<base>/<MMDD>-<kind>箱唛[/<store>]/` - patched box marks
/// - `<base>/日志/` - copy log, box log, date-patch report
pub struct OutputLayout {
    base: PathBuf,
    mmdd: String,
    category: LabelCategory,
}

impl OutputLayout {
    pub fn new(base: &Path, mmdd: &str, category: LabelCategory) -> Self {
        Self {
            base: base.to_path_buf(),
            mmdd: mmdd.to_string(),
            category,
        }
    }

    /// Root of the copied label templates
    pub fn label_root(&self) -> PathBuf {
        self.base.join(format!("{}-{}", self.mmdd, self.category.label_dir_name()))
    }

    /// Root of the box marks (without the store subfolder)
    pub fn box_root(&self) -> PathBuf {
        self.base.join(format!("{}-{}", self.mmdd, self.category.box_dir_name()))
    }

    /// Box-mark folder, below the store subfolder when there is one
    pub fn box_dir(&self, store: Option<&str>) -> PathBuf {
        match store {
            Some(s) => self.box_root().join(s),
            None => self.box_root(),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base.join("日志")
    }

    /// `标签统计_<MMDD>.txt` in the base directory
    pub fn statistics_path(&self) -> PathBuf {
        self.base.join(format!("标签统计_{}.txt", self.mmdd))
    }

    /// Copy `src` into `dest_dir`, keeping its filename
    ///
    /// # Returns
    /// * Destination path
    pub fn copy_into(&self, src: &Path, dest_dir: &Path) -> Result<PathBuf, LabelBoxError> {
        fs::create_dir_all(dest_dir)?;
        let name = src.file_name().ok_or_else(|| {
            LabelBoxError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid template path: {}", src.display()),
            ))
        })?;
        let dest = dest_dir.join(name);
        fs::copy(src, &dest).map_err(|e| {
            LabelBoxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to copy {} to {}: {}", src.display(), dest.display(), e),
            ))
        })?;
        Ok(dest)
    }
}

/// Output path for the `occurrence`-th (0-based) box mark of the same template
///
/// The first keeps the template's filename; repeats become `<stem>-N.<ext>`.
pub fn numbered_output_path(dir: &Path, template: &Path, occurrence: usize) -> PathBuf {
    let name = template
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if occurrence == 0 {
        return dir.join(name);
    }
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match template.extension() {
        Some(ext) => dir.join(format!("{}-{}.{}", stem, occurrence + 1, ext.to_string_lossy())),
        None => dir.join(format!("{}-{}", stem, occurrence + 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new(Path::new("/out"), "0915", LabelCategory::ThreeC);
        assert_eq!(layout.label_root(), PathBuf::from("/out/0915-3C标签"));
        assert_eq!(layout.box_dir(Some("兽")), PathBuf::from("/out/0915-3C箱唛/兽"));
        assert_eq!(layout.box_dir(None), PathBuf::from("/out/0915-3C箱唛"));
        assert_eq!(layout.log_dir(), PathBuf::from("/out/日志"));
        assert_eq!(layout.statistics_path(), PathBuf::from("/out/标签统计_0915.txt"));

        let toy = OutputLayout::new(Path::new("/out"), "0101", LabelCategory::Toy);
        assert_eq!(toy.label_root(), PathBuf::from("/out/0101-玩具标签"));
    }

    #[test]
    fn test_copy_into_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("A1.pld");
        fs::write(&src, b"template").unwrap();

        let layout = OutputLayout::new(dir.path(), "0915", LabelCategory::ThreeC);
        let dest = layout.copy_into(&src, &layout.label_root().join("三只梨")).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"template");
        assert!(dest.ends_with("0915-3C标签/三只梨/A1.pld"));
    }

    #[test]
    fn test_copy_missing_source_errors() {
        let dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(dir.path(), "0915", LabelCategory::ThreeC);
        assert!(layout.copy_into(&dir.path().join("nope.pld"), dir.path()).is_err());
    }

    #[test]
    fn test_numbered_output_path() {
        let dir = Path::new("/out");
        let tpl = Path::new("/tpl/北京箱唛.pld");
        assert_eq!(numbered_output_path(dir, tpl, 0), PathBuf::from("/out/北京箱唛.pld"));
        assert_eq!(numbered_output_path(dir, tpl, 1), PathBuf::from("/out/北京箱唛-2.pld"));
        assert_eq!(numbered_output_path(dir, tpl, 2), PathBuf::from("/out/北京箱唛-3.pld"));
    }
}
